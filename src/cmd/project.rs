//! Project creation and operator input commands: `baton init` and `baton import`.

use anyhow::{Context, Result};
use console::style;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use baton::config::Config;
use baton::errors::{EXIT_MISSING_ARTIFACT, EXIT_OK, OrchestratorError, StoreError};
use baton::init::{init_workspace, validate_project_id};
use baton::orchestrator::ProjectSession;
use baton::store::SchemaRegistry;
use baton::ui::icons::{CHECK, CROSS, FOLDER, HINT};

pub fn cmd_init(config: &Config, project_id: &str) -> Result<u8> {
    validate_project_id(project_id)?;

    let result = init_workspace(&config.project_dir)?;
    let schemas = Arc::new(SchemaRegistry::standard());
    let session = ProjectSession::create(&config.projects_dir, project_id, schemas)?;

    println!();
    if result.created {
        println!("{}Initialized baton workspace at {}", CHECK, result.baton_dir.display());
    }
    println!("{}Created project {}", CHECK, style(project_id).bold());
    println!();
    println!("{}{}", FOLDER, session.project_dir().display());
    println!("├── manifest.json");
    println!("├── artifacts/");
    println!("└── handoffs/");
    println!();
    println!("Next steps:");
    println!("  1. Write the feature specification as JSON (title, summary, goals)");
    println!("  2. Run 'baton import feature_spec <file>'");
    println!("  3. Run 'baton step' or 'baton run'");
    println!();
    Ok(EXIT_OK)
}

/// Validate and link an operator-supplied artifact. Unreadable or invalid
/// content is an artifact problem, not a fatal one.
pub fn cmd_import(
    config: &Config,
    project_id: &str,
    artifact: &str,
    file: &Path,
    force: bool,
) -> Result<u8> {
    let content = match read_json(file) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("{}{} {:#}", CROSS, style("Invalid artifact:").red().bold(), err);
            return Ok(EXIT_MISSING_ARTIFACT);
        }
    };

    let schemas = Arc::new(SchemaRegistry::standard());
    let session = ProjectSession::open(&config.projects_dir, project_id, schemas)?;
    match session.import_artifact(artifact, content, force) {
        Ok(stored) => {
            println!(
                "{}Imported {} ({}) from {}",
                CHECK,
                style(artifact).cyan(),
                &stored.digest[..stored.digest.len().min(12)],
                file.display()
            );
            Ok(EXIT_OK)
        }
        Err(OrchestratorError::Store(StoreError::Schema(err))) => {
            eprintln!("{}{} {}", CROSS, style("Invalid artifact:").red().bold(), err);
            for problem in &err.problems {
                eprintln!("    - {}", problem);
            }
            eprintln!("  {}Fix the file and import it again", HINT);
            Ok(EXIT_MISSING_ARTIFACT)
        }
        Err(err) => Err(err.into()),
    }
}

fn read_json(file: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", file.display()))
}
