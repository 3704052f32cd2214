//! Project inspection and lifecycle commands: status, history, maintain, archive.

use anyhow::Result;
use console::style;
use std::sync::Arc;

use baton::config::Config;
use baton::errors::EXIT_OK;
use baton::orchestrator::ProjectSession;
use baton::store::{HandoffLog, ManifestStore, SchemaRegistry};
use baton::ui::icons::{CHECK, SPARKLE};
use baton::ui::{render_gate_history, render_status};

/// Read-only: does not take the manifest lock, so it works while a run is in progress.
pub fn cmd_status(config: &Config, project_id: &str) -> Result<u8> {
    let store = ManifestStore::new(&config.projects_dir);
    let manifest = store.load(project_id)?;

    println!();
    print!("{}", render_status(&manifest, config.max_delegations));

    let handoffs = HandoffLog::new(&store.project_dir(project_id)).list()?;
    if let Some(last) = handoffs.last() {
        println!();
        println!(
            "Last handoff: {} -> {} ({})",
            last.from_phase,
            last.to_phase,
            last.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  {}", last.summary);
        for item in &last.pending_items {
            println!("  - {}", item);
        }
    }
    println!();
    Ok(EXIT_OK)
}

pub fn cmd_history(config: &Config, project_id: &str, limit: Option<usize>) -> Result<u8> {
    let manifest = ManifestStore::new(&config.projects_dir).load(project_id)?;
    let history = &manifest.quality_gate_history;
    let start = limit.map_or(0, |limit| history.len().saturating_sub(limit));

    println!();
    print!("{}", render_gate_history(&history[start..]));
    if start > 0 {
        println!("{}", style(format!("({} older result(s) not shown)", start)).dim());
    }
    println!();
    Ok(EXIT_OK)
}

pub fn cmd_maintain(config: &Config, project_id: &str) -> Result<u8> {
    let schemas = Arc::new(SchemaRegistry::standard());
    let session = ProjectSession::open(&config.projects_dir, project_id, schemas)?;
    let manifest = session.begin_maintenance_cycle()?;

    println!(
        "{}Maintenance cycle {} started for {} at {}",
        SPARKLE,
        manifest.budget_counters.maintenance_cycles,
        style(project_id).bold(),
        manifest.state_key()
    );
    println!("Run 'baton step' to produce the next maintenance log.");
    Ok(EXIT_OK)
}

pub fn cmd_archive(config: &Config, project_id: &str, force: bool) -> Result<u8> {
    use dialoguer::Confirm;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Move project '{}' to {}?",
                project_id,
                config.archive_dir.display()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Archive cancelled");
            return Ok(EXIT_OK);
        }
    }

    let schemas = Arc::new(SchemaRegistry::standard());
    let session = ProjectSession::open(&config.projects_dir, project_id, schemas)?;
    let target = session.archive(&config.archive_dir)?;
    println!("{}Archived {} to {}", CHECK, project_id, target.display());
    Ok(EXIT_OK)
}
