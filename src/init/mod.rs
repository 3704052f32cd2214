//! Workspace initialization for baton.
//!
//! `baton init` creates the `.baton/` directory structure on first use:
//!
//! ```text
//! .baton/
//! ├── baton.toml          # Optional configuration
//! ├── projects/
//! │   └── <project-id>/
//! │       ├── manifest.json
//! │       ├── manifest.lock
//! │       ├── artifacts/<PHASE>/[<SUB_STATE>/]<name>.json
//! │       └── handoffs/
//! ├── fixtures/           # Canned executor replies for mock mode
//! ├── templates/          # Optional task instruction overrides
//! ├── archive/            # Archived projects
//! └── logs/
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// The name of the baton working directory.
pub const BATON_DIR: &str = ".baton";

const SUBDIRECTORIES: [&str; 5] = ["projects", "fixtures", "templates", "archive", "logs"];

static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("valid regex"));

/// Result of initializing the baton workspace.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.baton` directory
    pub baton_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Create or complete the `.baton/` structure under `project_dir`.
pub fn init_workspace(project_dir: &Path) -> Result<InitResult> {
    let baton_dir = project_dir.join(BATON_DIR);
    let created = !baton_dir.exists();

    std::fs::create_dir_all(&baton_dir)
        .with_context(|| format!("Failed to create directory: {}", baton_dir.display()))?;
    ensure_directory_structure(&baton_dir)?;

    Ok(InitResult { baton_dir, created })
}

fn ensure_directory_structure(baton_dir: &Path) -> Result<()> {
    for name in SUBDIRECTORIES {
        let dir = baton_dir.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", name, dir.display()))?;
    }
    Ok(())
}

/// Check if the workspace has a `.baton` directory.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(BATON_DIR).is_dir()
}

/// Project ids become directory names: lowercase ascii, digits, `-` and `_`.
pub fn validate_project_id(id: &str) -> Result<()> {
    if PROJECT_ID.is_match(id) {
        Ok(())
    } else {
        anyhow::bail!(
            "Invalid project id '{}': use 1-64 lowercase letters, digits, '-' or '_', starting with a letter or digit",
            id
        )
    }
}
