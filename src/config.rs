use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::baton_config::{BatonToml, ExecutionMode};
use crate::init::{BATON_DIR, validate_project_id};

/// Command-line layer of the configuration. `None` leaves the lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub verbose: bool,
    pub mode: Option<ExecutionMode>,
    pub timeout_ms: Option<u64>,
}

/// Runtime configuration for baton.
///
/// Resolves the `.baton` directory layout and the layered delegation
/// settings (file → environment → CLI) into the values the coordinator uses.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub baton_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub log_dir: PathBuf,
    pub fixtures_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub verbose: bool,
    pub mode: ExecutionMode,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub executor_cmd: Option<String>,
    pub executor_args: Vec<String>,
    pub max_delegations: Option<u64>,
    toml: BatonToml,
}

impl Config {
    /// Build the configuration for the workspace at `project_dir`, reading
    /// environment overrides from the process environment.
    pub fn new(project_dir: PathBuf, overrides: CliOverrides) -> Result<Self> {
        Self::with_env(project_dir, overrides, |key| std::env::var(key).ok())
    }

    pub fn with_env<F>(project_dir: PathBuf, overrides: CliOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let baton_dir = project_dir.join(BATON_DIR);

        let mut toml = BatonToml::load_or_default(&baton_dir)?;
        toml.apply_env(lookup)?;

        let mode = overrides.mode.unwrap_or(toml.delegation.mode);
        let timeout_ms = overrides.timeout_ms.unwrap_or(toml.delegation.timeout_ms);
        let fixtures_dir = match &toml.delegation.fixtures_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => baton_dir.join(dir),
            None => baton_dir.join("fixtures"),
        };

        Ok(Self {
            projects_dir: baton_dir.join("projects"),
            archive_dir: baton_dir.join("archive"),
            log_dir: baton_dir.join("logs"),
            templates_dir: baton_dir.join("templates"),
            fixtures_dir,
            verbose: overrides.verbose,
            mode,
            timeout_ms,
            max_attempts: toml.delegation.max_attempts.max(1),
            executor_cmd: toml.delegation.command.clone(),
            executor_args: toml.delegation.args.clone(),
            max_delegations: toml.budget.max_delegations,
            project_dir,
            baton_dir,
            toml,
        })
    }

    pub fn toml(&self) -> &BatonToml {
        &self.toml
    }

    pub fn project_path(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id)
    }

    /// Pick the project to operate on: `--project`, then `project.default_id`,
    /// then the only project present.
    pub fn resolve_project_id(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(id) = explicit.or(self.toml.project.default_id.as_deref()) {
            validate_project_id(id)?;
            return Ok(id.to_string());
        }

        let projects = list_projects(&self.projects_dir)?;
        match projects.as_slice() {
            [only] => Ok(only.clone()),
            [] => anyhow::bail!("No projects found. Run 'baton init <project-id>' first"),
            many => anyhow::bail!(
                "Several projects exist ({}); choose one with --project",
                many.join(", ")
            ),
        }
    }
}

/// Sorted project ids under `projects_dir`. A missing directory has none.
pub fn list_projects(projects_dir: &Path) -> Result<Vec<String>> {
    if !projects_dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(projects_dir)
        .with_context(|| format!("Failed to read {}", projects_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && let Some(name) = entry.file_name().to_str()
            && !name.starts_with('.')
        {
            ids.push(name.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::init_workspace;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_layout_under_baton_dir() {
        let dir = tempdir().unwrap();
        let config = Config::with_env(dir.path().to_path_buf(), CliOverrides::default(), no_env)
            .unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.baton_dir, root.join(".baton"));
        assert_eq!(config.projects_dir, root.join(".baton/projects"));
        assert_eq!(config.fixtures_dir, root.join(".baton/fixtures"));
        assert_eq!(config.project_path("demo"), root.join(".baton/projects/demo"));
        assert_eq!(config.mode, ExecutionMode::Interactive);
    }

    #[test]
    fn test_cli_overrides_beat_env_and_file() {
        let dir = tempdir().unwrap();
        init_workspace(dir.path()).unwrap();
        std::fs::write(
            dir.path().join(".baton/baton.toml"),
            "[delegation]\nmode = \"process\"\ntimeout_ms = 10\nmax_attempts = 0\n",
        )
        .unwrap();

        let env = |key: &str| (key == "BATON_TIMEOUT_MS").then(|| "20".to_string());
        let config = Config::with_env(
            dir.path().to_path_buf(),
            CliOverrides {
                mode: Some(ExecutionMode::Mock),
                ..Default::default()
            },
            env,
        )
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::Mock);
        assert_eq!(config.timeout_ms, 20);
        assert_eq!(config.max_attempts, 1);

        let config = Config::with_env(
            dir.path().to_path_buf(),
            CliOverrides {
                timeout_ms: Some(30),
                ..Default::default()
            },
            env,
        )
        .unwrap();
        assert_eq!(config.mode, ExecutionMode::Process);
        assert_eq!(config.timeout_ms, 30);
    }

    #[test]
    fn test_resolve_project_id() {
        let dir = tempdir().unwrap();
        init_workspace(dir.path()).unwrap();
        let config = Config::with_env(dir.path().to_path_buf(), CliOverrides::default(), no_env)
            .unwrap();

        assert!(config.resolve_project_id(None).is_err());

        std::fs::create_dir_all(config.project_path("alpha")).unwrap();
        assert_eq!(config.resolve_project_id(None).unwrap(), "alpha");

        std::fs::create_dir_all(config.project_path("beta")).unwrap();
        let err = config.resolve_project_id(None).unwrap_err();
        assert!(err.to_string().contains("alpha, beta"));

        assert_eq!(config.resolve_project_id(Some("beta")).unwrap(), "beta");
        assert!(config.resolve_project_id(Some("../etc")).is_err());
    }
}
