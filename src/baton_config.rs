//! Project configuration read from `.baton/baton.toml`.
//!
//! Every section is optional and falls back to defaults. Values are layered
//! file → environment → CLI; this module owns the file and environment layers,
//! `Config::new` applies the CLI layer on top.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! default_id = "checkout-flow"
//!
//! [delegation]
//! mode = "process"          # interactive | process | mock
//! timeout_ms = 600000
//! max_attempts = 3
//! command = "my-executor"
//! args = ["--json"]
//!
//! [budget]
//! max_delegations = 40
//!
//! [logging]
//! level = "info"
//! json = false
//! file = true
//!
//! [gates.overrides."artifact.*"]
//! severity = "medium"
//! blocking = false
//! ```

use anyhow::{Context, Result};
use baton_common::{GateDef, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the configuration inside the baton directory.
pub const CONFIG_FILE: &str = "baton.toml";

pub const ENV_MODE: &str = "BATON_MODE";
pub const ENV_TIMEOUT_MS: &str = "BATON_TIMEOUT_MS";
pub const ENV_EXECUTOR_CMD: &str = "BATON_EXECUTOR_CMD";

/// How delegation requests reach the external executor.
///
/// | Mode          | Transport                                                   |
/// |---------------|-------------------------------------------------------------|
/// | `Interactive` | Framed over baton's own stdin/stdout (operator or wrapper)  |
/// | `Process`     | Framed over the stdin/stdout of a spawned executor command  |
/// | `Mock`        | Replies replayed from `.baton/fixtures/<task>.json`         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Interactive,
    Process,
    Mock,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Interactive => write!(f, "interactive"),
            ExecutionMode::Process => write!(f, "process"),
            ExecutionMode::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(ExecutionMode::Interactive),
            "process" => Ok(ExecutionMode::Process),
            "mock" => Ok(ExecutionMode::Mock),
            _ => anyhow::bail!(
                "Invalid execution mode '{}'. Valid values: interactive, process, mock",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project used when `--project` is not given.
    #[serde(default)]
    pub default_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationSection {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Per-attempt reply deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per delegation before the handler gives up with a timeout.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Executor command for `process` mode.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Fixture directory for `mock` mode, relative to the baton directory.
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    600_000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            command: None,
            args: Vec::new(),
            fixtures_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSection {
    /// Ceiling on `budget_counters.delegations_sent`; unlimited when absent.
    #[serde(default)]
    pub max_delegations: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Also write a daily-rotated log file under `.baton/logs`.
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: false,
        }
    }
}

/// Adjustment applied to every declared gate whose check id matches the pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOverride {
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub blocking: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatesSection {
    /// Glob pattern on check id → override. Applied in pattern order.
    #[serde(default)]
    pub overrides: BTreeMap<String, GateOverride>,
}

/// Root of `baton.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatonToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub delegation: DelegationSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub gates: GatesSection,
}

impl BatonToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse baton.toml")
    }

    /// Load `.baton/baton.toml`, or defaults when the file does not exist.
    pub fn load_or_default(baton_dir: &Path) -> Result<Self> {
        let config_path = baton_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize baton.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply the environment layer. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(ENV_MODE) {
            self.delegation.mode = mode
                .parse()
                .with_context(|| format!("Invalid {}", ENV_MODE))?;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            self.delegation.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} '{}'", ENV_TIMEOUT_MS, timeout))?;
        }
        if let Some(cmd) = lookup(ENV_EXECUTOR_CMD)
            && !cmd.trim().is_empty()
        {
            self.delegation.command = Some(cmd);
        }
        Ok(())
    }

    /// Declared gates with every matching override applied.
    pub fn apply_gate_overrides(&self, gates: &[GateDef]) -> Vec<GateDef> {
        gates
            .iter()
            .map(|gate| {
                let mut gate = gate.clone();
                for (pattern, over) in &self.gates.overrides {
                    if !pattern_matches(pattern, &gate.check_id) {
                        continue;
                    }
                    if let Some(severity) = over.severity {
                        gate.severity = severity;
                    }
                    if let Some(blocking) = over.blocking {
                        gate.blocking = blocking;
                    }
                }
                gate
            })
            .collect()
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.delegation.timeout_ms == 0 {
            warnings.push("delegation.timeout_ms is 0: every delegation will time out".to_string());
        }
        if self.delegation.max_attempts == 0 {
            warnings.push(
                "delegation.max_attempts is 0: treated as 1 attempt per delegation".to_string(),
            );
        }
        if self.delegation.mode == ExecutionMode::Process && self.delegation.command.is_none() {
            warnings.push(format!(
                "delegation.mode is 'process' but no delegation.command is set (or {})",
                ENV_EXECUTOR_CMD
            ));
        }
        if self.budget.max_delegations == Some(0) {
            warnings.push("budget.max_delegations is 0: no delegation can be sent".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!("Invalid logging.level '{}'", self.logging.level));
        }
        for pattern in self.gates.overrides.keys() {
            if glob::Pattern::new(pattern).is_err() {
                warnings.push(format!("Invalid gate override pattern '{}'", pattern));
            }
        }

        warnings
    }
}

/// Glob match of a gate check id. Invalid patterns match nothing.
pub fn pattern_matches(pattern: &str, check_id: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(check_id))
        .unwrap_or(false)
}
