//! Quality gate definitions and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::state::StateKey;

/// Severity of a quality gate, ordered from most to least critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "info" => Ok(Severity::Info),
            _ => Err(format!(
                "Invalid severity '{}'. Valid values: critical, high, medium, info",
                s
            )),
        }
    }
}

/// Outcome of a single gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pass,
    Fail,
    /// The check itself could not run (not registered, returned an error, panicked).
    Error,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateStatus::Pass => "PASS",
            GateStatus::Fail => "FAIL",
            GateStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A gate declared for a workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDef {
    pub check_id: String,
    pub severity: Severity,
    pub blocking: bool,
}

impl GateDef {
    pub fn new(check_id: impl Into<String>, severity: Severity, blocking: bool) -> Self {
        Self {
            check_id: check_id.into(),
            severity,
            blocking,
        }
    }

    pub fn blocking(check_id: impl Into<String>, severity: Severity) -> Self {
        Self::new(check_id, severity, true)
    }

    pub fn advisory(check_id: impl Into<String>, severity: Severity) -> Self {
        Self::new(check_id, severity, false)
    }
}

/// One recorded gate evaluation. Entries are append-only in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub check_id: String,
    pub severity: Severity,
    pub blocking: bool,
    pub status: GateStatus,
    /// State whose output was evaluated.
    pub state: StateKey,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl QualityGateResult {
    /// True when this result must stop the transition: a blocking gate
    /// that did not pass.
    pub fn blocks(&self) -> bool {
        self.blocking && self.status != GateStatus::Pass
    }

    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }
}
