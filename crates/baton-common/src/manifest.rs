//! The project manifest: the single authoritative record of project state.
//!
//! Evolution is additive-only. New fields must carry `#[serde(default)]` so
//! manifests written by older versions keep loading; removing, renaming or
//! retyping a field requires bumping the major part of [`MANIFEST_SCHEMA_VERSION`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::gate::QualityGateResult;
use crate::schema::SchemaId;
use crate::state::{Phase, StateKey, SubState};

/// Version written into new manifests.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

/// Highest manifest major version this build understands.
pub const SUPPORTED_MANIFEST_MAJOR: u32 = 1;

/// Who produced a linked artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum Producer {
    /// Supplied by the operator through an explicit import.
    Operator,
    /// Produced by the handler of a workflow state.
    Phase(StateKey),
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Operator => f.write_str("operator"),
            Producer::Phase(key) => write!(f, "{}", key),
        }
    }
}

/// Manifest entry pointing at a validated artifact on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLink {
    /// Path relative to the project directory.
    pub path: PathBuf,
    pub schema: SchemaId,
    pub produced_by: Producer,
    /// Hex SHA-256 of the artifact content at link time.
    pub digest: String,
    pub linked_at: DateTime<Utc>,
}

/// Usage tallies. Unknown or missing counters default to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetCounters {
    pub iterations: u64,
    pub delegations_sent: u64,
    pub delegation_timeouts: u64,
    pub gate_evaluations: u64,
    pub gate_failures: u64,
    pub maintenance_cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub project_id: String,
    pub current_phase: Phase,
    #[serde(default)]
    pub current_sub_state: Option<SubState>,
    #[serde(default)]
    pub artifact_links: BTreeMap<String, ArtifactLink>,
    #[serde(default)]
    pub quality_gate_history: Vec<QualityGateResult>,
    #[serde(default)]
    pub budget_counters: BudgetCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the terminal state has been committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn new(project_id: impl Into<String>, initial: StateKey) -> Self {
        let now = Utc::now();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            project_id: project_id.into(),
            current_phase: initial.phase,
            current_sub_state: initial.sub_state,
            artifact_links: BTreeMap::new(),
            quality_gate_history: Vec::new(),
            budget_counters: BudgetCounters::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Current position in the workflow tree, without validating it.
    pub fn state_key(&self) -> StateKey {
        StateKey {
            phase: self.current_phase,
            sub_state: self.current_sub_state,
        }
    }

    pub fn set_state(&mut self, key: StateKey) {
        self.current_phase = key.phase;
        self.current_sub_state = key.sub_state;
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Major component of `schema_version`, if it parses.
    pub fn schema_major(&self) -> Option<u32> {
        self.schema_version.split('.').next()?.parse().ok()
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactLink> {
        self.artifact_links.get(name)
    }

    pub fn link_artifact(&mut self, name: impl Into<String>, link: ArtifactLink) {
        self.artifact_links.insert(name.into(), link);
    }

    /// Append gate results. History is never truncated or rewritten.
    pub fn record_gate_results<I>(&mut self, results: I)
    where
        I: IntoIterator<Item = QualityGateResult>,
    {
        for result in results {
            self.budget_counters.gate_evaluations += 1;
            if !result.passed() {
                self.budget_counters.gate_failures += 1;
            }
            self.quality_gate_history.push(result);
        }
    }

    /// Gate history entries recorded against one state.
    pub fn gate_history_for(&self, key: StateKey) -> impl Iterator<Item = &QualityGateResult> {
        self.quality_gate_history
            .iter()
            .filter(move |r| r.state == key)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
