//! Typed results of one state machine iteration.
//!
//! A halt is routine: the manifest is consistent and the operator can act on
//! the remediation and run again. Fatal conditions are `OrchestratorError`s.

use baton_common::{QualityGateResult, StateKey};
use thiserror::Error;

use crate::errors::{
    EXIT_DELEGATION, EXIT_GATE_BLOCKED, EXIT_MISSING_ARTIFACT, EXIT_OK, SchemaValidationError,
};

/// Why an iteration stopped without committing a transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Halt {
    #[error("Required artifact '{artifact}' for {state} is missing")]
    MissingArtifact { state: StateKey, artifact: String },

    #[error("Required artifact '{artifact}' for {state} is invalid: {reason}")]
    InvalidArtifact {
        state: StateKey,
        artifact: String,
        reason: String,
    },

    #[error("Blocking quality gate(s) failed for {state}: {}", gate_ids(.failures))]
    GateBlocked {
        state: StateKey,
        failures: Vec<QualityGateResult>,
    },

    #[error("Delegation for {state} timed out after {attempts} attempt(s) of {timeout_ms} ms")]
    DelegationTimeout {
        state: StateKey,
        attempts: u32,
        timeout_ms: u64,
    },

    #[error("Delegation for {state} failed: {reason}")]
    DelegationFailed { state: StateKey, reason: String },

    #[error("Artifact produced by {state} failed validation: {error}")]
    SchemaValidation {
        state: StateKey,
        error: SchemaValidationError,
    },

    #[error("Delegation budget exhausted: {used} of {limit} delegations used")]
    BudgetExhausted { used: u64, limit: u64 },
}

fn gate_ids(failures: &[QualityGateResult]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.check_id, f.status))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Halt {
    pub fn exit_code(&self) -> u8 {
        match self {
            Halt::GateBlocked { .. } => EXIT_GATE_BLOCKED,
            Halt::MissingArtifact { .. }
            | Halt::InvalidArtifact { .. }
            | Halt::SchemaValidation { .. } => EXIT_MISSING_ARTIFACT,
            Halt::DelegationTimeout { .. }
            | Halt::DelegationFailed { .. }
            | Halt::BudgetExhausted { .. } => EXIT_DELEGATION,
        }
    }

    /// Operator-facing next step.
    pub fn remediation(&self) -> String {
        match self {
            Halt::MissingArtifact { artifact, .. } | Halt::InvalidArtifact { artifact, .. }
                if artifact == "feature_spec" =>
            {
                "Provide it with 'baton import feature_spec <file>', then run again".to_string()
            }
            Halt::MissingArtifact { artifact, .. } => format!(
                "The state that produces '{}' has not completed; check 'baton status'",
                artifact
            ),
            Halt::InvalidArtifact { artifact, .. } => format!(
                "Restore or regenerate '{}'; it no longer matches its manifest link",
                artifact
            ),
            Halt::GateBlocked { failures, .. } => {
                let hints: Vec<String> = failures
                    .iter()
                    .map(|f| match &f.remediation {
                        Some(hint) => format!("{}: {}", f.check_id, hint),
                        None => format!("{}: {}", f.check_id, f.message.as_deref().unwrap_or("see gate history")),
                    })
                    .collect();
                format!("{}. Then run again to retry this state", hints.join("; "))
            }
            Halt::DelegationTimeout { .. } => {
                "Check that the executor is running and responsive, or raise delegation.timeout_ms"
                    .to_string()
            }
            Halt::DelegationFailed { .. } => {
                "Inspect the executor's error output, fix the cause, then run again".to_string()
            }
            Halt::SchemaValidation { error, .. } => format!(
                "The executor must answer with a payload matching {}",
                error.schema
            ),
            Halt::BudgetExhausted { .. } => {
                "Raise budget.max_delegations in baton.toml to continue".to_string()
            }
        }
    }
}

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The state's artifact was linked and the manifest moved forward.
    Advanced {
        from: StateKey,
        to: StateKey,
        artifact: String,
    },
    /// The terminal state finished; the project is complete.
    Completed { state: StateKey, artifact: String },
    /// Nothing to do: the project had already completed.
    AlreadyComplete,
    Halted(Halt),
}

impl StepOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            StepOutcome::Halted(halt) => halt.exit_code(),
            _ => EXIT_OK,
        }
    }

    /// True when running another iteration makes sense.
    pub fn can_continue(&self) -> bool {
        matches!(self, StepOutcome::Advanced { .. })
    }
}
