//! Typed error hierarchy for the baton coordinator.
//!
//! Four enums cover the subsystems:
//! - `StoreError`: manifest and artifact persistence
//! - `DelegationError`: the request/response channel to the external executor
//! - `HandlerError`: a phase handler failing to produce its artifact
//! - `OrchestratorError`: fatal state machine failures
//!
//! Routine halts (missing inputs, blocked gates, timeouts) are not errors; they
//! are reported through `orchestrator::Halt` so the loop can thread them as values.

use baton_common::{SchemaId, StateKey};
use std::path::PathBuf;
use thiserror::Error;

/// Process exit code: iteration completed (or project already complete).
pub const EXIT_OK: u8 = 0;
/// Process exit code: halted by a blocking quality gate.
pub const EXIT_GATE_BLOCKED: u8 = 1;
/// Process exit code: a required artifact is missing or invalid.
pub const EXIT_MISSING_ARTIFACT: u8 = 2;
/// Process exit code: delegation timed out after retries or the executor failed.
pub const EXIT_DELEGATION: u8 = 3;
/// Process exit code: fatal manifest, lock or configuration failure.
pub const EXIT_FATAL: u8 = 4;

/// Content did not match its declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("content does not match schema {schema}: {}", .problems.join("; "))]
pub struct SchemaValidationError {
    pub schema: SchemaId,
    pub problems: Vec<String>,
}

impl SchemaValidationError {
    pub fn new(schema: SchemaId, problems: Vec<String>) -> Self {
        Self { schema, problems }
    }

    pub fn single(schema: SchemaId, problem: impl Into<String>) -> Self {
        Self::new(schema, vec![problem.into()])
    }
}

/// Errors from the manifest and artifact stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Manifest for project '{project_id}' not found at {path}")]
    ManifestNotFound { project_id: String, path: PathBuf },

    #[error("Project '{project_id}' already exists at {path}")]
    ProjectExists { project_id: String, path: PathBuf },

    #[error("Manifest at {path} is corrupt: {reason}")]
    ManifestCorruption { path: PathBuf, reason: String },

    #[error("Manifest lock {path} is not held by this process ({holder})")]
    ManifestLock { path: PathBuf, holder: String },

    #[error("Artifact '{name}' not found at {path}")]
    ArtifactNotFound { name: String, path: PathBuf },

    #[error("Artifact '{name}' at {path} is unreadable: {reason}")]
    ArtifactCorrupt {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from a single delegation round trip.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// No matching, well-formed reply arrived before the deadline.
    #[error("No reply to request {correlation_id} within {timeout_ms} ms")]
    Timeout {
        correlation_id: String,
        timeout_ms: u64,
    },

    #[error("Executor reported an error for request {correlation_id}: {message}")]
    Executor {
        correlation_id: String,
        message: String,
    },

    #[error("Reply payload rejected: {0}")]
    InvalidPayload(#[source] SchemaValidationError),

    #[error("Delegation stream closed: {0}")]
    Closed(String),

    #[error("Delegation transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DelegationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from a phase handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Delegation timed out after {attempts} attempt(s) of {timeout_ms} ms")]
    DelegationTimeout { attempts: u32, timeout_ms: u64 },

    #[error(transparent)]
    Delegation(DelegationError),

    #[error("Produced artifact failed validation: {0}")]
    Schema(#[source] SchemaValidationError),

    #[error("Failed to compose task payload: {0}")]
    Compose(#[source] anyhow::Error),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Schema(schema) => HandlerError::Schema(schema),
            other => HandlerError::Store(other),
        }
    }
}

/// Fatal errors from the state machine. These always map to `EXIT_FATAL`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No handler registered for state {state}")]
    UnknownState { state: StateKey },

    #[error("Handler for {from} proposed '{proposed}' but the transition table requires '{expected}'")]
    IllegalTransition {
        from: StateKey,
        proposed: String,
        expected: String,
    },

    #[error("{0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn exit_code(&self) -> u8 {
        EXIT_FATAL
    }

    /// Operator-facing hint for resolving the failure.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::UnknownState { state } => Some(format!(
                "Register a handler for {} or correct the manifest's current phase",
                state
            )),
            Self::Store(StoreError::ManifestLock { path, .. }) => Some(format!(
                "Make sure no other baton process is running for this project, then remove {}",
                path.display()
            )),
            Self::Store(StoreError::ManifestCorruption { path, .. }) => Some(format!(
                "Restore {} from the archive or a backup; baton will not repair it automatically",
                path.display()
            )),
            Self::Store(StoreError::ManifestNotFound { project_id, .. }) => {
                Some(format!("Run 'baton init {}' first", project_id))
            }
            _ => None,
        }
    }
}
