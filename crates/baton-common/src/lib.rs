//! Shared domain types for baton: workflow state keys, the project manifest,
//! quality gate records and the delegation wire messages.

pub mod gate;
pub mod handoff;
pub mod manifest;
pub mod protocol;
pub mod schema;
pub mod state;

pub use gate::{GateDef, GateStatus, QualityGateResult, Severity};
pub use handoff::HandoffRecord;
pub use manifest::{
    ArtifactLink, BudgetCounters, MANIFEST_SCHEMA_VERSION, Manifest, Producer,
    SUPPORTED_MANIFEST_MAJOR,
};
pub use protocol::{DelegationEnvelope, DelegationReply, HandoffNote, WireMessage};
pub use schema::SchemaId;
pub use state::{ParseStateError, Phase, StateKey, SubState};
