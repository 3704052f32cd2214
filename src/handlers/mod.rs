//! Phase handlers: one per workflow state.
//!
//! A handler receives its validated input artifacts, delegates the work, and
//! stages exactly one output artifact through the artifact store. It never
//! touches the manifest; the state machine promotes and links what the handler
//! produced once its gates pass.

pub mod composer;
pub mod delegating;

use async_trait::async_trait;
use baton_common::{GateDef, HandoffNote, Manifest, Phase, Severity, StateKey, SubState};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::delegation::DelegationChannel;
use crate::errors::HandlerError;
use crate::phase::Transition;
use crate::store::{ArtifactDocument, ArtifactStore, StoredArtifact};

pub use composer::{PromptComposer, TaskRequest, TemplateComposer};
pub use delegating::DelegatingHandler;

/// Delegation limits applied by handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationSettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            max_attempts: 3,
        }
    }
}

/// Everything a handler may read.
pub struct HandlerContext<'a> {
    pub manifest: &'a Manifest,
    /// Required artifacts, already validated, keyed by name.
    pub inputs: &'a BTreeMap<String, ArtifactDocument>,
    pub artifacts: &'a ArtifactStore,
    pub settings: DelegationSettings,
}

/// What a successful handler run hands back to the state machine.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub artifact: StoredArtifact,
    pub proposed: Transition,
    pub handoff: Option<HandoffNote>,
}

#[async_trait]
pub trait PhaseHandler: Send + Sync {
    fn state(&self) -> StateKey;

    /// Artifacts that must be linked and valid before `run` is called.
    fn required_artifacts(&self) -> &[&'static str];

    /// Name of the artifact this handler writes.
    fn produces(&self) -> &'static str;

    fn gates(&self) -> &[GateDef];

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        channel: &mut DelegationChannel,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Static description of a standard handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerSpec {
    pub state: StateKey,
    /// Task name sent to the executor; also the fixture file stem in mock mode.
    pub task: &'static str,
    pub requires: &'static [&'static str],
    pub produces: &'static str,
    /// `(check_id, severity, blocking)`
    pub gates: &'static [(&'static str, Severity, bool)],
}

impl HandlerSpec {
    pub fn gate_defs(&self) -> Vec<GateDef> {
        self.gates
            .iter()
            .map(|(id, severity, blocking)| GateDef::new(*id, *severity, *blocking))
            .collect()
    }
}

use Severity::{Critical, High, Medium};

pub const STANDARD_HANDLERS: [HandlerSpec; 9] = [
    HandlerSpec {
        state: StateKey::sub(SubState::FeatureSpecification),
        task: "feature_specification",
        requires: &["feature_spec"],
        produces: "requirements",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("requirements.acceptance_criteria", High, true),
            ("artifact.no_placeholders", High, true),
        ],
    },
    HandlerSpec {
        state: StateKey::sub(SubState::TechnicalResearch),
        task: "technical_research",
        requires: &["requirements"],
        produces: "research",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("research.sources_cited", High, true),
            ("artifact.no_placeholders", Medium, false),
        ],
    },
    HandlerSpec {
        state: StateKey::sub(SubState::ArchitectureDesign),
        task: "architecture_design",
        requires: &["requirements", "research"],
        produces: "architecture",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("architecture.components_declared", High, true),
            ("artifact.no_placeholders", High, true),
        ],
    },
    HandlerSpec {
        state: StateKey::sub(SubState::TaskBreakdown),
        task: "task_breakdown",
        requires: &["requirements", "architecture"],
        produces: "task_plan",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("tasks.dependencies_resolve", Critical, true),
        ],
    },
    HandlerSpec {
        state: StateKey::phase(Phase::Implementation),
        task: "implementation",
        requires: &["task_plan", "architecture"],
        produces: "implementation_report",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("implementation.changes_listed", High, true),
            ("artifact.no_placeholders", Medium, false),
        ],
    },
    HandlerSpec {
        state: StateKey::sub(SubState::TestExecution),
        task: "test_execution",
        requires: &["task_plan", "implementation_report"],
        produces: "test_report",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("tests.all_passing", Critical, true),
        ],
    },
    HandlerSpec {
        state: StateKey::sub(SubState::AcceptanceReview),
        task: "acceptance_review",
        requires: &["requirements", "test_report"],
        produces: "acceptance_report",
        gates: &[("acceptance.criteria_verified", Critical, true)],
    },
    HandlerSpec {
        state: StateKey::phase(Phase::Release),
        task: "release",
        requires: &["acceptance_report", "implementation_report"],
        produces: "release_notes",
        gates: &[
            ("release.semver", High, true),
            ("artifact.no_placeholders", High, true),
        ],
    },
    HandlerSpec {
        state: StateKey::phase(Phase::Maintenance),
        task: "maintenance",
        requires: &["release_notes"],
        produces: "maintenance_log",
        gates: &[
            ("artifact.non_empty", Critical, true),
            ("maintenance.follow_ups_tracked", Medium, false),
        ],
    },
];

/// Standard spec for a state, if any.
pub fn spec_for(state: StateKey) -> Option<&'static HandlerSpec> {
    STANDARD_HANDLERS.iter().find(|spec| spec.state == state)
}

/// Handler per state. Built once at startup and never changed while running.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<StateKey, Arc<dyn PhaseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delegating handler for every state in the workflow.
    pub fn standard(composer: Arc<dyn PromptComposer>) -> Self {
        let mut registry = Self::new();
        for spec in &STANDARD_HANDLERS {
            registry.register(Arc::new(DelegatingHandler::new(spec, Arc::clone(&composer))));
        }
        registry
    }

    /// Add or replace the handler for its state.
    pub fn register(&mut self, handler: Arc<dyn PhaseHandler>) {
        self.handlers.insert(handler.state(), handler);
    }

    pub fn remove(&mut self, state: StateKey) -> Option<Arc<dyn PhaseHandler>> {
        self.handlers.remove(&state)
    }

    pub fn get(&self, state: StateKey) -> Option<&Arc<dyn PhaseHandler>> {
        self.handlers.get(&state)
    }

    /// The state whose handler writes `artifact`.
    pub fn producer_of(&self, artifact: &str) -> Option<StateKey> {
        self.handlers
            .values()
            .find(|h| h.produces() == artifact)
            .map(|h| h.state())
    }

    pub fn states(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.handlers.keys().copied()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}
