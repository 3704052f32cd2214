//! Workflow state identifiers.
//!
//! The workflow is a two-level tree: top-level [`Phase`]s, some of which are
//! split into ordered [`SubState`]s. A [`StateKey`] names one node of that
//! tree and is the key used by the transition table and the handler table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a phase, sub-state or state key string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseStateError {
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("unknown sub-state '{0}'")]
    UnknownSubState(String),

    #[error("sub-state {sub_state} does not belong to phase {phase}")]
    Mismatched { phase: Phase, sub_state: SubState },

    #[error("phase {0} requires a sub-state")]
    SubStateRequired(Phase),
}

/// Top-level workflow phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Implementation,
    Verification,
    Release,
    Maintenance,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Planning,
        Phase::Implementation,
        Phase::Verification,
        Phase::Release,
        Phase::Maintenance,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "PLANNING",
            Phase::Implementation => "IMPLEMENTATION",
            Phase::Verification => "VERIFICATION",
            Phase::Release => "RELEASE",
            Phase::Maintenance => "MAINTENANCE",
        }
    }

    /// Ordered sub-states of this phase (empty for leaf phases).
    pub const fn sub_states(&self) -> &'static [SubState] {
        match self {
            Phase::Planning => &[
                SubState::FeatureSpecification,
                SubState::TechnicalResearch,
                SubState::ArchitectureDesign,
                SubState::TaskBreakdown,
            ],
            Phase::Verification => &[SubState::TestExecution, SubState::AcceptanceReview],
            Phase::Implementation | Phase::Release | Phase::Maintenance => &[],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStateError::UnknownPhase(s.to_string()))
    }
}

/// Sub-states of the phases that have them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubState {
    FeatureSpecification,
    TechnicalResearch,
    ArchitectureDesign,
    TaskBreakdown,
    TestExecution,
    AcceptanceReview,
}

impl SubState {
    pub const ALL: [SubState; 6] = [
        SubState::FeatureSpecification,
        SubState::TechnicalResearch,
        SubState::ArchitectureDesign,
        SubState::TaskBreakdown,
        SubState::TestExecution,
        SubState::AcceptanceReview,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SubState::FeatureSpecification => "FEATURE_SPECIFICATION",
            SubState::TechnicalResearch => "TECHNICAL_RESEARCH",
            SubState::ArchitectureDesign => "ARCHITECTURE_DESIGN",
            SubState::TaskBreakdown => "TASK_BREAKDOWN",
            SubState::TestExecution => "TEST_EXECUTION",
            SubState::AcceptanceReview => "ACCEPTANCE_REVIEW",
        }
    }

    /// The phase this sub-state belongs to.
    pub const fn parent(&self) -> Phase {
        match self {
            SubState::FeatureSpecification
            | SubState::TechnicalResearch
            | SubState::ArchitectureDesign
            | SubState::TaskBreakdown => Phase::Planning,
            SubState::TestExecution | SubState::AcceptanceReview => Phase::Verification,
        }
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubState::ALL
            .into_iter()
            .find(|sub| sub.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStateError::UnknownSubState(s.to_string()))
    }
}

/// One node of the workflow tree: a phase plus an optional sub-state.
///
/// Serialized as `PHASE` or `PHASE/SUB_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateKey {
    pub phase: Phase,
    pub sub_state: Option<SubState>,
}

impl StateKey {
    /// Key for a phase without sub-states.
    pub const fn phase(phase: Phase) -> Self {
        Self {
            phase,
            sub_state: None,
        }
    }

    /// Key for a sub-state; the phase is derived from it.
    pub const fn sub(sub_state: SubState) -> Self {
        Self {
            phase: sub_state.parent(),
            sub_state: Some(sub_state),
        }
    }

    /// Build a key from its parts, rejecting combinations outside the tree.
    pub fn try_new(phase: Phase, sub_state: Option<SubState>) -> Result<Self, ParseStateError> {
        match sub_state {
            Some(sub) if sub.parent() != phase => Err(ParseStateError::Mismatched {
                phase,
                sub_state: sub,
            }),
            None if !phase.sub_states().is_empty() => {
                Err(ParseStateError::SubStateRequired(phase))
            }
            _ => Ok(Self { phase, sub_state }),
        }
    }

    /// Directory segments used for artifacts produced in this state.
    pub fn path_segments(&self) -> Vec<&'static str> {
        let mut segments = vec![self.phase.as_str()];
        if let Some(sub) = self.sub_state {
            segments.push(sub.as_str());
        }
        segments
    }

    /// Compact form used in file names (`PLANNING.TASK_BREAKDOWN`).
    pub fn file_stem(&self) -> String {
        self.path_segments().join(".")
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_state {
            Some(sub) => write!(f, "{}/{}", self.phase, sub),
            None => write!(f, "{}", self.phase),
        }
    }
}

impl FromStr for StateKey {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (phase, sub) = match s.split_once('/') {
            Some((phase, sub)) => (phase.parse::<Phase>()?, Some(sub.parse::<SubState>()?)),
            None => (s.parse::<Phase>()?, None),
        };
        StateKey::try_new(phase, sub)
    }
}

impl From<StateKey> for String {
    fn from(key: StateKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for StateKey {
    type Error = ParseStateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
