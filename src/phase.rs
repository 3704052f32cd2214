//! The workflow tree and its transition table.
//!
//! The table is the only source of legal moves. Edges always point forward,
//! so history is never rewritten by a transition.

use baton_common::{Phase, StateKey, SubState};
use std::fmt;

/// First state of every new project.
pub const INITIAL_STATE: StateKey = StateKey::sub(SubState::FeatureSpecification);

/// The state with no successor.
pub const TERMINAL_STATE: StateKey = StateKey::phase(Phase::Maintenance);

/// Every state in workflow order.
pub const WORKFLOW: [StateKey; 9] = [
    StateKey::sub(SubState::FeatureSpecification),
    StateKey::sub(SubState::TechnicalResearch),
    StateKey::sub(SubState::ArchitectureDesign),
    StateKey::sub(SubState::TaskBreakdown),
    StateKey::phase(Phase::Implementation),
    StateKey::sub(SubState::TestExecution),
    StateKey::sub(SubState::AcceptanceReview),
    StateKey::phase(Phase::Release),
    StateKey::phase(Phase::Maintenance),
];

/// Result of successfully finishing a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state.
    Advance(StateKey),
    /// The terminal state finished; the project is complete.
    Complete,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Advance(key) => write!(f, "{}", key),
            Transition::Complete => f.write_str("COMPLETE"),
        }
    }
}

/// Position of a state in [`WORKFLOW`].
pub fn position(key: StateKey) -> Option<usize> {
    WORKFLOW.iter().position(|k| *k == key)
}

pub fn is_terminal(key: StateKey) -> bool {
    key == TERMINAL_STATE
}

/// The transition the table allows out of `key`, or `None` for a state that
/// is not part of the tree.
pub fn next_state(key: StateKey) -> Option<Transition> {
    let index = position(key)?;
    Some(match WORKFLOW.get(index + 1) {
        Some(next) => Transition::Advance(*next),
        None => Transition::Complete,
    })
}
