use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::StateKey;

/// Informational note written when one state's output becomes the next
/// state's input. Never read back for control decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from_phase: StateKey,
    pub to_phase: StateKey,
    pub summary: String,
    #[serde(default)]
    pub pending_items: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl HandoffRecord {
    pub fn new(from_phase: StateKey, to_phase: StateKey, summary: impl Into<String>) -> Self {
        Self {
            from_phase,
            to_phase,
            summary: summary.into(),
            pending_items: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_pending_items(mut self, items: Vec<String>) -> Self {
        self.pending_items = items;
        self
    }
}
