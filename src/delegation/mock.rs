//! Transports that answer without a live executor.
//!
//! [`FixtureTransport`] replays canned replies from `.baton/fixtures/` and backs
//! `--mode mock`. [`MockTransport`] follows an in-memory script and is meant for
//! tests.

use async_trait::async_trait;
use baton_common::{DelegationEnvelope, DelegationReply, HandoffNote};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::DelegationTransport;
use crate::errors::DelegationError;

/// Name of the task in a composed payload, used to pick a fixture file.
pub fn task_name(envelope: &DelegationEnvelope) -> Option<&str> {
    envelope.task_payload.get("task").and_then(Value::as_str)
}

fn timeout(envelope: &DelegationEnvelope) -> DelegationError {
    DelegationError::Timeout {
        correlation_id: envelope.correlation_id.clone(),
        timeout_ms: envelope.timeout_ms,
    }
}

/// One scripted executor behaviour.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Payload(Value),
    PayloadWithHandoff(Value, HandoffNote),
    Error(String),
    /// Nothing arrives before the deadline.
    Silence,
    /// Only a reply carrying another request's correlation id arrives.
    WrongCorrelation(Value),
    /// Only an undecodable frame arrives.
    Malformed,
}

/// Scripted in-memory executor. Replies are consumed in order; an exhausted
/// script behaves like a silent executor.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<ScriptedReply>,
    requests: Arc<Mutex<Vec<DelegationEnvelope>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            script: replies.into_iter().collect(),
            requests: Arc::default(),
        }
    }

    pub fn push(&mut self, reply: ScriptedReply) {
        self.script.push_back(reply);
    }

    /// Shared view of every request received so far.
    pub fn requests(&self) -> Arc<Mutex<Vec<DelegationEnvelope>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl DelegationTransport for MockTransport {
    async fn exchange(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(envelope.clone());
        }
        let id = envelope.correlation_id.clone();
        match self.script.pop_front() {
            Some(ScriptedReply::Payload(payload)) => Ok(DelegationReply::success(id, payload)),
            Some(ScriptedReply::PayloadWithHandoff(payload, note)) => {
                Ok(DelegationReply::success(id, payload).with_handoff(note))
            }
            Some(ScriptedReply::Error(message)) => Ok(DelegationReply::failure(id, message)),
            Some(ScriptedReply::WrongCorrelation(_)) => {
                warn!(expected = %id, "discarding reply with mismatched correlation id");
                tokio::time::sleep(envelope.timeout()).await;
                Err(timeout(envelope))
            }
            Some(ScriptedReply::Malformed) => {
                warn!("discarding malformed frame");
                tokio::time::sleep(envelope.timeout()).await;
                Err(timeout(envelope))
            }
            Some(ScriptedReply::Silence) | None => {
                tokio::time::sleep(envelope.timeout()).await;
                Err(timeout(envelope))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Contents of a fixture file.
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    handoff: Option<HandoffNote>,
}

/// Replays `<fixtures_dir>/<task>.json` for every request.
///
/// A missing or unreadable fixture is treated as an executor that never
/// answered, so mock runs exercise the same timeout path as live ones.
#[derive(Debug, Clone)]
pub struct FixtureTransport {
    dir: PathBuf,
}

impl FixtureTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self, task: &str) -> Option<Fixture> {
        let path = self.dir.join(format!("{}.json", task));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(fixture = %path.display(), error = %e, "no fixture reply available");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(fixture) => Some(fixture),
            Err(e) => {
                warn!(fixture = %path.display(), error = %e, "discarding malformed fixture");
                None
            }
        }
    }
}

#[async_trait]
impl DelegationTransport for FixtureTransport {
    async fn exchange(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError> {
        let Some(task) = task_name(envelope) else {
            warn!(correlation_id = %envelope.correlation_id, "request has no task name");
            return Err(timeout(envelope));
        };
        let Some(fixture) = self.load(task) else {
            return Err(timeout(envelope));
        };

        let reply = DelegationReply {
            correlation_id: envelope.correlation_id.clone(),
            payload: fixture.payload,
            error: fixture.error,
            handoff: fixture.handoff,
        };
        if !reply.is_well_formed() {
            warn!(task, "fixture must carry exactly one of payload and error");
            return Err(timeout(envelope));
        }
        debug!(task, "replaying fixture reply");
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
