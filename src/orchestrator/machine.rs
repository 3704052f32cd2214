//! The state machine loop.
//!
//! Each iteration loads the manifest fresh, runs the handler for the current
//! state, evaluates its gates, and commits at most one manifest write. Nothing
//! is carried between iterations except the delegation channel.

use baton_common::{HandoffRecord, Manifest, StateKey};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::outcome::{Halt, StepOutcome};
use super::session::ProjectSession;
use crate::baton_config::BatonToml;
use crate::config::Config;
use crate::delegation::DelegationChannel;
use crate::errors::{HandlerError, OrchestratorError, StoreError};
use crate::gates::{QualityGateEngine, blocking_failures};
use crate::handlers::{
    DelegationSettings, HandlerContext, HandlerOutput, HandlerRegistry, PhaseHandler,
};
use crate::phase::{Transition, next_state};
use crate::store::ArtifactDocument;

/// Knobs that shape an iteration without changing the workflow.
#[derive(Debug, Clone, Default)]
pub struct MachineOptions {
    pub delegation: DelegationSettings,
    /// Halt before delegating once `budget_counters.delegations_sent` reaches this.
    pub max_delegations: Option<u64>,
    /// Source of `[gates.overrides]`.
    pub gate_config: BatonToml,
}

impl MachineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delegation: DelegationSettings {
                timeout_ms: config.timeout_ms,
                max_attempts: config.max_attempts,
            },
            max_delegations: config.max_delegations,
            gate_config: config.toml().clone(),
        }
    }
}

pub struct StateMachine {
    session: ProjectSession,
    handlers: HandlerRegistry,
    gates: QualityGateEngine,
    channel: DelegationChannel,
    options: MachineOptions,
}

impl StateMachine {
    pub fn new(
        session: ProjectSession,
        handlers: HandlerRegistry,
        gates: QualityGateEngine,
        channel: DelegationChannel,
        options: MachineOptions,
    ) -> Self {
        Self {
            session,
            handlers,
            gates,
            channel,
            options,
        }
    }

    pub fn session(&self) -> &ProjectSession {
        &self.session
    }

    pub fn into_session(self) -> ProjectSession {
        self.session
    }

    /// Run one iteration.
    pub async fn step(&mut self) -> Result<StepOutcome, OrchestratorError> {
        let mut manifest = self.session.load()?;
        let state = manifest.state_key();

        if manifest.is_complete() {
            info!(project = %manifest.project_id, "project already complete");
            return Ok(StepOutcome::AlreadyComplete);
        }

        let handler: Arc<dyn PhaseHandler> = self
            .handlers
            .get(state)
            .cloned()
            .ok_or(OrchestratorError::UnknownState { state })?;
        let expected = next_state(state).ok_or(OrchestratorError::UnknownState { state })?;

        let inputs = match self.collect_inputs(&manifest, handler.as_ref()) {
            Ok(inputs) => inputs,
            Err(halt) => {
                warn!(%state, reason = %halt, "required input unavailable");
                return Ok(StepOutcome::Halted(halt));
            }
        };

        if let Some(limit) = self.options.max_delegations {
            let used = manifest.budget_counters.delegations_sent;
            if used >= limit {
                warn!(%state, used, limit, "delegation budget exhausted");
                return Ok(StepOutcome::Halted(Halt::BudgetExhausted { used, limit }));
            }
        }

        info!(project = %manifest.project_id, %state, "running handler");
        let before = self.channel.stats();
        let result = {
            let ctx = HandlerContext {
                manifest: &manifest,
                inputs: &inputs,
                artifacts: self.session.artifacts(),
                settings: self.options.delegation,
            };
            handler.run(&ctx, &mut self.channel).await
        };
        let used = self.channel.stats() - before;
        let counters = &mut manifest.budget_counters;
        counters.iterations += 1;
        counters.delegations_sent += used.sent;
        counters.delegation_timeouts += used.timeouts;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let halt = match e {
                    HandlerError::DelegationTimeout {
                        attempts,
                        timeout_ms,
                    } => Halt::DelegationTimeout {
                        state,
                        attempts,
                        timeout_ms,
                    },
                    HandlerError::Delegation(e) => Halt::DelegationFailed {
                        state,
                        reason: e.to_string(),
                    },
                    HandlerError::Schema(error) => Halt::SchemaValidation { state, error },
                    HandlerError::Store(e) => return Err(e.into()),
                    HandlerError::Compose(e) => {
                        return Err(e.context(format!("Failed to compose task for {}", state)).into());
                    }
                };
                self.session.commit(&mut manifest)?;
                warn!(%state, reason = %halt, "handler did not produce an artifact");
                return Ok(StepOutcome::Halted(halt));
            }
        };

        if output.proposed != expected {
            return Err(OrchestratorError::IllegalTransition {
                from: state,
                proposed: output.proposed.to_string(),
                expected: expected.to_string(),
            });
        }

        let gate_defs = self
            .options
            .gate_config
            .apply_gate_overrides(handler.gates());
        let results = self
            .gates
            .evaluate(state, &output.artifact.document, &gate_defs);
        let failures = blocking_failures(&results);
        manifest.record_gate_results(results);

        if !failures.is_empty() {
            self.session.commit(&mut manifest)?;
            warn!(%state, failed = failures.len(), "blocking quality gate failed");
            return Ok(StepOutcome::Halted(Halt::GateBlocked { state, failures }));
        }

        let stored = self.session.artifacts().promote(&output.artifact)?;
        let artifact = stored.name().to_string();
        manifest.link_artifact(artifact.clone(), stored.link());
        let outcome = match expected {
            Transition::Advance(next) => {
                manifest.set_state(next);
                StepOutcome::Advanced {
                    from: state,
                    to: next,
                    artifact,
                }
            }
            Transition::Complete => {
                manifest.completed_at = Some(Utc::now());
                StepOutcome::Completed { state, artifact }
            }
        };
        self.session.commit(&mut manifest)?;
        info!(%state, next = %expected, "transition committed");

        if let Transition::Advance(next) = expected {
            self.write_handoff(state, next, &output);
        }
        Ok(outcome)
    }

    /// Iterate until a halt, completion, or `max_steps` iterations.
    pub async fn run(
        &mut self,
        max_steps: Option<usize>,
    ) -> Result<Vec<StepOutcome>, OrchestratorError> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.step().await?;
            let more = outcome.can_continue();
            outcomes.push(outcome);
            if !more || max_steps.is_some_and(|max| outcomes.len() >= max) {
                return Ok(outcomes);
            }
        }
    }

    /// Load and validate every artifact the handler requires.
    fn collect_inputs(
        &self,
        manifest: &Manifest,
        handler: &dyn PhaseHandler,
    ) -> Result<BTreeMap<String, ArtifactDocument>, Halt> {
        let state = handler.state();
        let mut inputs = BTreeMap::new();
        for &name in handler.required_artifacts() {
            let Some(link) = manifest.artifact(name) else {
                return Err(Halt::MissingArtifact {
                    state,
                    artifact: name.to_string(),
                });
            };
            match self.session.artifacts().load_linked(name, link) {
                Ok(document) => {
                    inputs.insert(name.to_string(), document);
                }
                Err(StoreError::ArtifactNotFound { .. }) => {
                    return Err(Halt::MissingArtifact {
                        state,
                        artifact: name.to_string(),
                    });
                }
                Err(e) => {
                    return Err(Halt::InvalidArtifact {
                        state,
                        artifact: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(%state, count = inputs.len(), "inputs loaded");
        Ok(inputs)
    }

    /// Informational only; a failed write never affects the committed step.
    fn write_handoff(&self, from: StateKey, to: StateKey, output: &HandlerOutput) {
        let record = match &output.handoff {
            Some(note) => HandoffRecord::new(from, to, note.summary.clone())
                .with_pending_items(note.pending_items.clone()),
            None => HandoffRecord::new(
                from,
                to,
                format!("{} produced '{}' for {}", from, output.artifact.name(), to),
            ),
        };
        match self.session.handoffs().write(&record) {
            Ok(path) => debug!(path = %path.display(), "handoff recorded"),
            Err(e) => warn!(error = %e, "failed to write handoff record"),
        }
    }
}
