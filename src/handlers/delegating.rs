//! The standard handler: compose, delegate, validate, persist.

use async_trait::async_trait;
use baton_common::{DelegationEnvelope, DelegationReply, GateDef, Producer, SchemaId, StateKey};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    HandlerContext, HandlerOutput, HandlerSpec, PhaseHandler, PromptComposer, TaskRequest,
};
use crate::delegation::DelegationChannel;
use crate::errors::{DelegationError, HandlerError};
use crate::phase::next_state;

/// Delegates its state's task to the executor and stores the validated reply
/// as the state's output artifact.
pub struct DelegatingHandler {
    spec: HandlerSpec,
    schema: SchemaId,
    gates: Vec<GateDef>,
    composer: Arc<dyn PromptComposer>,
}

impl DelegatingHandler {
    pub fn new(spec: &HandlerSpec, composer: Arc<dyn PromptComposer>) -> Self {
        Self {
            spec: *spec,
            schema: SchemaId::v1(spec.produces),
            gates: spec.gate_defs(),
            composer,
        }
    }

    /// Send the envelope, reissuing it after each timeout until attempts run out.
    async fn delegate(
        &self,
        envelope: DelegationEnvelope,
        max_attempts: u32,
        channel: &mut DelegationChannel,
    ) -> Result<DelegationReply, HandlerError> {
        let state = self.spec.state;
        let max_attempts = max_attempts.max(1);
        let mut envelope = envelope;
        let mut attempt = 1;

        loop {
            match channel.send(&envelope).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_timeout() => {
                    if attempt >= max_attempts {
                        return Err(HandlerError::DelegationTimeout {
                            attempts: attempt,
                            timeout_ms: envelope.timeout_ms,
                        });
                    }
                    warn!(%state, attempt, max_attempts, "delegation timed out, retrying");
                    attempt += 1;
                    envelope = envelope.reissue();
                }
                Err(DelegationError::InvalidPayload(e)) => return Err(HandlerError::Schema(e)),
                Err(e) => return Err(HandlerError::Delegation(e)),
            }
        }
    }
}

#[async_trait]
impl PhaseHandler for DelegatingHandler {
    fn state(&self) -> StateKey {
        self.spec.state
    }

    fn required_artifacts(&self) -> &[&'static str] {
        self.spec.requires
    }

    fn produces(&self) -> &'static str {
        self.spec.produces
    }

    fn gates(&self) -> &[GateDef] {
        &self.gates
    }

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        channel: &mut DelegationChannel,
    ) -> Result<HandlerOutput, HandlerError> {
        let state = self.spec.state;
        let proposed = next_state(state).ok_or_else(|| {
            HandlerError::Compose(anyhow::anyhow!("{} has no entry in the transition table", state))
        })?;

        let payload = self
            .composer
            .compose(&TaskRequest {
                project_id: &ctx.manifest.project_id,
                state,
                task: self.spec.task,
                produces: self.spec.produces,
                response_schema: &self.schema,
                inputs: ctx.inputs,
            })
            .map_err(HandlerError::Compose)?;

        let envelope = DelegationEnvelope::new(payload, self.schema.clone(), ctx.settings.timeout_ms);
        info!(
            %state,
            task = self.spec.task,
            transport = channel.transport_name(),
            "delegating task"
        );

        let reply = self
            .delegate(envelope, ctx.settings.max_attempts, channel)
            .await?;
        let Some(reply_payload) = reply.payload else {
            return Err(HandlerError::Delegation(DelegationError::Executor {
                correlation_id: reply.correlation_id,
                message: "reply carried no payload".to_string(),
            }));
        };

        let artifact = ctx.artifacts.stage(
            self.spec.produces,
            &self.schema,
            Producer::Phase(state),
            reply_payload,
        )?;
        info!(
            %state,
            artifact = artifact.name(),
            path = %artifact.relative_path.display(),
            "artifact staged for gates"
        );

        Ok(HandlerOutput {
            artifact,
            proposed,
            handoff: reply.handoff,
        })
    }
}
