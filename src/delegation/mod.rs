//! Synchronous request/response delegation to the external executor.
//!
//! A [`DelegationChannel`] sends one [`DelegationEnvelope`] at a time and waits
//! for the reply bound to its correlation id. `send` takes `&mut self`, so a
//! second request cannot be issued while one is outstanding.
//!
//! | Mode          | Transport                     |
//! |---------------|-------------------------------|
//! | `interactive` | [`stream::stdio_transport`]   |
//! | `process`     | [`stream::ProcessTransport`]  |
//! | `mock`        | [`mock::FixtureTransport`]    |

pub mod codec;
pub mod mock;
pub mod stream;

use anyhow::{Context, Result};
use async_trait::async_trait;
use baton_common::{DelegationEnvelope, DelegationReply};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::baton_config::ExecutionMode;
use crate::config::Config;
use crate::errors::DelegationError;
use crate::store::SchemaRegistry;

pub use mock::{FixtureTransport, MockTransport, ScriptedReply};
pub use stream::{ProcessTransport, StreamTransport};

/// Moves one request to the executor and returns its reply.
///
/// Implementations must return only a well-formed reply whose correlation id
/// matches the request, or `Timeout` once the envelope's deadline passes.
#[async_trait]
pub trait DelegationTransport: Send {
    async fn exchange(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError>;

    fn name(&self) -> &'static str;
}

/// Running totals of channel traffic, folded into the manifest's budget counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelegationStats {
    pub sent: u64,
    pub timeouts: u64,
}

impl std::ops::Sub for DelegationStats {
    type Output = DelegationStats;

    fn sub(self, earlier: DelegationStats) -> DelegationStats {
        DelegationStats {
            sent: self.sent.saturating_sub(earlier.sent),
            timeouts: self.timeouts.saturating_sub(earlier.timeouts),
        }
    }
}

pub struct DelegationChannel {
    transport: Box<dyn DelegationTransport>,
    schemas: Arc<SchemaRegistry>,
    stats: DelegationStats,
}

impl DelegationChannel {
    pub fn new(transport: Box<dyn DelegationTransport>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            transport,
            schemas,
            stats: DelegationStats::default(),
        }
    }

    pub fn stats(&self) -> DelegationStats {
        self.stats
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Send a request and wait for its validated reply.
    ///
    /// On success the reply carries a payload that satisfies
    /// `expected_response_schema`. An executor error reply becomes
    /// [`DelegationError::Executor`].
    pub async fn send(
        &mut self,
        envelope: &DelegationEnvelope,
    ) -> Result<DelegationReply, DelegationError> {
        self.stats.sent += 1;
        debug!(
            transport = self.transport.name(),
            correlation_id = %envelope.correlation_id,
            schema = %envelope.expected_response_schema,
            timeout_ms = envelope.timeout_ms,
            "delegating request"
        );

        let reply = match self.transport.exchange(envelope).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_timeout() {
                    self.stats.timeouts += 1;
                    warn!(correlation_id = %envelope.correlation_id, "delegation timed out");
                }
                return Err(e);
            }
        };

        if reply.correlation_id != envelope.correlation_id || !reply.is_well_formed() {
            self.stats.timeouts += 1;
            warn!(
                expected = %envelope.correlation_id,
                received = %reply.correlation_id,
                "transport returned an unusable reply"
            );
            return Err(DelegationError::Timeout {
                correlation_id: envelope.correlation_id.clone(),
                timeout_ms: envelope.timeout_ms,
            });
        }

        if let Some(message) = reply.error.clone() {
            return Err(DelegationError::Executor {
                correlation_id: reply.correlation_id,
                message,
            });
        }

        if let Some(payload) = &reply.payload {
            self.schemas
                .validate(payload, &envelope.expected_response_schema)
                .map_err(DelegationError::InvalidPayload)?;
        }
        Ok(reply)
    }
}

/// Build the transport selected by the configured execution mode.
/// Must be called inside a tokio runtime.
pub fn open_transport(config: &Config) -> Result<Box<dyn DelegationTransport>> {
    let transport: Box<dyn DelegationTransport> = match config.mode {
        ExecutionMode::Interactive => Box::new(stream::stdio_transport()?),
        ExecutionMode::Process => {
            let command = config.executor_cmd.as_deref().context(
                "Process mode needs an executor: set delegation.command or BATON_EXECUTOR_CMD",
            )?;
            Box::new(ProcessTransport::spawn(command, &config.executor_args)?)
        }
        ExecutionMode::Mock => Box::new(FixtureTransport::new(&config.fixtures_dir)),
    };
    info!(mode = %config.mode, transport = transport.name(), "delegation transport ready");
    Ok(transport)
}
