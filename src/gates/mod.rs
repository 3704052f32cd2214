//! Quality gate evaluation.
//!
//! Each workflow state declares a list of [`GateDef`]s. After a handler
//! produces its artifact, [`QualityGateEngine::evaluate`] runs the check
//! registered for every declared gate and returns one result per gate, in
//! declaration order. A gate never gets skipped: a check that is missing,
//! returns an error, or panics is recorded with status `ERROR`.

pub mod checks;

use anyhow::Result;
use baton_common::{GateDef, GateStatus, QualityGateResult, StateKey};
use chrono::Utc;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::store::ArtifactDocument;

/// What a check concluded about an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    Pass,
    Fail {
        message: String,
        remediation: Option<String>,
    },
}

impl CheckVerdict {
    pub fn fail(message: impl Into<String>) -> Self {
        CheckVerdict::Fail {
            message: message.into(),
            remediation: None,
        }
    }

    pub fn fail_with(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        CheckVerdict::Fail {
            message: message.into(),
            remediation: Some(remediation.into()),
        }
    }
}

/// A single quality check. `Err` means the check could not run at all.
pub trait GateCheck: Send + Sync {
    fn run(&self, artifact: &ArtifactDocument) -> Result<CheckVerdict>;
}

impl<F> GateCheck for F
where
    F: Fn(&ArtifactDocument) -> Result<CheckVerdict> + Send + Sync,
{
    fn run(&self, artifact: &ArtifactDocument) -> Result<CheckVerdict> {
        self(artifact)
    }
}

/// Check implementations keyed by check id.
#[derive(Clone, Default)]
pub struct GateCatalog {
    checks: BTreeMap<String, Arc<dyn GateCheck>>,
}

impl GateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in check registered.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        checks::register_builtin(&mut catalog);
        catalog
    }

    pub fn register<C>(&mut self, check_id: impl Into<String>, check: C)
    where
        C: GateCheck + 'static,
    {
        self.checks.insert(check_id.into(), Arc::new(check));
    }

    pub fn get(&self, check_id: &str) -> Option<&Arc<dyn GateCheck>> {
        self.checks.get(check_id)
    }

    pub fn contains(&self, check_id: &str) -> bool {
        self.checks.contains_key(check_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for GateCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateCatalog")
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QualityGateEngine {
    catalog: GateCatalog,
}

impl QualityGateEngine {
    pub fn new(catalog: GateCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &GateCatalog {
        &self.catalog
    }

    /// Run every declared gate against the artifact produced in `state`.
    pub fn evaluate(
        &self,
        state: StateKey,
        artifact: &ArtifactDocument,
        gate_defs: &[GateDef],
    ) -> Vec<QualityGateResult> {
        gate_defs
            .iter()
            .map(|def| self.evaluate_one(state, artifact, def))
            .collect()
    }

    fn evaluate_one(
        &self,
        state: StateKey,
        artifact: &ArtifactDocument,
        def: &GateDef,
    ) -> QualityGateResult {
        let started = Instant::now();
        let (status, message, remediation) = match self.catalog.get(&def.check_id) {
            None => (
                GateStatus::Error,
                Some(format!("no check registered for '{}'", def.check_id)),
                Some(format!(
                    "Register a '{}' check or remove the gate from {}",
                    def.check_id, state
                )),
            ),
            Some(check) => match catch_unwind(AssertUnwindSafe(|| check.run(artifact))) {
                Ok(Ok(CheckVerdict::Pass)) => (GateStatus::Pass, None, None),
                Ok(Ok(CheckVerdict::Fail {
                    message,
                    remediation,
                })) => (GateStatus::Fail, Some(message), remediation),
                Ok(Err(e)) => (
                    GateStatus::Error,
                    Some(format!("check failed to run: {:#}", e)),
                    None,
                ),
                Err(panic) => (
                    GateStatus::Error,
                    Some(format!("check panicked: {}", panic_message(panic.as_ref()))),
                    None,
                ),
            },
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match status {
            GateStatus::Pass => debug!(check = %def.check_id, %state, duration_ms, "gate passed"),
            _ => warn!(
                check = %def.check_id,
                %state,
                %status,
                blocking = def.blocking,
                detail = message.as_deref().unwrap_or(""),
                "gate did not pass"
            ),
        }

        QualityGateResult {
            check_id: def.check_id.clone(),
            severity: def.severity,
            blocking: def.blocking,
            status,
            state,
            timestamp: Utc::now(),
            duration_ms,
            message,
            remediation,
        }
    }
}

/// Results that stop the transition. Any blocking gate that did not pass
/// blocks, including checks that errored.
pub fn blocking_failures(results: &[QualityGateResult]) -> Vec<QualityGateResult> {
    results.iter().filter(|r| r.blocks()).cloned().collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
