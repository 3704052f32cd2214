//! State machine iteration: `baton step` and `baton run`.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use baton::config::Config;
use baton::delegation::{DelegationChannel, open_transport};
use baton::errors::EXIT_OK;
use baton::gates::{GateCatalog, QualityGateEngine};
use baton::handlers::{HandlerRegistry, TemplateComposer};
use baton::orchestrator::{MachineOptions, ProjectSession, StateMachine};
use baton::store::SchemaRegistry;
use baton::ui;

fn build_machine(config: &Config, project_id: &str) -> Result<StateMachine> {
    let schemas = Arc::new(SchemaRegistry::standard());
    let session = ProjectSession::open(&config.projects_dir, project_id, schemas.clone())?;

    let composer = Arc::new(TemplateComposer::new(config.templates_dir.clone()));
    let handlers = HandlerRegistry::standard(composer);
    let gates = QualityGateEngine::new(GateCatalog::standard());
    let channel = DelegationChannel::new(open_transport(config)?, schemas);

    info!(
        project = project_id,
        mode = %config.mode,
        timeout_ms = config.timeout_ms,
        "state machine ready"
    );
    Ok(StateMachine::new(
        session,
        handlers,
        gates,
        channel,
        MachineOptions::from_config(config),
    ))
}

/// Run exactly one iteration.
pub async fn cmd_step(config: &Config, project_id: &str) -> Result<u8> {
    let mut machine = build_machine(config, project_id)?;
    let outcome = machine.step().await?;
    ui::print_outcome(&outcome);
    Ok(outcome.exit_code())
}

/// Iterate until a halt or completion. The exit code is the last outcome's.
pub async fn cmd_run(config: &Config, project_id: &str, max_steps: Option<usize>) -> Result<u8> {
    let mut machine = build_machine(config, project_id)?;
    let outcomes = machine.run(max_steps).await?;
    for outcome in &outcomes {
        ui::print_outcome(outcome);
    }
    Ok(outcomes.last().map_or(EXIT_OK, |outcome| outcome.exit_code()))
}
