//! Console rendering of iteration outcomes, project status and gate history.
//!
//! Outcome and failure reports go to stderr: in interactive mode stdout carries
//! delegation frames. The `render_*` functions build the text so callers can
//! pick the stream.

use baton_common::{GateStatus, Manifest, QualityGateResult};
use console::style;
use std::fmt::Write;

use crate::errors::OrchestratorError;
use crate::orchestrator::{Halt, StepOutcome};
use crate::phase::{WORKFLOW, position};
use crate::ui::icons::{
    ARROW, BLOCKER, CHECK, CLOCK, CROSS, FILE, FOLDER, HINT, MISSING, PROGRESS, SPARKLE,
};

/// One- or multi-line description of an iteration result.
pub fn render_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Advanced { from, to, artifact } => format!(
            "{}{} produced {} {}{}",
            CHECK,
            style(from).bold(),
            style(artifact).cyan(),
            ARROW,
            style(to).bold()
        ),
        StepOutcome::Completed { state, artifact } => format!(
            "{}{} produced {}; workflow complete",
            SPARKLE,
            style(state).bold(),
            style(artifact).cyan()
        ),
        StepOutcome::AlreadyComplete => format!(
            "{}Workflow already complete. Start another cycle with 'baton maintain'",
            SPARKLE
        ),
        StepOutcome::Halted(halt) => render_halt(halt),
    }
}

fn render_halt(halt: &Halt) -> String {
    let icon = match halt {
        Halt::MissingArtifact { .. } | Halt::InvalidArtifact { .. } => &MISSING,
        Halt::GateBlocked { .. } => &BLOCKER,
        Halt::DelegationTimeout { .. } => &CLOCK,
        Halt::DelegationFailed { .. }
        | Halt::SchemaValidation { .. }
        | Halt::BudgetExhausted { .. } => &CROSS,
    };

    let mut out = format!(
        "{}{} [{}] {}",
        icon,
        style("Halted").red().bold(),
        halt_kind(halt),
        halt
    );
    if let Halt::GateBlocked { failures, .. } = halt {
        for failure in failures {
            let _ = write!(
                out,
                "\n    {} {} ({}): {}",
                style(&failure.check_id).yellow(),
                failure.status,
                failure.severity,
                failure.message.as_deref().unwrap_or("no details")
            );
        }
    }
    let _ = write!(out, "\n  {}{}", HINT, halt.remediation());
    out
}

fn halt_kind(halt: &Halt) -> &'static str {
    match halt {
        Halt::MissingArtifact { .. } => "MissingArtifact",
        Halt::InvalidArtifact { .. } => "InvalidArtifact",
        Halt::GateBlocked { .. } => "GateBlocked",
        Halt::DelegationTimeout { .. } => "DelegationTimeout",
        Halt::DelegationFailed { .. } => "DelegationFailed",
        Halt::SchemaValidation { .. } => "SchemaValidation",
        Halt::BudgetExhausted { .. } => "BudgetExhausted",
    }
}

pub fn print_outcome(outcome: &StepOutcome) {
    eprintln!("{}", render_outcome(outcome));
}

/// Report a fatal error with its remediation when one is known.
pub fn print_fatal(err: &anyhow::Error) {
    eprintln!("{}{} {:#}", CROSS, style("Error:").red().bold(), err);
    if let Some(hint) = err
        .downcast_ref::<OrchestratorError>()
        .and_then(OrchestratorError::remediation)
    {
        eprintln!("  {}{}", HINT, hint);
    }
}

/// Current state, workflow position, linked artifacts and counters.
pub fn render_status(manifest: &Manifest, max_delegations: Option<u64>) -> String {
    let key = manifest.state_key();
    let mut out = String::new();

    let _ = writeln!(out, "{}Project {}", FOLDER, style(&manifest.project_id).bold());
    if manifest.is_complete() {
        let _ = writeln!(out, "State:    {} ({})", key, style("complete").green());
    } else {
        let step = position(key).map(|i| i + 1).unwrap_or(0);
        let _ = writeln!(
            out,
            "State:    {} (step {}/{})",
            style(key).yellow(),
            step,
            WORKFLOW.len()
        );
    }
    let _ = writeln!(out, "Created:  {}", manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Updated:  {}", manifest.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let _ = writeln!(out, "\nArtifacts:");
    if manifest.artifact_links.is_empty() {
        let _ = writeln!(out, "  {}", style("(none)").dim());
    }
    for (name, link) in &manifest.artifact_links {
        let _ = writeln!(
            out,
            "  {}{:<22} {:<24} {} {}",
            FILE,
            name,
            link.produced_by,
            link.path.display(),
            style(&link.digest[..link.digest.len().min(12)]).dim()
        );
    }

    let counters = &manifest.budget_counters;
    let delegations = match max_delegations {
        Some(limit) => format!("{}/{}", counters.delegations_sent, limit),
        None => counters.delegations_sent.to_string(),
    };
    let _ = writeln!(out, "\n{}Counters:", PROGRESS);
    let _ = writeln!(out, "  iterations:          {}", counters.iterations);
    let _ = writeln!(out, "  delegations sent:    {}", delegations);
    let _ = writeln!(out, "  delegation timeouts: {}", counters.delegation_timeouts);
    let _ = writeln!(
        out,
        "  gate evaluations:    {} ({} failed)",
        counters.gate_evaluations, counters.gate_failures
    );
    let _ = writeln!(out, "  maintenance cycles:  {}", counters.maintenance_cycles);
    out
}

/// Table of gate results, oldest first.
pub fn render_gate_history(results: &[QualityGateResult]) -> String {
    if results.is_empty() {
        return "No quality gates have been evaluated yet.\n".to_string();
    }

    let mut out = format!(
        "{:<20} {:<22} {:<32} {:<6} {:<8} Message\n",
        "Time", "State", "Check", "Status", "Severity"
    );
    for result in results {
        let status = match result.status {
            GateStatus::Pass => style(result.status.to_string()).green(),
            GateStatus::Fail => style(result.status.to_string()).red(),
            GateStatus::Error => style(result.status.to_string()).magenta(),
        };
        let severity = if result.blocking {
            result.severity.to_string()
        } else {
            format!("{}*", result.severity)
        };
        let _ = writeln!(
            out,
            "{:<20} {:<22} {:<32} {:<6} {:<8} {}",
            result.timestamp.format("%Y-%m-%d %H:%M:%S"),
            result.state.to_string(),
            result.check_id,
            status,
            severity,
            result.message.as_deref().unwrap_or("")
        );
    }
    out.push_str("(* advisory)\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_common::{Severity, StateKey, SubState};
    use chrono::Utc;

    fn result(status: GateStatus, blocking: bool) -> QualityGateResult {
        QualityGateResult {
            check_id: "tests.all_passing".into(),
            severity: Severity::Critical,
            blocking,
            status,
            state: StateKey::sub(SubState::TestExecution),
            timestamp: Utc::now(),
            duration_ms: 1,
            message: Some("2 test(s) failing".into()),
            remediation: None,
        }
    }

    #[test]
    fn halt_report_names_kind_gate_and_remediation() {
        let text = render_outcome(&StepOutcome::Halted(Halt::GateBlocked {
            state: StateKey::sub(SubState::TestExecution),
            failures: vec![result(GateStatus::Fail, true)],
        }));
        assert!(text.contains("GateBlocked"));
        assert!(text.contains("tests.all_passing"));
        assert!(text.contains("2 test(s) failing"));
        assert!(text.contains("run again"));
    }

    #[test]
    fn status_shows_state_and_counters() {
        let mut manifest = Manifest::new("checkout", crate::phase::INITIAL_STATE);
        manifest.budget_counters.delegations_sent = 4;
        let text = render_status(&manifest, Some(10));
        assert!(text.contains("checkout"));
        assert!(text.contains("step 1/9"));
        assert!(text.contains("4/10"));
        assert!(text.contains("(none)"));
    }

    #[test]
    fn gate_history_marks_advisory_results() {
        let text = render_gate_history(&[result(GateStatus::Pass, false)]);
        assert!(text.contains("critical*"));
        assert!(text.contains("(* advisory)"));
        assert!(render_gate_history(&[]).contains("No quality gates"));
    }
}
