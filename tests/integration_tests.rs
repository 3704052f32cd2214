//! Integration tests for baton
//!
//! These drive the binary end to end in mock mode, with executor replies
//! served from `.baton/fixtures/<task>.json`.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROJECT: &str = "checkout";

/// Helper to create a baton Command running in mock mode inside `dir`
fn baton(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("baton");
    cmd.current_dir(dir.path())
        .env_remove("BATON_MODE")
        .env_remove("BATON_TIMEOUT_MS")
        .env_remove("RUST_LOG")
        .args(["--mode", "mock", "--timeout-ms", "200"]);
    cmd
}

fn project_dir(dir: &TempDir) -> PathBuf {
    dir.path().join(".baton/projects").join(PROJECT)
}

fn manifest(dir: &TempDir) -> Value {
    let raw = fs::read_to_string(project_dir(dir).join("manifest.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Create the workspace and project.
fn init_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    baton(&dir).args(["init", PROJECT]).assert().success();
    dir
}

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn write_fixture(dir: &TempDir, task: &str, reply: Value) {
    write_json(
        &dir.path().join(".baton/fixtures").join(format!("{task}.json")),
        &reply,
    );
}

fn import_feature_spec(dir: &TempDir) {
    let file = dir.path().join("feature.json");
    write_json(
        &file,
        &json!({
            "title": "Guest checkout",
            "summary": "Let shoppers buy without creating an account.",
            "goals": ["Reduce cart abandonment"]
        }),
    );
    baton(dir)
        .args(["import", "feature_spec"])
        .arg(&file)
        .assert()
        .success();
}

/// Gate-passing replies for every task in the workflow.
fn write_all_fixtures(dir: &TempDir) {
    let replies = [
        (
            "feature_specification",
            json!({"requirements": [{
                "id": "R1",
                "statement": "A shopper can pay without an account",
                "acceptance_criteria": ["Checkout completes with only an email address"]
            }]}),
        ),
        (
            "technical_research",
            json!({
                "findings": [{
                    "topic": "Payment provider",
                    "summary": "Guest tokens are supported.",
                    "sources": ["https://docs.example.com/guest-tokens"]
                }],
                "risks": ["Fraud rate may rise"]
            }),
        ),
        (
            "architecture_design",
            json!({
                "overview": "A guest session service in front of the order pipeline.",
                "components": [
                    {"name": "guest-session", "responsibility": "Issue guest tokens"},
                    {"name": "order-api", "responsibility": "Accept guest orders"}
                ],
                "decisions": ["Guest tokens expire after 30 minutes"]
            }),
        ),
        (
            "task_breakdown",
            json!({"tasks": [
                {"id": "T1", "title": "Guest session service", "depends_on": []},
                {"id": "T2", "title": "Order API support", "depends_on": ["T1"]}
            ]}),
        ),
        (
            "implementation",
            json!({
                "summary": "Guest sessions and order API changes are in place.",
                "changes": [
                    {"task_id": "T1", "description": "Added guest-session service"},
                    {"task_id": "T2", "description": "Order API accepts guest tokens"}
                ]
            }),
        ),
        (
            "test_execution",
            json!({"passed": 42, "failed": 0, "suites": ["unit", "e2e"]}),
        ),
        (
            "acceptance_review",
            json!({
                "verdict": "accepted",
                "criteria": [{"requirement_id": "R1", "satisfied": true}]
            }),
        ),
        (
            "release",
            json!({"version": "1.4.0", "highlights": ["Guest checkout"]}),
        ),
        (
            "maintenance",
            json!({
                "cycle_summary": "No incidents since release.",
                "follow_ups": [{"title": "Review fraud metrics"}]
            }),
        ),
    ];
    for (task, payload) in replies {
        write_fixture(dir, task, json!({ "payload": payload }));
    }
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_baton_help() {
        cargo_bin_cmd!("baton").arg("--help").assert().success();
    }

    #[test]
    fn test_baton_version() {
        cargo_bin_cmd!("baton").arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = init_project();
        for sub in ["projects", "fixtures", "templates", "archive", "logs"] {
            assert!(dir.path().join(".baton").join(sub).is_dir(), "missing {sub}");
        }
        let manifest = manifest(&dir);
        assert_eq!(manifest["project_id"], PROJECT);
        assert_eq!(manifest["current_sub_state"], "FEATURE_SPECIFICATION");
    }

    #[test]
    fn test_init_twice_is_fatal() {
        let dir = init_project();
        baton(&dir)
            .args(["init", PROJECT])
            .assert()
            .code(4)
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_init_rejects_bad_project_id() {
        let dir = TempDir::new().unwrap();
        baton(&dir)
            .args(["init", "Not A Valid Id"])
            .assert()
            .code(4)
            .stderr(predicate::str::contains("Invalid project id"));
    }

    #[test]
    fn test_status_shows_initial_state() {
        let dir = init_project();
        baton(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains(PROJECT))
            .stdout(predicate::str::contains("step 1/9"));
    }

    #[test]
    fn test_commands_need_a_project() {
        let dir = TempDir::new().unwrap();
        baton(&dir)
            .arg("status")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("baton init"));
    }
}

// =============================================================================
// Operator Import
// =============================================================================

mod import {
    use super::*;

    #[test]
    fn test_import_links_feature_spec() {
        let dir = init_project();
        import_feature_spec(&dir);
        let manifest = manifest(&dir);
        assert_eq!(
            manifest["artifact_links"]["feature_spec"]["schema"],
            "feature_spec/v1"
        );
    }

    #[test]
    fn test_import_invalid_content_exits_2() {
        let dir = init_project();
        let file = dir.path().join("feature.json");
        write_json(&file, &json!({"title": "Only a title"}));
        baton(&dir)
            .args(["import", "feature_spec"])
            .arg(&file)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("feature_spec/v1"));
        assert!(manifest(&dir)["artifact_links"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_import_missing_file_exits_2() {
        let dir = init_project();
        baton(&dir)
            .args(["import", "feature_spec", "nope.json"])
            .assert()
            .code(2);
    }

    #[test]
    fn test_reimport_after_advancing_needs_force() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_all_fixtures(&dir);
        baton(&dir).arg("step").assert().success();
        let linked = manifest(&dir)["artifact_links"]["feature_spec"]["digest"].clone();

        let file = dir.path().join("feature-v2.json");
        write_json(
            &file,
            &json!({
                "title": "Guest checkout v2",
                "summary": "Let shoppers buy without creating an account.",
                "goals": ["Reduce cart abandonment"]
            }),
        );
        baton(&dir)
            .args(["import", "feature_spec"])
            .arg(&file)
            .assert()
            .code(4)
            .stderr(predicate::str::contains("--force"));
        assert_eq!(
            manifest(&dir)["artifact_links"]["feature_spec"]["digest"],
            linked
        );

        baton(&dir)
            .args(["import", "feature_spec", "--force"])
            .arg(&file)
            .assert()
            .success();
        assert_ne!(
            manifest(&dir)["artifact_links"]["feature_spec"]["digest"],
            linked
        );
    }

    #[test]
    fn test_import_of_workflow_artifact_is_refused() {
        let dir = init_project();
        let file = dir.path().join("plan.json");
        write_json(&file, &json!({"tasks": []}));
        baton(&dir)
            .args(["import", "task_plan"])
            .arg(&file)
            .assert()
            .code(4)
            .stderr(predicate::str::contains("cannot be imported"));
    }
}

// =============================================================================
// Workflow Scenarios
// =============================================================================

mod scenarios {
    use super::*;

    /// A: the first state runs without its operator input.
    #[test]
    fn test_missing_feature_spec_halts_with_exit_2() {
        let dir = init_project();
        let before = fs::read(project_dir(&dir).join("manifest.json")).unwrap();

        baton(&dir)
            .arg("step")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("MissingArtifact"))
            .stderr(predicate::str::contains("feature_spec"));

        let after = fs::read(project_dir(&dir).join("manifest.json")).unwrap();
        assert_eq!(before, after);
    }

    /// B: a blocking gate rejects the produced artifact.
    #[test]
    fn test_blocking_gate_halts_with_exit_1() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_fixture(
            &dir,
            "feature_specification",
            json!({"payload": {"requirements": [{
                "id": "R1",
                "statement": "A shopper can pay without an account",
                "acceptance_criteria": []
            }]}}),
        );

        baton(&dir)
            .arg("step")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("GateBlocked"))
            .stderr(predicate::str::contains("requirements.acceptance_criteria"));

        let manifest = manifest(&dir);
        assert_eq!(manifest["current_sub_state"], "FEATURE_SPECIFICATION");
        assert!(manifest["artifact_links"].get("requirements").is_none());
        assert_eq!(manifest["budget_counters"]["gate_failures"], 1);
        let produced = project_dir(&dir).join("artifacts/PLANNING/FEATURE_SPECIFICATION");
        assert!(produced.join("requirements.pending.json").is_file());
        assert!(!produced.join("requirements.json").exists());

        baton(&dir)
            .arg("history")
            .assert()
            .success()
            .stdout(predicate::str::contains("requirements.acceptance_criteria"));
    }

    /// C: the executor never answers.
    #[test]
    fn test_unanswered_delegation_halts_with_exit_3() {
        let dir = init_project();
        import_feature_spec(&dir);

        baton(&dir)
            .arg("step")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("DelegationTimeout"));

        let manifest = manifest(&dir);
        assert_eq!(manifest["current_sub_state"], "FEATURE_SPECIFICATION");
        assert_eq!(manifest["budget_counters"]["delegations_sent"], 3);
        assert_eq!(manifest["budget_counters"]["delegation_timeouts"], 3);
    }

    /// D: a valid reply advances to the next state.
    #[test]
    fn test_valid_reply_advances_with_exit_0() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_all_fixtures(&dir);

        baton(&dir)
            .arg("step")
            .assert()
            .success()
            .stderr(predicate::str::contains("TECHNICAL_RESEARCH"));

        let manifest = manifest(&dir);
        assert_eq!(manifest["current_phase"], "PLANNING");
        assert_eq!(manifest["current_sub_state"], "TECHNICAL_RESEARCH");
        assert!(manifest["artifact_links"].get("requirements").is_some());
        let handoffs: Vec<_> = fs::read_dir(project_dir(&dir).join("handoffs"))
            .unwrap()
            .collect();
        assert_eq!(handoffs.len(), 1);
    }

    #[test]
    fn test_full_run_completes_the_workflow() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_all_fixtures(&dir);

        baton(&dir).arg("run").assert().success();
        baton(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("complete"))
            .stdout(predicate::str::contains("release_notes"));

        baton(&dir)
            .arg("step")
            .assert()
            .success()
            .stderr(predicate::str::contains("already complete"));

        baton(&dir).arg("maintain").assert().success();
        baton(&dir).arg("step").assert().success();
        assert_eq!(manifest(&dir)["budget_counters"]["maintenance_cycles"], 1);
    }

    #[test]
    fn test_run_respects_max_steps() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_all_fixtures(&dir);

        baton(&dir).args(["run", "--max-steps", "2"]).assert().success();
        assert_eq!(manifest(&dir)["budget_counters"]["iterations"], 2);
    }

    #[test]
    fn test_executor_error_exits_3() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_fixture(&dir, "feature_specification", json!({"error": "model unavailable"}));

        baton(&dir)
            .arg("step")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("model unavailable"));
    }
}

// =============================================================================
// Interactive Mode
// =============================================================================

mod interactive {
    use super::*;
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    /// Nobody answers on stdin, but it stays open: the step must still exit
    /// once its attempts time out instead of waiting for more input.
    #[test]
    fn test_unanswered_step_exits_while_stdin_is_open() {
        let dir = init_project();
        import_feature_spec(&dir);

        let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_baton"))
            .current_dir(dir.path())
            .env_remove("BATON_MODE")
            .env_remove("BATON_TIMEOUT_MS")
            .env_remove("RUST_LOG")
            .args(["--mode", "interactive", "--timeout-ms", "200", "step"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let held_stdin = child.stdin.take().unwrap();

        let deadline = Instant::now() + Duration::from_secs(20);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break Some(status);
            }
            if Instant::now() >= deadline {
                break None;
            }
            std::thread::sleep(Duration::from_millis(50));
        };
        if status.is_none() {
            child.kill().unwrap();
        }
        drop(held_stdin);

        let status = status.expect("baton kept running after the step finished");
        assert_eq!(status.code(), Some(3));
        let manifest = manifest(&dir);
        assert_eq!(manifest["budget_counters"]["delegation_timeouts"], 3);
    }
}

// =============================================================================
// Fatal Conditions
// =============================================================================

mod fatal {
    use super::*;

    #[test]
    fn test_corrupt_manifest_exits_4() {
        let dir = init_project();
        fs::write(project_dir(&dir).join("manifest.json"), "{ not json").unwrap();

        baton(&dir)
            .arg("step")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("corrupt"));
    }

    #[test]
    fn test_held_lock_exits_4() {
        let dir = init_project();
        let _lock =
            baton::store::ManifestLock::acquire(&project_dir(&dir).join("manifest.lock")).unwrap();

        baton(&dir)
            .arg("step")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("manifest.lock"));
    }

    #[test]
    fn test_archive_moves_project() {
        let dir = init_project();
        baton(&dir).args(["archive", "--force"]).assert().success();
        assert!(!project_dir(&dir).exists());
        let archived: Vec<_> = fs::read_dir(dir.path().join(".baton/archive"))
            .unwrap()
            .collect();
        assert_eq!(archived.len(), 1);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_then_validate() {
        let dir = init_project();
        baton(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created baton.toml"));
        assert!(dir.path().join(".baton/baton.toml").exists());

        baton(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_config_show_reports_cli_overrides() {
        let dir = init_project();
        baton(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mode = \"mock\""))
            .stdout(predicate::str::contains("timeout_ms = 200"));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = init_project();
        fs::write(dir.path().join(".baton/baton.toml"), "[delegation\nmode = 1").unwrap();
        baton(&dir).arg("status").assert().code(4);
    }

    #[test]
    fn test_budget_limit_halts_with_exit_3() {
        let dir = init_project();
        import_feature_spec(&dir);
        write_all_fixtures(&dir);
        fs::write(
            dir.path().join(".baton/baton.toml"),
            "[budget]\nmax_delegations = 1\n",
        )
        .unwrap();

        baton(&dir).arg("run").assert().code(3).stderr(
            predicate::str::contains("BudgetExhausted"),
        );
        assert_eq!(manifest(&dir)["budget_counters"]["delegations_sent"], 1);
    }
}
