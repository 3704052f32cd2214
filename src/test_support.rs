//! Shared helpers for unit tests.

use serde_json::{Value, json};

/// A payload for `artifact` that satisfies its schema and every standard gate.
pub fn good_payload(artifact: &str) -> Value {
    match artifact {
        "feature_spec" => json!({
            "title": "Guest checkout",
            "summary": "Let shoppers buy without creating an account.",
            "goals": ["Reduce cart abandonment"]
        }),
        "requirements" => json!({
            "requirements": [{
                "id": "R1",
                "statement": "A shopper can pay without an account",
                "acceptance_criteria": ["Checkout completes with only an email address"]
            }]
        }),
        "research" => json!({
            "findings": [{
                "topic": "Payment provider",
                "summary": "The current provider supports guest tokens.",
                "sources": ["https://docs.example.com/guest-tokens"]
            }],
            "risks": ["Fraud rate may rise"]
        }),
        "architecture" => json!({
            "overview": "A guest session service in front of the existing order pipeline.",
            "components": [
                {"name": "guest-session", "responsibility": "Issue short-lived guest tokens"},
                {"name": "order-api", "responsibility": "Accept orders from guest sessions"}
            ],
            "decisions": ["Guest tokens expire after 30 minutes"]
        }),
        "task_plan" => json!({
            "tasks": [
                {"id": "T1", "title": "Guest session service", "depends_on": []},
                {"id": "T2", "title": "Order API support", "depends_on": ["T1"]}
            ]
        }),
        "implementation_report" => json!({
            "summary": "Guest sessions and order API changes are in place.",
            "changes": [
                {"task_id": "T1", "description": "Added guest-session service"},
                {"task_id": "T2", "description": "Order API accepts guest tokens"}
            ]
        }),
        "test_report" => json!({"passed": 42, "failed": 0, "suites": ["unit", "e2e"]}),
        "acceptance_report" => json!({
            "verdict": "accepted",
            "criteria": [{"requirement_id": "R1", "satisfied": true}]
        }),
        "release_notes" => json!({
            "version": "1.4.0",
            "highlights": ["Guest checkout"]
        }),
        "maintenance_log" => json!({
            "cycle_summary": "No incidents since release.",
            "follow_ups": [{"title": "Review fraud metrics"}]
        }),
        other => panic!("no test payload for '{other}'"),
    }
}
