//! Built-in gate checks.
//!
//! Checks only read the artifact content. Shape problems that the schema
//! should already have caught surface as `Err`, which the engine records as
//! an `ERROR` result.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::{CheckVerdict, GateCatalog};
use crate::store::ArtifactDocument;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(TODO|TBD|FIXME|XXX)\b|lorem ipsum|<placeholder>").unwrap()
});

static SEMVER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$")
        .unwrap()
});

/// Most offending locations listed in a failure message.
const MAX_REPORTED: usize = 5;

pub fn register_builtin(catalog: &mut GateCatalog) {
    catalog.register("artifact.non_empty", non_empty);
    catalog.register("artifact.no_placeholders", no_placeholders);
    catalog.register("requirements.acceptance_criteria", acceptance_criteria);
    catalog.register("research.sources_cited", sources_cited);
    catalog.register("architecture.components_declared", components_declared);
    catalog.register("tasks.dependencies_resolve", dependencies_resolve);
    catalog.register("implementation.changes_listed", changes_listed);
    catalog.register("tests.all_passing", all_passing);
    catalog.register("acceptance.criteria_verified", criteria_verified);
    catalog.register("release.semver", semver);
    catalog.register("maintenance.follow_ups_tracked", follow_ups_tracked);
}

fn array<'a>(content: &'a Value, field: &str) -> Result<&'a Vec<Value>> {
    content
        .get(field)
        .and_then(Value::as_array)
        .with_context(|| format!("field '{}' is missing or not an array", field))
}

fn str_field<'a>(item: &'a Value, field: &str) -> &'a str {
    item.get(field).and_then(Value::as_str).unwrap_or("")
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn summarize(items: &[String]) -> String {
    let mut shown: Vec<&str> = items.iter().take(MAX_REPORTED).map(String::as_str).collect();
    if items.len() > MAX_REPORTED {
        shown.push("...");
    }
    shown.join(", ")
}

fn non_empty(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let object = doc
        .content
        .as_object()
        .context("artifact content is not an object")?;
    if object.values().any(|v| !is_blank(v)) {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("artifact '{}' has no content", doc.name),
            "Ask the executor to fill in the artifact fields",
        ))
    }
}

fn collect_placeholders(value: &Value, path: String, found: &mut Vec<String>) {
    match value {
        Value::String(s) if PLACEHOLDER_REGEX.is_match(s) => found.push(path),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_placeholders(item, format!("{}/{}", path, i), found);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_placeholders(item, format!("{}/{}", path, key), found);
            }
        }
        _ => {}
    }
}

fn no_placeholders(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let mut found = Vec::new();
    collect_placeholders(&doc.content, String::new(), &mut found);
    if found.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("placeholder text at {}", summarize(&found)),
            "Replace TODO/TBD/FIXME markers with real content",
        ))
    }
}

fn acceptance_criteria(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let missing: Vec<String> = array(&doc.content, "requirements")?
        .iter()
        .filter(|r| r.get("acceptance_criteria").is_none_or(is_blank))
        .map(|r| str_field(r, "id").to_string())
        .collect();
    if missing.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("requirements without acceptance criteria: {}", summarize(&missing)),
            "Give every requirement at least one testable acceptance criterion",
        ))
    }
}

fn sources_cited(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let uncited: Vec<String> = array(&doc.content, "findings")?
        .iter()
        .filter(|f| f.get("sources").is_none_or(is_blank))
        .map(|f| str_field(f, "topic").to_string())
        .collect();
    if uncited.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("findings without sources: {}", summarize(&uncited)),
            "Cite at least one source for each research finding",
        ))
    }
}

fn components_declared(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let components = array(&doc.content, "components")?;
    if components.is_empty() {
        return Ok(CheckVerdict::fail_with(
            "architecture declares no components",
            "List the components and their responsibilities",
        ));
    }
    let mut seen = BTreeSet::new();
    let duplicates: Vec<String> = components
        .iter()
        .map(|c| str_field(c, "name"))
        .filter(|name| !seen.insert(*name))
        .map(str::to_string)
        .collect();
    if duplicates.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail(format!(
            "duplicate component names: {}",
            summarize(&duplicates)
        )))
    }
}

fn dependencies_resolve(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let tasks = array(&doc.content, "tasks")?;
    if tasks.is_empty() {
        return Ok(CheckVerdict::fail_with(
            "task plan contains no tasks",
            "Break the work into at least one task",
        ));
    }

    let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut problems = Vec::new();
    for task in tasks {
        let id = str_field(task, "id");
        let deps = task
            .get("depends_on")
            .and_then(Value::as_array)
            .map(|d| d.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if graph.insert(id, deps).is_some() {
            problems.push(format!("duplicate task id '{}'", id));
        }
    }
    for (id, deps) in &graph {
        for dep in deps {
            if dep == id {
                problems.push(format!("task '{}' depends on itself", id));
            } else if !graph.contains_key(dep) {
                problems.push(format!("task '{}' depends on unknown task '{}'", id, dep));
            }
        }
    }
    if problems.is_empty()
        && let Some(task) = find_cycle(&graph)
    {
        problems.push(format!("dependency cycle through task '{}'", task));
    }

    if problems.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            summarize(&problems),
            "Fix the depends_on lists so they form an acyclic graph of existing tasks",
        ))
    }
}

/// Depth-first search for a cycle; returns a task on it.
fn find_cycle<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Option<&'a str> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Option<&'a str> {
        match marks.get(node) {
            Some(Mark::Visiting) => return Some(node),
            Some(Mark::Done) => return None,
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        for dep in graph.get(node).into_iter().flatten() {
            if let Some(found) = visit(*dep, graph, marks) {
                return Some(found);
            }
        }
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    graph.keys().find_map(|node| visit(*node, graph, &mut marks))
}

fn changes_listed(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    if array(&doc.content, "changes")?.is_empty() {
        Ok(CheckVerdict::fail_with(
            "implementation report lists no changes",
            "Report each change against the task it implements",
        ))
    } else {
        Ok(CheckVerdict::Pass)
    }
}

fn all_passing(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let count = |field: &str| {
        doc.content
            .get(field)
            .and_then(Value::as_u64)
            .with_context(|| format!("field '{}' is missing or not a count", field))
    };
    let passed = count("passed")?;
    let failed = count("failed")?;
    if failed > 0 {
        Ok(CheckVerdict::fail_with(
            format!("{} test(s) failing", failed),
            "Fix the failing tests and re-run test execution",
        ))
    } else if passed == 0 {
        Ok(CheckVerdict::fail_with(
            "no tests were run",
            "Run the test suites before reporting",
        ))
    } else {
        Ok(CheckVerdict::Pass)
    }
}

fn criteria_verified(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let verdict = doc
        .content
        .get("verdict")
        .and_then(Value::as_str)
        .context("field 'verdict' is missing")?;
    let unmet: Vec<String> = array(&doc.content, "criteria")?
        .iter()
        .filter(|c| c.get("satisfied").and_then(Value::as_bool) != Some(true))
        .map(|c| str_field(c, "requirement_id").to_string())
        .collect();

    if !unmet.is_empty() {
        Ok(CheckVerdict::fail_with(
            format!("unsatisfied requirements: {}", summarize(&unmet)),
            "Address the unmet acceptance criteria, then repeat the review",
        ))
    } else if !verdict.trim().eq_ignore_ascii_case("accepted") {
        Ok(CheckVerdict::fail(format!(
            "review verdict is '{}', expected 'accepted'",
            verdict
        )))
    } else {
        Ok(CheckVerdict::Pass)
    }
}

fn semver(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let version = doc
        .content
        .get("version")
        .and_then(Value::as_str)
        .context("field 'version' is missing")?;
    if SEMVER_REGEX.is_match(version.trim()) {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("'{}' is not a semantic version", version),
            "Use MAJOR.MINOR.PATCH, e.g. 1.4.0",
        ))
    }
}

fn follow_ups_tracked(doc: &ArtifactDocument) -> Result<CheckVerdict> {
    let untracked = array(&doc.content, "follow_ups")?
        .iter()
        .enumerate()
        .filter(|(_, item)| match item {
            Value::String(s) => s.trim().is_empty(),
            Value::Object(_) => str_field(item, "title").trim().is_empty(),
            _ => true,
        })
        .map(|(i, _)| format!("follow_ups[{}]", i))
        .collect::<Vec<_>>();
    if untracked.is_empty() {
        Ok(CheckVerdict::Pass)
    } else {
        Ok(CheckVerdict::fail_with(
            format!("follow-ups without a title: {}", summarize(&untracked)),
            "Give every follow-up a title so it can be tracked",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_common::{Producer, SchemaId};
    use chrono::Utc;
    use serde_json::json;

    fn doc(content: Value) -> ArtifactDocument {
        ArtifactDocument {
            name: "x".into(),
            schema: SchemaId::v1("x"),
            produced_by: Producer::Operator,
            written_at: Utc::now(),
            content,
        }
    }

    fn is_fail(verdict: CheckVerdict) -> bool {
        matches!(verdict, CheckVerdict::Fail { .. })
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&doc(json!({"a": "b"}))).unwrap(), CheckVerdict::Pass);
        assert!(is_fail(non_empty(&doc(json!({"a": "  ", "b": []}))).unwrap()));
        assert!(non_empty(&doc(json!([]))).is_err());
    }

    #[test]
    fn test_no_placeholders_reports_paths() {
        let verdict = no_placeholders(&doc(json!({
            "findings": [{"summary": "TBD later"}],
            "risks": ["none"]
        })))
        .unwrap();
        match verdict {
            CheckVerdict::Fail { message, .. } => assert!(message.contains("/findings/0/summary")),
            other => panic!("Expected Fail, got {other:?}"),
        }
        assert_eq!(
            no_placeholders(&doc(json!({"text": "Todos app"}))).unwrap(),
            CheckVerdict::Pass
        );
    }

    #[test]
    fn test_acceptance_criteria() {
        let ok = json!({"requirements": [{"id": "R1", "acceptance_criteria": ["x"]}]});
        assert_eq!(acceptance_criteria(&doc(ok)).unwrap(), CheckVerdict::Pass);
        let bad = json!({"requirements": [{"id": "R2", "acceptance_criteria": []}]});
        assert!(is_fail(acceptance_criteria(&doc(bad)).unwrap()));
        assert!(acceptance_criteria(&doc(json!({}))).is_err());
    }

    #[test]
    fn test_sources_cited() {
        let bad = json!({"findings": [{"topic": "db", "sources": []}]});
        assert!(is_fail(sources_cited(&doc(bad)).unwrap()));
    }

    #[test]
    fn test_components_declared() {
        assert!(is_fail(components_declared(&doc(json!({"components": []}))).unwrap()));
        let dup = json!({"components": [{"name": "api"}, {"name": "api"}]});
        assert!(is_fail(components_declared(&doc(dup)).unwrap()));
    }

    #[test]
    fn test_dependencies_resolve() {
        let ok = json!({"tasks": [
            {"id": "T1", "depends_on": []},
            {"id": "T2", "depends_on": ["T1"]}
        ]});
        assert_eq!(dependencies_resolve(&doc(ok)).unwrap(), CheckVerdict::Pass);

        let unknown = json!({"tasks": [{"id": "T1", "depends_on": ["T9"]}]});
        assert!(is_fail(dependencies_resolve(&doc(unknown)).unwrap()));

        let cycle = json!({"tasks": [
            {"id": "T1", "depends_on": ["T2"]},
            {"id": "T2", "depends_on": ["T1"]}
        ]});
        match dependencies_resolve(&doc(cycle)).unwrap() {
            CheckVerdict::Fail { message, .. } => assert!(message.contains("cycle")),
            other => panic!("Expected Fail, got {other:?}"),
        }
    }

    #[test]
    fn test_all_passing() {
        assert_eq!(
            all_passing(&doc(json!({"passed": 10, "failed": 0}))).unwrap(),
            CheckVerdict::Pass
        );
        assert!(is_fail(all_passing(&doc(json!({"passed": 10, "failed": 1}))).unwrap()));
        assert!(is_fail(all_passing(&doc(json!({"passed": 0, "failed": 0}))).unwrap()));
    }

    #[test]
    fn test_criteria_verified() {
        let ok = json!({"verdict": "Accepted", "criteria": [{"requirement_id": "R1", "satisfied": true}]});
        assert_eq!(criteria_verified(&doc(ok)).unwrap(), CheckVerdict::Pass);
        let unmet = json!({"verdict": "accepted", "criteria": [{"requirement_id": "R1", "satisfied": false}]});
        assert!(is_fail(criteria_verified(&doc(unmet)).unwrap()));
        let rejected = json!({"verdict": "rejected", "criteria": []});
        assert!(is_fail(criteria_verified(&doc(rejected)).unwrap()));
    }

    #[test]
    fn test_semver() {
        for good in ["1.0.0", "v2.3.4", "0.1.0-rc.1", "1.2.3+build.5"] {
            assert_eq!(semver(&doc(json!({"version": good}))).unwrap(), CheckVerdict::Pass);
        }
        for bad in ["1.0", "01.0.0", "latest"] {
            assert!(is_fail(semver(&doc(json!({"version": bad}))).unwrap()), "{bad}");
        }
    }

    #[test]
    fn test_follow_ups_tracked() {
        let ok = json!({"follow_ups": ["rotate keys", {"title": "upgrade deps"}]});
        assert_eq!(follow_ups_tracked(&doc(ok)).unwrap(), CheckVerdict::Pass);
        let bad = json!({"follow_ups": [{"owner": "ops"}, 3]});
        assert!(is_fail(follow_ups_tracked(&doc(bad)).unwrap()));
    }
}
