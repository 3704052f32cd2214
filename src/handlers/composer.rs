//! Task payload composition.
//!
//! The payload sent to the executor is opaque to the channel. The default
//! [`TemplateComposer`] builds it from an instruction text plus the handler's
//! input artifacts:
//!
//! ```json
//! {
//!   "task": "technical_research",
//!   "state": "PLANNING/TECHNICAL_RESEARCH",
//!   "project_id": "checkout",
//!   "instructions": "...",
//!   "produces": "research",
//!   "response_schema": "research/v1",
//!   "inputs": { "requirements": { ... } }
//! }
//! ```
//!
//! Instructions can be overridden per task by dropping a markdown file in
//! `.baton/templates/<task>.md`. `{{project_id}}`, `{{state}}` and `{{schema}}`
//! are substituted.

use anyhow::{Context, Result};
use baton_common::{SchemaId, StateKey};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::ArtifactDocument;

/// Extension of instruction override files.
pub const TEMPLATE_EXTENSION: &str = "md";

/// Inputs for composing one task.
pub struct TaskRequest<'a> {
    pub project_id: &'a str,
    pub state: StateKey,
    pub task: &'a str,
    pub produces: &'a str,
    pub response_schema: &'a SchemaId,
    pub inputs: &'a BTreeMap<String, ArtifactDocument>,
}

/// Builds the opaque task payload for a delegation.
pub trait PromptComposer: Send + Sync {
    fn compose(&self, request: &TaskRequest<'_>) -> Result<Value>;
}

/// Default instructions per task, used when no template override exists.
fn default_instructions(task: &str) -> &'static str {
    match task {
        "feature_specification" => {
            "Turn the feature specification into numbered requirements, each with at least one testable acceptance criterion."
        }
        "technical_research" => {
            "Research the technical questions raised by the requirements. Cite a source for every finding and list open risks."
        }
        "architecture_design" => {
            "Design an architecture that satisfies the requirements using the research findings. Name each component and its responsibility, and record key decisions."
        }
        "task_breakdown" => {
            "Break the architecture into implementation tasks with ids and explicit dependencies. Dependencies must reference existing task ids and must not form cycles."
        }
        "implementation" => {
            "Implement the planned tasks and report every change against the task it belongs to."
        }
        "test_execution" => {
            "Run the test suites covering the implementation and report pass and fail counts per suite."
        }
        "acceptance_review" => {
            "Review each requirement's acceptance criteria against the test report and record whether it is satisfied."
        }
        "release" => "Prepare release notes with a semantic version and the highlights of this release.",
        "maintenance" => {
            "Summarize this maintenance cycle and list follow-up items for the next one."
        }
        _ => "Complete the task using the provided inputs.",
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateComposer {
    templates_dir: Option<PathBuf>,
}

impl TemplateComposer {
    /// Composer that reads overrides from `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: Some(templates_dir.into()),
        }
    }

    fn template_path(&self, task: &str) -> Option<PathBuf> {
        self.templates_dir
            .as_deref()
            .map(|dir| dir.join(format!("{}.{}", task, TEMPLATE_EXTENSION)))
    }

    fn instructions(&self, request: &TaskRequest<'_>) -> Result<String> {
        let text = match self.template_path(request.task) {
            Some(path) if path.exists() => {
                debug!(template = %path.display(), "using instruction override");
                read_template(&path)?
            }
            _ => format!(
                "{} Respond with a JSON object matching {{{{schema}}}}.",
                default_instructions(request.task)
            ),
        };
        Ok(text
            .replace("{{project_id}}", request.project_id)
            .replace("{{state}}", &request.state.to_string())
            .replace("{{schema}}", &request.response_schema.to_string()))
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template: {}", path.display()))
}

impl PromptComposer for TemplateComposer {
    fn compose(&self, request: &TaskRequest<'_>) -> Result<Value> {
        let inputs: Map<String, Value> = request
            .inputs
            .iter()
            .map(|(name, doc)| (name.clone(), doc.content.clone()))
            .collect();

        Ok(json!({
            "task": request.task,
            "state": request.state.to_string(),
            "project_id": request.project_id,
            "instructions": self.instructions(request)?.trim(),
            "produces": request.produces,
            "response_schema": request.response_schema.to_string(),
            "inputs": inputs,
        }))
    }
}
