//! Structural artifact schemas.
//!
//! A schema lists required top-level fields with their JSON kind and, for
//! array fields, the fields every item must carry. Extra fields are allowed so
//! executors can attach additional detail.

use baton_common::SchemaId;
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::SchemaValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-blank string.
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::String => "a non-empty string",
            FieldKind::Number => "a number",
            FieldKind::Bool => "a boolean",
            FieldKind::Array => "an array",
            FieldKind::Object => "an object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Required fields of each element when `kind` is `Array`.
    pub item_fields: &'static [(&'static str, FieldKind)],
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        item_fields: &[],
    }
}

const fn items(name: &'static str, item_fields: &'static [(&'static str, FieldKind)]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Array,
        item_fields,
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactSchema {
    pub id: SchemaId,
    pub fields: Vec<FieldSpec>,
}

impl ArtifactSchema {
    pub fn new(id: SchemaId, fields: Vec<FieldSpec>) -> Self {
        Self { id, fields }
    }

    pub fn validate(&self, content: &Value) -> Result<(), SchemaValidationError> {
        let Some(object) = content.as_object() else {
            return Err(SchemaValidationError::single(
                self.id.clone(),
                "content must be a JSON object",
            ));
        };

        let mut problems = Vec::new();
        for spec in &self.fields {
            match object.get(spec.name) {
                None | Some(Value::Null) => {
                    problems.push(format!("missing required field '{}'", spec.name));
                }
                Some(value) if !spec.kind.matches(value) => problems.push(format!(
                    "field '{}' must be {}",
                    spec.name,
                    spec.kind.describe()
                )),
                Some(Value::Array(elements)) if !spec.item_fields.is_empty() => {
                    for (index, element) in elements.iter().enumerate() {
                        for (name, kind) in spec.item_fields {
                            let ok = element.get(name).is_some_and(|v| kind.matches(v));
                            if !ok {
                                problems.push(format!(
                                    "'{}[{}].{}' must be {}",
                                    spec.name,
                                    index,
                                    name,
                                    kind.describe()
                                ));
                            }
                        }
                    }
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError::new(self.id.clone(), problems))
        }
    }
}

/// Schemas known to this build, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaId, ArtifactSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the schema of every artifact in the standard workflow.
    pub fn standard() -> Self {
        use FieldKind::*;

        let mut registry = Self::new();
        let mut add = |name: &str, fields: Vec<FieldSpec>| {
            registry.register(ArtifactSchema::new(SchemaId::v1(name), fields));
        };

        add(
            "feature_spec",
            vec![field("title", String), field("summary", String), field("goals", Array)],
        );
        add(
            "requirements",
            vec![items(
                "requirements",
                &[
                    ("id", String),
                    ("statement", String),
                    ("acceptance_criteria", Array),
                ],
            )],
        );
        add(
            "research",
            vec![
                items(
                    "findings",
                    &[("topic", String), ("summary", String), ("sources", Array)],
                ),
                field("risks", Array),
            ],
        );
        add(
            "architecture",
            vec![
                field("overview", String),
                items("components", &[("name", String), ("responsibility", String)]),
                field("decisions", Array),
            ],
        );
        add(
            "task_plan",
            vec![items(
                "tasks",
                &[("id", String), ("title", String), ("depends_on", Array)],
            )],
        );
        add(
            "implementation_report",
            vec![
                field("summary", String),
                items("changes", &[("task_id", String), ("description", String)]),
            ],
        );
        add(
            "test_report",
            vec![
                field("passed", Number),
                field("failed", Number),
                field("suites", Array),
            ],
        );
        add(
            "acceptance_report",
            vec![
                field("verdict", String),
                items("criteria", &[("requirement_id", String), ("satisfied", Bool)]),
            ],
        );
        add(
            "release_notes",
            vec![field("version", String), field("highlights", Array)],
        );
        add(
            "maintenance_log",
            vec![field("cycle_summary", String), field("follow_ups", Array)],
        );

        registry
    }

    pub fn register(&mut self, schema: ArtifactSchema) {
        self.schemas.insert(schema.id.clone(), schema);
    }

    pub fn get(&self, id: &SchemaId) -> Option<&ArtifactSchema> {
        self.schemas.get(id)
    }

    pub fn contains(&self, id: &SchemaId) -> bool {
        self.schemas.contains_key(id)
    }

    /// Validate `content` against the schema `id`. Unknown ids fail.
    pub fn validate(&self, content: &Value, id: &SchemaId) -> Result<(), SchemaValidationError> {
        match self.get(id) {
            Some(schema) => schema.validate(content),
            None => Err(SchemaValidationError::single(
                id.clone(),
                format!("unknown schema '{}'", id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_requirements_pass() {
        let registry = SchemaRegistry::standard();
        let content = json!({
            "requirements": [
                {"id": "R1", "statement": "Users can check out", "acceptance_criteria": ["order stored"]}
            ]
        });
        registry
            .validate(&content, &SchemaId::v1("requirements"))
            .unwrap();
    }

    #[test]
    fn missing_and_mistyped_fields_are_all_reported() {
        let registry = SchemaRegistry::standard();
        let content = json!({"overview": "", "components": [{"name": "api"}]});
        let err = registry
            .validate(&content, &SchemaId::v1("architecture"))
            .unwrap_err();
        assert_eq!(err.schema, SchemaId::v1("architecture"));
        assert!(err.problems.iter().any(|p| p.contains("'overview'")));
        assert!(err.problems.iter().any(|p| p.contains("components[0].responsibility")));
        assert!(err.problems.iter().any(|p| p.contains("'decisions'")));
    }

    #[test]
    fn non_object_content_is_rejected() {
        let registry = SchemaRegistry::standard();
        let err = registry
            .validate(&json!(["x"]), &SchemaId::v1("research"))
            .unwrap_err();
        assert_eq!(err.problems, vec!["content must be a JSON object".to_string()]);
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let registry = SchemaRegistry::standard();
        let err = registry
            .validate(&json!({}), &SchemaId::new("requirements", 9))
            .unwrap_err();
        assert!(err.problems[0].contains("unknown schema"));
    }

    #[test]
    fn extra_fields_are_allowed() {
        let registry = SchemaRegistry::standard();
        let content = json!({"version": "1.0.0", "highlights": [], "notes": "extra"});
        assert!(
            registry
                .validate(&content, &SchemaId::v1("release_notes"))
                .is_ok()
        );
    }
}
