//! Artifact persistence.
//!
//! Artifacts are written through [`ArtifactStore::write`], which validates the
//! content before anything touches disk. Files live under the project directory
//! at `artifacts/<PHASE>[/<SUB_STATE>]/<name>.json` (operator imports under
//! `artifacts/operator/`) and carry a small envelope recording who wrote them.
//!
//! Handler output goes through [`ArtifactStore::stage`] instead, landing in
//! `<name>.pending.json` beside its final location. Only
//! [`ArtifactStore::promote`] moves it into place, so content a gate rejects
//! never replaces a file the manifest already links.

use baton_common::{ArtifactLink, Producer, SchemaId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::atomic::{replace, write_atomic};
use super::schema::SchemaRegistry;
use super::sha256_hex;
use crate::errors::{SchemaValidationError, StoreError};

pub const ARTIFACTS_DIR: &str = "artifacts";

/// On-disk form of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub name: String,
    pub schema: SchemaId,
    pub produced_by: Producer,
    pub written_at: DateTime<Utc>,
    pub content: Value,
}

/// An artifact that has been validated and committed to disk, ready to link.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub relative_path: PathBuf,
    pub digest: String,
    pub document: ArtifactDocument,
}

impl StoredArtifact {
    pub fn name(&self) -> &str {
        &self.document.name
    }

    pub fn link(&self) -> ArtifactLink {
        ArtifactLink {
            path: self.relative_path.clone(),
            schema: self.document.schema.clone(),
            produced_by: self.document.produced_by,
            digest: self.digest.clone(),
            linked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    project_dir: PathBuf,
    schemas: Arc<SchemaRegistry>,
}

impl ArtifactStore {
    pub fn new(project_dir: impl Into<PathBuf>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            project_dir: project_dir.into(),
            schemas,
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Location of an artifact relative to the project directory.
    pub fn relative_path(name: &str, producer: Producer) -> PathBuf {
        let mut path = PathBuf::from(ARTIFACTS_DIR);
        match producer {
            Producer::Operator => path.push("operator"),
            Producer::Phase(key) => {
                for segment in key.path_segments() {
                    path.push(segment);
                }
            }
        }
        path.push(format!("{}.json", name));
        path
    }

    /// Where an attempt's output waits for its gates.
    pub fn staged_path(name: &str, producer: Producer) -> PathBuf {
        Self::relative_path(name, producer).with_file_name(format!("{}.pending.json", name))
    }

    pub fn absolute_path(&self, relative: &Path) -> PathBuf {
        self.project_dir.join(relative)
    }

    pub fn validate(&self, content: &Value, schema: &SchemaId) -> Result<(), SchemaValidationError> {
        self.schemas.validate(content, schema)
    }

    /// Validate then atomically persist an artifact. Invalid content is never written.
    pub fn write(
        &self,
        name: &str,
        schema: &SchemaId,
        producer: Producer,
        content: Value,
    ) -> Result<StoredArtifact, StoreError> {
        self.persist(name, schema, producer, content, Self::relative_path(name, producer))
    }

    /// Like [`write`](Self::write), but to the staged path. Nothing linked is touched.
    pub fn stage(
        &self,
        name: &str,
        schema: &SchemaId,
        producer: Producer,
        content: Value,
    ) -> Result<StoredArtifact, StoreError> {
        self.persist(name, schema, producer, content, Self::staged_path(name, producer))
    }

    /// Move a staged artifact to its final path. Already final artifacts pass through.
    pub fn promote(&self, artifact: &StoredArtifact) -> Result<StoredArtifact, StoreError> {
        let final_path = Self::relative_path(artifact.name(), artifact.document.produced_by);
        if artifact.relative_path == final_path {
            return Ok(artifact.clone());
        }

        let target = self.absolute_path(&final_path);
        replace(&self.absolute_path(&artifact.relative_path), &target)
            .map_err(|e| StoreError::io(&target, e))?;
        debug!(artifact = artifact.name(), path = %target.display(), "artifact promoted");
        Ok(StoredArtifact {
            relative_path: final_path,
            ..artifact.clone()
        })
    }

    fn persist(
        &self,
        name: &str,
        schema: &SchemaId,
        producer: Producer,
        content: Value,
        relative_path: PathBuf,
    ) -> Result<StoredArtifact, StoreError> {
        self.validate(&content, schema)?;

        let digest = content_digest(&content)?;
        let document = ArtifactDocument {
            name: name.to_string(),
            schema: schema.clone(),
            produced_by: producer,
            written_at: Utc::now(),
            content,
        };
        let path = self.absolute_path(&relative_path);
        let bytes = serde_json::to_vec_pretty(&document).map_err(|source| {
            StoreError::Serialization {
                what: format!("artifact '{}'", name),
                source,
            }
        })?;
        write_atomic(&path, &bytes).map_err(|e| StoreError::io(&path, e))?;

        debug!(artifact = name, path = %path.display(), digest = %digest, "artifact written");
        Ok(StoredArtifact {
            relative_path,
            digest,
            document,
        })
    }

    /// Read the artifact stored at `relative` (as recorded in its manifest link).
    pub fn read(&self, name: &str, relative: &Path) -> Result<ArtifactDocument, StoreError> {
        let path = self.absolute_path(relative);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ArtifactNotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let document: ArtifactDocument =
            serde_json::from_slice(&raw).map_err(|e| StoreError::ArtifactCorrupt {
                name: name.to_string(),
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if document.name != name {
            return Err(StoreError::ArtifactCorrupt {
                name: name.to_string(),
                path,
                reason: format!("file holds artifact '{}'", document.name),
            });
        }
        Ok(document)
    }

    /// Read a linked artifact and check it still satisfies the link: the file
    /// exists, holds the content that was linked, and validates against the
    /// linked schema.
    pub fn load_linked(&self, name: &str, link: &ArtifactLink) -> Result<ArtifactDocument, StoreError> {
        let document = self.read(name, &link.path)?;
        let digest = content_digest(&document.content)?;
        if digest != link.digest {
            return Err(StoreError::ArtifactCorrupt {
                name: name.to_string(),
                path: self.absolute_path(&link.path),
                reason: format!(
                    "content digest {} does not match the linked digest {}",
                    short(&digest),
                    short(&link.digest)
                ),
            });
        }
        if document.schema != link.schema {
            return Err(SchemaValidationError::single(
                link.schema.clone(),
                format!("file declares schema {}", document.schema),
            )
            .into());
        }
        self.validate(&document.content, &link.schema)?;
        Ok(document)
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Hex SHA-256 over the canonical JSON of an artifact's content.
pub fn content_digest(content: &Value) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(content).map_err(|source| StoreError::Serialization {
        what: "artifact content".to_string(),
        source,
    })?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_common::{StateKey, SubState};
    use serde_json::json;
    use tempfile::tempdir;

    fn store(dir: &Path) -> ArtifactStore {
        ArtifactStore::new(dir, Arc::new(SchemaRegistry::standard()))
    }

    fn research() -> Value {
        json!({
            "findings": [{"topic": "payments", "summary": "Use provider X", "sources": ["https://example.com"]}],
            "risks": []
        })
    }

    #[test]
    fn write_places_artifact_under_producing_state() {
        let dir = tempdir().unwrap();
        let producer = Producer::Phase(StateKey::sub(SubState::TechnicalResearch));
        let stored = store(dir.path())
            .write("research", &SchemaId::v1("research"), producer, research())
            .unwrap();

        assert_eq!(
            stored.relative_path,
            PathBuf::from("artifacts/PLANNING/TECHNICAL_RESEARCH/research.json")
        );
        assert!(dir.path().join(&stored.relative_path).is_file());
        assert_eq!(stored.digest.len(), 64);
        assert_eq!(stored.link().produced_by, producer);
    }

    #[test]
    fn operator_artifacts_live_under_operator() {
        assert_eq!(
            ArtifactStore::relative_path("feature_spec", Producer::Operator),
            PathBuf::from("artifacts/operator/feature_spec.json")
        );
    }

    #[test]
    fn invalid_content_is_never_written() {
        let dir = tempdir().unwrap();
        let producer = Producer::Phase(StateKey::sub(SubState::TechnicalResearch));
        let err = store(dir.path())
            .write("research", &SchemaId::v1("research"), producer, json!({"risks": []}))
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
        assert!(!dir.path().join("artifacts").exists());
    }

    #[test]
    fn load_linked_round_trips_and_checks_schema() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let producer = Producer::Phase(StateKey::sub(SubState::TechnicalResearch));
        let stored = store
            .write("research", &SchemaId::v1("research"), producer, research())
            .unwrap();

        let doc = store.load_linked("research", &stored.link()).unwrap();
        assert_eq!(doc.content, research());

        let mut wrong = stored.link();
        wrong.schema = SchemaId::v1("architecture");
        let err = store.load_linked("research", &wrong).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn load_linked_rejects_content_changed_after_linking() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let producer = Producer::Phase(StateKey::sub(SubState::TechnicalResearch));
        let stored = store
            .write("research", &SchemaId::v1("research"), producer, research())
            .unwrap();
        let link = stored.link();

        let mut changed = research();
        changed["risks"] = json!(["vendor lock-in"]);
        store
            .write("research", &SchemaId::v1("research"), producer, changed)
            .unwrap();

        let err = store.load_linked("research", &link).unwrap_err();
        match err {
            StoreError::ArtifactCorrupt { name, reason, .. } => {
                assert_eq!(name, "research");
                assert!(reason.contains("digest"));
            }
            other => panic!("Expected ArtifactCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn staged_output_leaves_linked_file_alone_until_promoted() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let producer = Producer::Phase(StateKey::sub(SubState::TechnicalResearch));
        let linked = store
            .write("research", &SchemaId::v1("research"), producer, research())
            .unwrap()
            .link();

        let mut revised = research();
        revised["risks"] = json!(["vendor lock-in"]);
        let staged = store
            .stage("research", &SchemaId::v1("research"), producer, revised.clone())
            .unwrap();
        assert_eq!(
            staged.relative_path,
            PathBuf::from("artifacts/PLANNING/TECHNICAL_RESEARCH/research.pending.json")
        );
        assert_eq!(store.load_linked("research", &linked).unwrap().content, research());

        let promoted = store.promote(&staged).unwrap();
        assert_eq!(promoted.relative_path, linked.path);
        assert!(!dir.path().join(&staged.relative_path).exists());
        assert_eq!(
            store.load_linked("research", &promoted.link()).unwrap().content,
            revised
        );
        assert!(store.load_linked("research", &linked).is_err());
    }

    #[test]
    fn read_missing_and_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let rel = PathBuf::from("artifacts/operator/feature_spec.json");

        let err = store.read("feature_spec", &rel).unwrap_err();
        assert!(matches!(err, StoreError::ArtifactNotFound { .. }));

        std::fs::create_dir_all(dir.path().join("artifacts/operator")).unwrap();
        std::fs::write(dir.path().join(&rel), "{not json").unwrap();
        let err = store.read("feature_spec", &rel).unwrap_err();
        assert!(matches!(err, StoreError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn digest_is_stable_for_equal_content() {
        assert_eq!(
            content_digest(&research()).unwrap(),
            content_digest(&research()).unwrap()
        );
        assert_ne!(
            content_digest(&research()).unwrap(),
            content_digest(&json!({})).unwrap()
        );
    }
}
