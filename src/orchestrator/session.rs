//! One locked project: the stores plus the lock that makes this process the
//! manifest's only writer.

use baton_common::{Manifest, Producer, SchemaId};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{OrchestratorError, StoreError};
use crate::phase::{INITIAL_STATE, TERMINAL_STATE};
use crate::store::{ArtifactStore, HandoffLog, ManifestLock, ManifestStore, SchemaRegistry, StoredArtifact};

/// Artifacts supplied by the operator instead of a phase handler.
pub const OPERATOR_ARTIFACTS: &[&str] = &["feature_spec"];

#[derive(Debug)]
pub struct ProjectSession {
    project_id: String,
    manifests: ManifestStore,
    artifacts: ArtifactStore,
    handoffs: HandoffLog,
    lock: ManifestLock,
}

impl ProjectSession {
    /// Create a new project at the initial state.
    pub fn create(
        projects_dir: &Path,
        project_id: &str,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self, OrchestratorError> {
        let manifests = ManifestStore::new(projects_dir);
        if manifests.exists(project_id) {
            return Err(StoreError::ProjectExists {
                project_id: project_id.to_string(),
                path: manifests.project_dir(project_id),
            }
            .into());
        }

        let session = Self::locked(manifests, project_id, schemas)?;
        let manifest = Manifest::new(project_id, INITIAL_STATE);
        session.manifests.save(&manifest, &session.lock)?;
        info!(project = project_id, state = %INITIAL_STATE, "project created");
        Ok(session)
    }

    /// Lock an existing project.
    pub fn open(
        projects_dir: &Path,
        project_id: &str,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self, OrchestratorError> {
        let manifests = ManifestStore::new(projects_dir);
        if !manifests.exists(project_id) {
            return Err(StoreError::ManifestNotFound {
                project_id: project_id.to_string(),
                path: manifests.manifest_path(project_id),
            }
            .into());
        }
        Self::locked(manifests, project_id, schemas)
    }

    fn locked(
        manifests: ManifestStore,
        project_id: &str,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self, OrchestratorError> {
        let lock = manifests.lock(project_id)?;
        let project_dir = manifests.project_dir(project_id);
        Ok(Self {
            project_id: project_id.to_string(),
            artifacts: ArtifactStore::new(&project_dir, schemas),
            handoffs: HandoffLog::new(&project_dir),
            manifests,
            lock,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn project_dir(&self) -> PathBuf {
        self.manifests.project_dir(&self.project_id)
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn handoffs(&self) -> &HandoffLog {
        &self.handoffs
    }

    /// Fresh copy of the manifest from disk.
    pub fn load(&self) -> Result<Manifest, OrchestratorError> {
        Ok(self.manifests.load(&self.project_id)?)
    }

    /// Stamp and persist the manifest.
    pub fn commit(&self, manifest: &mut Manifest) -> Result<(), OrchestratorError> {
        manifest.touch();
        self.manifests.save(manifest, &self.lock)?;
        Ok(())
    }

    /// Validate and link an operator-supplied artifact.
    ///
    /// Once the workflow has left the initial state its inputs are part of the
    /// recorded history, so replacing them needs `force`.
    pub fn import_artifact(
        &self,
        name: &str,
        content: Value,
        force: bool,
    ) -> Result<StoredArtifact, OrchestratorError> {
        if !OPERATOR_ARTIFACTS.contains(&name) {
            return Err(OrchestratorError::InvalidOperation(format!(
                "'{}' is produced by the workflow and cannot be imported (importable: {})",
                name,
                OPERATOR_ARTIFACTS.join(", ")
            )));
        }

        let mut manifest = self.load()?;
        let consumed = manifest.state_key() != INITIAL_STATE || manifest.is_complete();
        if consumed && !force {
            return Err(OrchestratorError::InvalidOperation(format!(
                "Project '{}' is at {} and later states have already consumed '{}'; \
                 re-run with --force to replace it anyway",
                self.project_id,
                manifest.state_key(),
                name
            )));
        }
        if consumed {
            warn!(
                artifact = name,
                state = %manifest.state_key(),
                "replacing an input that later states have already consumed"
            );
        }

        let stored = self
            .artifacts
            .write(name, &SchemaId::v1(name), Producer::Operator, content)?;
        manifest.link_artifact(name, stored.link());
        self.commit(&mut manifest)?;
        info!(artifact = name, digest = %stored.digest, "artifact imported");
        Ok(stored)
    }

    /// Re-open a completed project for another pass through the terminal state.
    pub fn begin_maintenance_cycle(&self) -> Result<Manifest, OrchestratorError> {
        let mut manifest = self.load()?;
        if !manifest.is_complete() {
            return Err(OrchestratorError::InvalidOperation(format!(
                "Project '{}' is at {} and has not completed; maintenance cycles start after {}",
                self.project_id,
                manifest.state_key(),
                TERMINAL_STATE
            )));
        }

        manifest.completed_at = None;
        manifest.set_state(TERMINAL_STATE);
        manifest.budget_counters.maintenance_cycles += 1;
        self.commit(&mut manifest)?;
        info!(
            project = %self.project_id,
            cycle = manifest.budget_counters.maintenance_cycles,
            "maintenance cycle started"
        );
        Ok(manifest)
    }

    /// Move the whole project under `archive_dir`, releasing the lock.
    pub fn archive(self, archive_dir: &Path) -> Result<PathBuf, OrchestratorError> {
        let target = self
            .manifests
            .archive(&self.project_id, archive_dir, &self.lock)?;
        info!(project = %self.project_id, path = %target.display(), "project archived");
        Ok(target)
    }
}
