//! Manifest persistence and the single-writer lock.
//!
//! The manifest is rewritten whole on every save, through the atomic writer.
//! Writers must hold the project's [`ManifestLock`]: an exclusive advisory lock
//! on `manifest.lock` whose content names the owner. A save whose lock file no
//! longer carries the caller's token is refused.

use baton_common::{Manifest, SUPPORTED_MANIFEST_MAJOR, StateKey};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::atomic::write_atomic;
use crate::errors::StoreError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LOCK_FILE: &str = "manifest.lock";

/// Exclusive write access to one project's manifest. Released on drop.
#[derive(Debug)]
pub struct ManifestLock {
    path: PathBuf,
    file: File,
    token: String,
}

impl ManifestLock {
    /// Take the lock at `path`, failing immediately if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        if file.try_lock_exclusive().is_err() {
            let holder = fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            return Err(StoreError::ManifestLock {
                path: path.to_path_buf(),
                holder: if holder.is_empty() {
                    "held by another process".to_string()
                } else {
                    format!("held by {}", holder)
                },
            });
        }

        let token = format!("pid={} token={}", std::process::id(), Uuid::new_v4());
        file.set_len(0)
            .and_then(|_| file.write_all(token.as_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(path, e))?;

        debug!(lock = %path.display(), "manifest lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the lock file still names this holder.
    pub fn verify(&self) -> Result<(), StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.token => Ok(()),
            Ok(content) => Err(StoreError::ManifestLock {
                path: self.path.clone(),
                holder: format!("lock file now names '{}'", content.trim()),
            }),
            Err(e) => Err(StoreError::ManifestLock {
                path: self.path.clone(),
                holder: format!("lock file unreadable: {}", e),
            }),
        }
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        if self.verify().is_ok() {
            let _ = fs::remove_file(&self.path);
        }
        let _ = FileExt::unlock(&self.file);
    }
}

/// Loads and saves manifests under `<projects_dir>/<project_id>/`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    projects_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id)
    }

    pub fn manifest_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join(MANIFEST_FILE)
    }

    pub fn lock_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join(LOCK_FILE)
    }

    pub fn exists(&self, project_id: &str) -> bool {
        self.manifest_path(project_id).is_file()
    }

    pub fn lock(&self, project_id: &str) -> Result<ManifestLock, StoreError> {
        ManifestLock::acquire(&self.lock_path(project_id))
    }

    /// Load and check a manifest. Never repairs: any inconsistency is corruption.
    pub fn load(&self, project_id: &str) -> Result<Manifest, StoreError> {
        let path = self.manifest_path(project_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ManifestNotFound {
                    project_id: project_id.to_string(),
                    path,
                });
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let corrupt = |reason: String| StoreError::ManifestCorruption {
            path: path.clone(),
            reason,
        };

        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;

        match manifest.schema_major() {
            Some(major) if major <= SUPPORTED_MANIFEST_MAJOR => {}
            _ => {
                return Err(corrupt(format!(
                    "unsupported schema_version '{}' (this build reads major version {})",
                    manifest.schema_version, SUPPORTED_MANIFEST_MAJOR
                )));
            }
        }
        if manifest.project_id != project_id {
            return Err(corrupt(format!(
                "manifest belongs to project '{}'",
                manifest.project_id
            )));
        }
        StateKey::try_new(manifest.current_phase, manifest.current_sub_state)
            .map_err(|e| corrupt(format!("invalid current state: {}", e)))?;

        Ok(manifest)
    }

    /// Persist the manifest atomically. The caller must hold the project lock.
    pub fn save(&self, manifest: &Manifest, lock: &ManifestLock) -> Result<(), StoreError> {
        let expected = self.lock_path(&manifest.project_id);
        if lock.path() != expected {
            return Err(StoreError::ManifestLock {
                path: expected,
                holder: format!("caller holds {}", lock.path().display()),
            });
        }
        lock.verify()?;

        let path = self.manifest_path(&manifest.project_id);
        let bytes =
            serde_json::to_vec_pretty(manifest).map_err(|source| StoreError::Serialization {
                what: "manifest".to_string(),
                source,
            })?;
        write_atomic(&path, &bytes).map_err(|e| StoreError::io(&path, e))?;
        debug!(
            project = %manifest.project_id,
            state = %manifest.state_key(),
            "manifest saved"
        );
        Ok(())
    }

    /// Move a project directory under `archive_dir`. Returns the new location.
    pub fn archive(
        &self,
        project_id: &str,
        archive_dir: &Path,
        lock: &ManifestLock,
    ) -> Result<PathBuf, StoreError> {
        lock.verify()?;
        fs::create_dir_all(archive_dir).map_err(|e| StoreError::io(archive_dir, e))?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let target = archive_dir.join(format!("{}-{}", project_id, stamp));
        let source = self.project_dir(project_id);
        fs::rename(&source, &target).map_err(|e| StoreError::io(&source, e))?;
        if let Err(e) = fs::remove_file(target.join(LOCK_FILE)) {
            warn!(error = %e, "could not remove lock file from archived project");
        }
        Ok(target)
    }
}
