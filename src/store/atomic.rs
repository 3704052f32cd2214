//! Crash-safe file replacement.
//!
//! Content is staged into a hidden sibling file, flushed to disk, and renamed
//! over the target. A reader sees either the previous file or the new one,
//! never a torn write. Abandoned staging files are hidden (`.` prefix) and
//! ignored by every reader in the store.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Content written to a temporary file but not yet visible at its target.
#[derive(Debug)]
pub struct StagedFile {
    tmp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

/// Write `bytes` to a staging file next to `target`.
pub fn stage(target: &Path, bytes: &[u8]) -> io::Result<StagedFile> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"))?;
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    Ok(StagedFile {
        tmp_path,
        target: target.to_path_buf(),
        committed: false,
    })
}

impl StagedFile {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replace the target with the staged content.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.tmp_path, &self.target)?;
        self.committed = true;
        sync_parent(&self.target);
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Stage and commit in one call.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    stage(target, bytes)?.commit()
}

/// Rename an already durable file over `target`.
pub fn replace(source: &Path, target: &Path) -> io::Result<()> {
    fs::rename(source, target)?;
    sync_parent(target);
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// True for names produced by [`stage`] that never got committed.
pub fn is_staging_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}
