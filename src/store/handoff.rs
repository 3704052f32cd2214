use baton_common::HandoffRecord;
use std::path::{Path, PathBuf};

use super::atomic::{is_staging_file, write_atomic};
use crate::errors::StoreError;

pub const HANDOFFS_DIR: &str = "handoffs";

/// Append-only directory of handoff records for one project.
#[derive(Debug, Clone)]
pub struct HandoffLog {
    dir: PathBuf,
}

impl HandoffLog {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            dir: project_dir.join(HANDOFFS_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<timestamp>_<from>_to_<to>.json`; timestamps sort lexically.
    pub fn file_name(record: &HandoffRecord) -> String {
        format!(
            "{}_{}_to_{}.json",
            record.timestamp.format("%Y%m%dT%H%M%S%.6fZ"),
            record.from_phase.file_stem(),
            record.to_phase.file_stem()
        )
    }

    pub fn write(&self, record: &HandoffRecord) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(Self::file_name(record));
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Serialization {
            what: "handoff record".to_string(),
            source,
        })?;
        write_atomic(&path, &bytes).map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// All records, oldest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<HandoffRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|e| StoreError::io(&self.dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".json") && !is_staging_file(n))
            })
            .collect();
        names.sort();

        Ok(names
            .iter()
            .filter_map(|path| std::fs::read(path).ok())
            .filter_map(|raw| serde_json::from_slice(&raw).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_common::{Phase, StateKey, SubState};
    use tempfile::tempdir;

    #[test]
    fn writes_named_records_and_lists_them_in_order() {
        let dir = tempdir().unwrap();
        let log = HandoffLog::new(dir.path());

        let first = HandoffRecord::new(
            StateKey::sub(SubState::TaskBreakdown),
            StateKey::phase(Phase::Implementation),
            "tasks ready",
        );
        let path = log.write(&first).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_PLANNING.TASK_BREAKDOWN_to_IMPLEMENTATION.json"));

        let second = HandoffRecord::new(
            StateKey::phase(Phase::Implementation),
            StateKey::sub(SubState::TestExecution),
            "code done",
        )
        .with_pending_items(vec!["flaky test".into()]);
        log.write(&second).unwrap();

        let records = log.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].summary, "tasks ready");
        assert_eq!(records[1].pending_items, vec!["flaky test".to_string()]);
    }

    #[test]
    fn empty_log_lists_nothing() {
        let dir = tempdir().unwrap();
        assert!(HandoffLog::new(dir.path()).list().unwrap().is_empty());
    }
}
