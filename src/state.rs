//! Persistent record of the last synced modified time per document.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

/// Document ID → modified time at the last successful sync.
pub type SyncState = BTreeMap<String, DateTime<Utc>>;

/// Storage for sync state, injected into [`crate::Syncer`].
pub trait StateStore {
    fn get(&self, document_id: &str) -> Option<DateTime<Utc>>;

    fn record(&mut self, document_id: &str, modified_time: DateTime<Utc>);

    /// Make recorded entries durable.
    fn persist(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State kept in a pretty-printed JSON object on disk.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    entries: SyncState,
}

impl JsonStateStore {
    /// Load state from `path`. A missing file yields an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            debug!(path = %path.display(), "no state file, starting empty");
            SyncState::new()
        };

        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &SyncState {
        &self.entries
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, document_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(document_id).copied()
    }

    fn record(&mut self, document_id: &str, modified_time: DateTime<Utc>) {
        self.entries.insert(document_id.to_string(), modified_time);
    }

    /// Write to a sibling temp file, then rename it over the state file, so
    /// an interrupted write never leaves a truncated state file behind.
    fn persist(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string_pretty(&self.entries)?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// State held in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    entries: SyncState,
    persist_count: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: SyncState) -> Self {
        Self {
            entries,
            persist_count: 0,
        }
    }

    pub fn entries(&self) -> &SyncState {
        &self.entries
    }

    /// Number of times [`StateStore::persist`] was called.
    pub fn persist_count(&self) -> usize {
        self.persist_count
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, document_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(document_id).copied()
    }

    fn record(&mut self, document_id: &str, modified_time: DateTime<Utc>) {
        self.entries.insert(document_id.to_string(), modified_time);
    }

    fn persist(&mut self) -> Result<()> {
        self.persist_count += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::load(dir.path().join("state.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let ts = Utc.with_ymd_and_hms(2023, 10, 26, 10, 0, 0).unwrap();

        let mut store = JsonStateStore::load(&path).unwrap();
        store.record("file1", ts);
        store.persist().unwrap();

        let reloaded = JsonStateStore::load(&path).unwrap();
        assert_eq!(reloaded.get("file1"), Some(ts));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_failed_persist_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let old = Utc.with_ymd_and_hms(2023, 10, 26, 10, 0, 0).unwrap();

        let mut store = JsonStateStore::load(&path).unwrap();
        store.record("file1", old);
        store.persist().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        // A directory squatting on the temp file's target makes the rename fail.
        let mut blocked = JsonStateStore {
            path: dir.path().join("blocked"),
            entries: store.entries().clone(),
        };
        fs::create_dir(dir.path().join("blocked")).unwrap();
        fs::write(dir.path().join("blocked").join("keep"), "x").unwrap();
        blocked.record("file2", Utc::now());
        assert!(blocked.persist().is_err());

        // The real file is untouched and no temp files are left behind.
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {:?}", names);
        assert_eq!(JsonStateStore::load(&path).unwrap().get("file1"), Some(old));
    }

    #[test]
    fn test_persist_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "x".repeat(4096)).unwrap();

        let mut store = JsonStateStore {
            path: path.clone(),
            entries: SyncState::new(),
        };
        store.record("file1", Utc.with_ymd_and_hms(2023, 10, 26, 10, 0, 0).unwrap());
        store.persist().unwrap();

        let reloaded = JsonStateStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_reads_drive_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"file1": "2023-10-26T10:00:00.000Z"}"#).unwrap();

        let store = JsonStateStore::load(&path).unwrap();
        assert_eq!(
            store.get("file1"),
            Some(Utc.with_ymd_and_hms(2023, 10, 26, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        assert!(JsonStateStore::load(&path).is_err());
    }

    #[test]
    fn test_memory_store_counts_persists() {
        let mut store = MemoryStateStore::new();
        store.record("a", Utc::now());
        store.persist().unwrap();
        assert_eq!(store.persist_count(), 1);
        assert_eq!(store.len(), 1);
    }
}
