//! Single-file JSON store.
//!
//! Keeps the whole store in memory and rewrites the file after every
//! mutation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{JournalStore, MemoryStore, Result, SortOrder};
use crate::record::{ExternalRecord, JournalId, JournalRecord, SensorRecordId};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            MemoryStore::new()
        };
        debug!(path = %path.display(), "Opened journal store");
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a sensor record to the replicated section and write it out.
    pub fn replicate(&mut self, record: ExternalRecord) -> Result<()> {
        self.inner.replicate(record);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.inner)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl JournalStore for JsonFileStore {
    fn journal_after(
        &self,
        after: Option<DateTime<Utc>>,
        order: SortOrder,
    ) -> Result<Vec<JournalRecord>> {
        self.inner.journal_after(after, order)
    }

    fn journal_linked_to(&self, link: SensorRecordId) -> Result<Option<JournalRecord>> {
        self.inner.journal_linked_to(link)
    }

    fn journal_by_id(&self, id: JournalId) -> Result<Option<JournalRecord>> {
        self.inner.journal_by_id(id)
    }

    fn save_journal(&mut self, record: &mut JournalRecord) -> Result<JournalId> {
        let id = self.inner.save_journal(record)?;
        self.flush()?;
        Ok(id)
    }

    fn delete_journal(&mut self, id: JournalId) -> Result<bool> {
        let removed = self.inner.delete_journal(id)?;
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn replicated_after(&self, after: Option<DateTime<Utc>>) -> Result<Vec<ExternalRecord>> {
        self.inner.replicated_after(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.json");
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();

        let id = {
            let mut store = JsonFileStore::open(&path).unwrap();
            let mut rec = JournalRecord::new(t0);
            rec.sensor_link = Some(11);
            store.save_journal(&mut rec).unwrap()
        };

        let mut reopened = JsonFileStore::open(&path).unwrap();
        let rec = reopened.journal_by_id(id).unwrap().unwrap();
        assert_eq!(rec.sensor_link, Some(11));

        let mut second = JournalRecord::new(t0);
        let next = reopened.save_journal(&mut second).unwrap();
        assert!(next > id);
    }
}
