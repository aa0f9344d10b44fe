//! Storage interface for journal records and replicated sensor records.

pub mod json;
pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{ExternalRecord, JournalId, JournalRecord, SensorRecordId};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Order of a range query by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Persistent storage consumed by the engine.
///
/// Each call is assumed atomic on its own; the engine performs no
/// multi-call transactions.
pub trait JournalStore {
    /// Journal records starting after `after` (all when `None`).
    fn journal_after(
        &self,
        after: Option<DateTime<Utc>>,
        order: SortOrder,
    ) -> Result<Vec<JournalRecord>>;

    fn journal_linked_to(&self, link: SensorRecordId) -> Result<Option<JournalRecord>>;

    fn journal_by_id(&self, id: JournalId) -> Result<Option<JournalRecord>>;

    /// Upsert. Assigns and writes back an id on first save.
    fn save_journal(&mut self, record: &mut JournalRecord) -> Result<JournalId>;

    /// Returns whether a record was removed.
    fn delete_journal(&mut self, id: JournalId) -> Result<bool>;

    /// Sensor records replicated into this store, newest first.
    fn replicated_after(&self, after: Option<DateTime<Utc>>) -> Result<Vec<ExternalRecord>>;
}

fn sorted(mut records: Vec<JournalRecord>, order: SortOrder) -> Vec<JournalRecord> {
    match order {
        SortOrder::Ascending => records.sort_by(|a, b| a.started_at.cmp(&b.started_at)),
        SortOrder::Descending => records.sort_by(|a, b| b.started_at.cmp(&a.started_at)),
    }
    records
}
