//! In-memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sorted, JournalStore, Result, SortOrder};
use crate::record::{ExternalRecord, JournalId, JournalRecord, SensorRecordId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    next_id: JournalId,
    #[serde(default)]
    journal: Vec<JournalRecord>,
    #[serde(default)]
    replicated: Vec<ExternalRecord>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            next_id: 1,
            journal: Vec::new(),
            replicated: Vec::new(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as if it had been saved earlier, assigning an id.
    pub fn seed(&mut self, mut record: JournalRecord) -> JournalId {
        let id = self.assign_id(&mut record);
        self.journal.push(record);
        id
    }

    /// Add a sensor record to the replicated store.
    pub fn replicate(&mut self, record: ExternalRecord) {
        match self.replicated.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.replicated.push(record),
        }
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn assign_id(&mut self, record: &mut JournalRecord) -> JournalId {
        match record.id {
            Some(id) => {
                self.next_id = self.next_id.max(id + 1);
                id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                record.id = Some(id);
                id
            }
        }
    }
}

impl JournalStore for MemoryStore {
    fn journal_after(
        &self,
        after: Option<DateTime<Utc>>,
        order: SortOrder,
    ) -> Result<Vec<JournalRecord>> {
        let found = self
            .journal
            .iter()
            .filter(|r| after.map_or(true, |after| r.started_at > after))
            .cloned()
            .collect();
        Ok(sorted(found, order))
    }

    fn journal_linked_to(&self, link: SensorRecordId) -> Result<Option<JournalRecord>> {
        Ok(self.journal.iter().find(|r| r.is_linked_to(link)).cloned())
    }

    fn journal_by_id(&self, id: JournalId) -> Result<Option<JournalRecord>> {
        Ok(self.journal.iter().find(|r| r.id == Some(id)).cloned())
    }

    fn save_journal(&mut self, record: &mut JournalRecord) -> Result<JournalId> {
        let id = self.assign_id(record);
        match self.journal.iter_mut().find(|r| r.id == Some(id)) {
            Some(existing) => *existing = record.clone(),
            None => self.journal.push(record.clone()),
        }
        Ok(id)
    }

    fn delete_journal(&mut self, id: JournalId) -> Result<bool> {
        let before = self.journal.len();
        self.journal.retain(|r| r.id != Some(id));
        Ok(self.journal.len() != before)
    }

    fn replicated_after(&self, after: Option<DateTime<Utc>>) -> Result<Vec<ExternalRecord>> {
        let mut found: Vec<ExternalRecord> = self
            .replicated
            .iter()
            .filter(|r| after.map_or(true, |after| r.start_of_night > after))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_of_night.cmp(&a.start_of_night));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_save_assigns_ids_and_upserts() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let mut store = MemoryStore::new();

        let mut rec = JournalRecord::new(t0);
        let id = store.save_journal(&mut rec).unwrap();
        assert_eq!(rec.id, Some(id));

        rec.sensor_link = Some(5);
        assert_eq!(store.save_journal(&mut rec).unwrap(), id);
        assert_eq!(store.journal_len(), 1);
        assert_eq!(store.journal_linked_to(5).unwrap().and_then(|r| r.id), Some(id));

        assert!(store.delete_journal(id).unwrap());
        assert!(!store.delete_journal(id).unwrap());
    }

    #[test]
    fn test_range_query_orders() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let mut store = MemoryStore::new();
        for day in 0..3 {
            store.seed(JournalRecord::new(t0 + Duration::days(day)));
        }

        let desc = store.journal_after(Some(t0), SortOrder::Descending).unwrap();
        assert_eq!(desc.len(), 2);
        assert!(desc[0].started_at > desc[1].started_at);

        let asc = store.journal_after(None, SortOrder::Ascending).unwrap();
        assert_eq!(asc.first().map(|r| r.started_at), Some(t0));
    }
}
