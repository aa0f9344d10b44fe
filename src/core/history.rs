//! Multi-source history merge.
//!
//! Journal records are paired with sensor records by link id. Sensor records
//! come from two places: the sensor subsystem's own store (pass 0) and the
//! copies replicated into the journal store (pass 1). A link id is emitted
//! at most once.

use chrono::{DateTime, Utc};

use crate::record::{ExternalRecord, IntegratedRecord, SensorRecordId};
use crate::sensor::SensorSource;
use crate::store::{JournalStore, SortOrder};

/// Parameters of a history listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only nights starting after this instant; all when `None`
    pub after: Option<DateTime<Utc>>,
    /// List sensor records alone, without journal pairing
    pub sensor_only: bool,
    /// Keep sensor records with no sleep time
    pub include_dead: bool,
}

impl HistoryQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(after: DateTime<Utc>) -> Self {
        Self {
            after: Some(after),
            ..Self::default()
        }
    }
}

/// Build the merged history, newest first.
///
/// Storage failures are logged and the affected source is skipped.
pub fn build_history<S, Z>(store: &S, sensor: &Z, query: &HistoryQuery) -> Vec<IntegratedRecord>
where
    S: JournalStore + ?Sized,
    Z: SensorSource + ?Sized,
{
    let mut list: Vec<IntegratedRecord> = Vec::new();
    let mut journal_count = 0usize;
    let mut sensor_count = 0usize;

    if !query.sensor_only {
        match store.journal_after(query.after, SortOrder::Descending) {
            Ok(records) => {
                for record in records.into_iter().filter(|r| !r.is_unlinked_and_dead()) {
                    list.push(IntegratedRecord::from_journal(record));
                    journal_count += 1;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to load journal records for history"),
        }
    }

    let replicated = store.replicated_after(query.after).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to load replicated sensor records for history");
        Vec::new()
    });
    let passes = [sensor.records_after(query.after), replicated];

    for (pass, externals) in passes.into_iter().enumerate() {
        for external in externals {
            let visible = query.include_dead || external.has_sleep();
            let mut found = false;

            if !query.sensor_only {
                if let Some(pos) = list.iter().position(|r| r.link() == Some(external.id)) {
                    if pass == 0 || list[pos].external.is_none() {
                        if visible || external.is_active() {
                            list[pos].pair(external.clone());
                            found = true;
                        } else {
                            let has_journal_content =
                                list[pos].journal.as_ref().map(|j| !j.is_sensor_only());
                            match has_journal_content {
                                Some(true) => {
                                    list[pos].pair(external.clone());
                                    found = true;
                                }
                                Some(false) => {
                                    tracing::debug!(sensor_id = external.id, "Dropping sensor-only night with no sleep");
                                    list.remove(pos);
                                    journal_count = journal_count.saturating_sub(1);
                                }
                                None => {
                                    list.remove(pos);
                                }
                            }
                        }
                    }
                }
            }

            if found || !visible {
                continue;
            }
            if pass == 1 && contains_link(&list, external.id) {
                continue;
            }
            list.push(IntegratedRecord::from_external(external));
            sensor_count += 1;
        }
    }

    let paired = list.iter().filter(|r| r.is_paired()).count();
    if journal_count > 0 && sensor_count + paired > 0 {
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    list
}

fn contains_link(list: &[IntegratedRecord], link: SensorRecordId) -> bool {
    list.iter().any(|r| r.link() == Some(link))
}

/// Look a sensor record up in the sensor subsystem, then in the replicated
/// store.
pub fn find_external<S, Z>(store: &S, sensor: &Z, id: SensorRecordId) -> Option<ExternalRecord>
where
    S: JournalStore + ?Sized,
    Z: SensorSource + ?Sized,
{
    if let Some(found) = sensor.record(id) {
        return Some(found);
    }
    match store.replicated_after(None) {
        Ok(records) => records.into_iter().find(|r| r.id == id),
        Err(e) => {
            tracing::error!(sensor_id = id, error = %e, "Failed to search replicated sensor records");
            None
        }
    }
}
