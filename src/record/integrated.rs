//! Ephemeral pairing of a journal record and a sensor record.

use chrono::{DateTime, Utc};

use super::external::{ExternalRecord, SensorRecordId};
use super::journal::{JournalId, JournalRecord};

/// One night in the history list. At least one half is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedRecord {
    pub timestamp: DateTime<Utc>,
    pub journal: Option<JournalRecord>,
    pub external: Option<ExternalRecord>,
}

impl IntegratedRecord {
    pub fn from_journal(journal: JournalRecord) -> Self {
        Self {
            timestamp: journal.started_at,
            journal: Some(journal),
            external: None,
        }
    }

    pub fn from_external(external: ExternalRecord) -> Self {
        Self {
            timestamp: external.start_of_night,
            journal: None,
            external: Some(external),
        }
    }

    /// The sensor link shared by both halves.
    pub fn link(&self) -> Option<SensorRecordId> {
        match (&self.external, &self.journal) {
            (Some(external), _) => Some(external.id),
            (None, Some(journal)) => journal.sensor_link,
            (None, None) => None,
        }
    }

    pub fn journal_id(&self) -> Option<JournalId> {
        self.journal.as_ref().and_then(|j| j.id)
    }

    /// Attach the sensor half, keeping the earliest of both start times.
    pub fn pair(&mut self, external: ExternalRecord) {
        if external.start_of_night < self.timestamp {
            self.timestamp = external.start_of_night;
        }
        self.external = Some(external);
    }

    pub fn is_paired(&self) -> bool {
        self.journal.is_some() && self.external.is_some()
    }
}
