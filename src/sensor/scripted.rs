//! In-memory sensor source driven by explicit transitions.
//!
//! Used by the CLI (persisted as JSON next to the journal store) and by
//! tests to replay headband state sequences.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatteryExtremes, SensorSource, SensorState};
use crate::record::{ExternalRecord, SensorRecordId};
use crate::store::StoreError;

/// A sensor whose state only changes when told to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedSensor {
    #[serde(default)]
    state: SensorState,
    #[serde(default)]
    prior_state: SensorState,
    #[serde(default)]
    active_record: Option<SensorRecordId>,
    #[serde(default)]
    battery: BatteryExtremes,
    #[serde(default)]
    records: Vec<ExternalRecord>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `state` with no recorded prior state.
    pub fn in_state(state: SensorState, active_record: Option<SensorRecordId>) -> Self {
        Self {
            state,
            active_record,
            ..Self::default()
        }
    }

    /// Load from a JSON file; a missing file yields an idle sensor.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::in_state(SensorState::Idle, None));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Move to `state`, remembering the previous one.
    pub fn transition(&mut self, state: SensorState, active_record: Option<SensorRecordId>) {
        self.prior_state = self.state;
        self.state = state;
        self.active_record = active_record;
    }

    pub fn set_battery(&mut self, high: u32, low: u32) {
        self.battery = BatteryExtremes { high, low };
    }

    /// Add or replace a stored record.
    pub fn insert_record(&mut self, record: ExternalRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn state(&self) -> SensorState {
        self.state
    }

    fn prior_state(&self) -> SensorState {
        self.prior_state
    }

    fn clear_prior_state(&mut self) {
        self.prior_state = SensorState::Unknown;
    }

    fn active_record_id(&self) -> Option<SensorRecordId> {
        self.active_record
    }

    fn battery_extremes(&self) -> BatteryExtremes {
        self.battery
    }

    fn record(&self, id: SensorRecordId) -> Option<ExternalRecord> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    fn records_after(&self, after: Option<DateTime<Utc>>) -> Vec<ExternalRecord> {
        let mut found: Vec<ExternalRecord> = self
            .records
            .iter()
            .filter(|r| after.map_or(true, |after| r.start_of_night > after))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_of_night.cmp(&a.start_of_night));
        found
    }
}
