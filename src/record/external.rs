//! Sensor-confirmed sleep sessions as exported by the headband subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hypnogram::Hypnogram;

/// Identity of an External Record inside the sensor subsystem.
pub type SensorRecordId = u64;

/// Why the headband closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The session is still recording
    Active,
    #[default]
    Completed,
    BatteryDied,
    Disconnected,
    ServiceKilled,
}

/// One sensor session, read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: SensorRecordId,
    pub start_of_night: DateTime<Utc>,
    pub end_of_night: DateTime<Utc>,
    /// Start of the display series when the firmware reports one separately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_start: Option<DateTime<Utc>>,
    pub time_to_sleep_min: f64,
    pub awake_min: f64,
    pub rem_min: f64,
    pub light_min: f64,
    pub deep_min: f64,
    pub total_sleep_min: f64,
    pub awakenings: u32,
    pub quality_score: i32,
    #[serde(default)]
    pub deep_sum: f64,
    pub end_reason: EndReason,
    pub base: Hypnogram,
    pub display: Hypnogram,
}

impl ExternalRecord {
    /// A record with real sleep content.
    pub fn has_sleep(&self) -> bool {
        self.total_sleep_min > 0.0
    }

    pub fn is_active(&self) -> bool {
        self.end_reason == EndReason::Active
    }

    /// Origin instant of both stage series.
    pub fn series_origin(&self) -> DateTime<Utc> {
        self.display_start.unwrap_or(self.start_of_night)
    }
}
