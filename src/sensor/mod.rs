//! Interface to the headband recording subsystem.
//!
//! The engine treats the sensor as an opaque state source. It reads the
//! current and prior state, the active record id, live battery extremes and
//! the sensor's own stored records; it never drives the sensor.

pub mod scripted;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{ExternalRecord, SensorRecordId};

pub use crate::record::BatteryExtremes;
pub use scripted::ScriptedSensor;

/// Recording state reported by the headband subsystem, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    #[default]
    Unknown,
    Idle,
    Starting,
    Recording,
    Ending,
}

impl SensorState {
    pub fn label(self) -> &'static str {
        match self {
            SensorState::Unknown => "Unknown",
            SensorState::Idle => "Idle",
            SensorState::Starting => "Starting",
            SensorState::Recording => "Recording",
            SensorState::Ending => "Ending",
        }
    }

    /// Starting or Recording.
    pub fn is_live(self) -> bool {
        matches!(self, SensorState::Starting | SensorState::Recording)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Some(SensorState::Idle),
            "starting" => Some(SensorState::Starting),
            "recording" => Some(SensorState::Recording),
            "ending" => Some(SensorState::Ending),
            "unknown" => Some(SensorState::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Read access to the sensor subsystem.
pub trait SensorSource {
    fn state(&self) -> SensorState;

    /// State before the most recent transition.
    fn prior_state(&self) -> SensorState;

    /// Forget the prior state once a transition has been fully handled.
    fn clear_prior_state(&mut self);

    /// Record the sensor is currently writing, if it has allocated one.
    fn active_record_id(&self) -> Option<SensorRecordId>;

    fn battery_extremes(&self) -> BatteryExtremes;

    fn record(&self, id: SensorRecordId) -> Option<ExternalRecord>;

    /// Records starting after `after` (all when `None`), newest first.
    fn records_after(&self, after: Option<DateTime<Utc>>) -> Vec<ExternalRecord>;
}
