//! Fixed-interval sleep-stage series.
//!
//! The headband produces two series per night: a base series with one cell
//! every 30 seconds and a display series with one cell every 5 minutes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds covered by one cell of the base series.
pub const BASE_EPOCH_SECS: i64 = 30;

/// Seconds covered by one cell of the display series.
pub const DISPLAY_EPOCH_SECS: i64 = 300;

/// One cell of a hypnogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    #[default]
    Undefined,
    Wake,
    Rem,
    Light,
    Deep,
    /// Light sleep the headband later reclassified as deep
    LightToDeep,
}

impl SleepStage {
    /// Numeric code used by the headband firmware.
    pub fn code(self) -> u8 {
        match self {
            SleepStage::Undefined => 0,
            SleepStage::Wake => 1,
            SleepStage::Rem => 2,
            SleepStage::Light => 3,
            SleepStage::Deep => 4,
            SleepStage::LightToDeep => 6,
        }
    }

    /// Decode a firmware code; unknown codes map to `Undefined`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => SleepStage::Wake,
            2 => SleepStage::Rem,
            3 => SleepStage::Light,
            4 => SleepStage::Deep,
            6 => SleepStage::LightToDeep,
            _ => SleepStage::Undefined,
        }
    }

    /// Deep or light-transitioning-to-deep.
    pub fn is_deep(self) -> bool {
        matches!(self, SleepStage::Deep | SleepStage::LightToDeep)
    }
}

/// A sleep-stage series with a fixed cell width.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hypnogram {
    /// Width of each cell in seconds
    pub epoch_secs: i64,
    /// Stage per cell, oldest first
    pub stages: Vec<SleepStage>,
}

impl Hypnogram {
    pub fn new(epoch_secs: i64, stages: Vec<SleepStage>) -> Self {
        Self { epoch_secs, stages }
    }

    /// A 30-second resolution series.
    pub fn base(stages: Vec<SleepStage>) -> Self {
        Self::new(BASE_EPOCH_SECS, stages)
    }

    /// A 5-minute resolution series.
    pub fn display(stages: Vec<SleepStage>) -> Self {
        Self::new(DISPLAY_EPOCH_SECS, stages)
    }

    /// Parse a compact string of firmware codes, e.g. `"1112233"`.
    pub fn from_codes(epoch_secs: i64, codes: &str) -> Self {
        let stages = codes
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| SleepStage::from_code(d as u8))
            .collect();
        Self::new(epoch_secs, stages)
    }

    /// Render as a compact string of firmware codes.
    pub fn to_codes(&self) -> String {
        self.stages
            .iter()
            .map(|s| char::from(b'0' + s.code()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SleepStage> {
        self.stages.get(index).copied()
    }

    /// Cell index holding `instant` for a series starting at `origin`,
    /// clamped into the series bounds. `None` when the series is empty.
    pub fn cell_at(&self, origin: DateTime<Utc>, instant: DateTime<Utc>) -> Option<usize> {
        if self.stages.is_empty() || self.epoch_secs <= 0 {
            return None;
        }
        let offset_secs = (instant - origin).num_seconds();
        let cell = (offset_secs / self.epoch_secs).max(0) as usize;
        Some(cell.min(self.stages.len() - 1))
    }

    /// Force every cell in `first..=last` to wake. Returns how many cells
    /// actually changed.
    pub fn overwrite_wake(&mut self, first: usize, last: usize) -> usize {
        let mut changed = 0;
        for cell in self.stages.iter_mut().take(last + 1).skip(first) {
            if *cell != SleepStage::Wake {
                *cell = SleepStage::Wake;
                changed += 1;
            }
        }
        changed
    }

    /// Walk backwards from `from`, converting the run of light/REM cells that
    /// precedes a reported awake moment into wake.
    ///
    /// The starting cell itself is always forced to wake. The walk stops at
    /// the first wake, deep or undefined cell met after that. Returns how
    /// many cells actually changed.
    pub fn back_trace_wake(&mut self, from: usize) -> usize {
        let mut changed = 0;
        let mut wrote_one = false;
        let mut index = from.min(self.stages.len().saturating_sub(1));
        while let Some(cell) = self.stages.get_mut(index) {
            let stops_trace = matches!(
                *cell,
                SleepStage::Wake | SleepStage::Deep | SleepStage::LightToDeep | SleepStage::Undefined
            );
            if stops_trace && wrote_one {
                break;
            }
            if *cell != SleepStage::Wake {
                *cell = SleepStage::Wake;
                changed += 1;
            }
            wrote_one = true;
            if index == 0 {
                break;
            }
            index -= 1;
        }
        changed
    }

    /// Instants at which each unbroken deep run begins.
    pub fn deep_run_starts(&self, origin: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        let mut in_deep = false;
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.is_deep() {
                if !in_deep {
                    starts.push(origin + chrono::Duration::seconds(index as i64 * self.epoch_secs));
                    in_deep = true;
                }
            } else {
                in_deep = false;
            }
        }
        starts
    }

    /// Count wake-to-sleep transitions the way the headband counts
    /// awakenings: undefined cells are skipped, and a wake run still open at
    /// the end of the series does not count.
    pub fn count_awakenings(&self) -> u32 {
        let mut count: u32 = 0;
        let mut in_wake = true;
        for stage in &self.stages {
            match stage {
                SleepStage::Undefined => {}
                SleepStage::Wake => {
                    if !in_wake {
                        count += 1;
                    }
                    in_wake = true;
                }
                _ => in_wake = false,
            }
        }
        if in_wake && count > 0 {
            count -= 1;
        }
        count
    }
}
