//! Sensor transition table.
//!
//! Maps `(state, prior state, has active link)` to the synchronizer action
//! so the dispatch stays exhaustive and testable on its own.

use crate::sensor::SensorState;

/// What the synchronizer does for a state-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing to reconcile
    Ignore,
    /// Align the window so the linked record sits in `current`, then sync it
    AlignToSensor,
    /// Sensor is starting without a record: stage `current` with a Starting
    /// marker, unsaved
    StageStart,
    /// Mark the linked record ended and shift if it was `current`
    ConcludeEnding,
    /// Back to idle; `finalize_prior` when the sensor had been recording
    SettleIdle { finalize_prior: bool },
}

/// What the synchronizer does for a probe that found no state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAction {
    Ignore,
    RefreshBattery,
}

pub fn plan_transition(state: SensorState, prior: SensorState, has_active_link: bool) -> SyncAction {
    match state {
        SensorState::Starting | SensorState::Recording if has_active_link => SyncAction::AlignToSensor,
        SensorState::Starting => SyncAction::StageStart,
        SensorState::Recording => SyncAction::Ignore,
        SensorState::Ending => SyncAction::ConcludeEnding,
        SensorState::Idle | SensorState::Unknown => SyncAction::SettleIdle {
            finalize_prior: prior >= SensorState::Recording,
        },
    }
}

pub fn plan_probe(state: SensorState, has_active_link: bool) -> ProbeAction {
    match state {
        SensorState::Recording if has_active_link => ProbeAction::RefreshBattery,
        _ => ProbeAction::Ignore,
    }
}
