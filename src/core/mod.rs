//! Core functionality of the daypoint engine.
//!
//! This module contains:
//! - The three-slot daypoint window and the coordinator that keeps it in
//!   step with the sensor and the journal store
//! - The sensor transition table
//! - History merging of journal and sensor records
//! - Hypnogram amendment from journal evidence
//! - Status strings and per-night summaries

pub mod amend;
pub mod clock;
pub mod coordinator;
pub mod daypoint;
pub mod history;
pub mod status;
pub mod transitions;

// Re-export commonly used types
pub use amend::{amend, quality_score, AmendError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{EngineSettings, JournalCoordinator};
pub use daypoint::{DaypointWindow, Slot};
pub use history::{build_history, find_external, HistoryQuery};
pub use status::{summarize, time_range, StatusView};
pub use transitions::{plan_probe, plan_transition, ProbeAction, SyncAction};
