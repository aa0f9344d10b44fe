//! Sleep Daypoint - reconciles a sleep journal with a headband sensor.
//!
//! This library keeps one record per night consistent across two sources:
//! the headband subsystem, with its own Idle/Starting/Recording/Ending state
//! machine, and a journal of events and attributes entered by the user.
//!
//! # Guarantees
//!
//! - **One link per window**: a sensor record is linked to at most one
//!   journal record held in the window
//! - **No fatal paths**: engine entry points log and return; the next
//!   resynchronize repairs whatever a failed save left behind
//! - **Sensor data is read-only**: amendments are written to the journal
//!   record, never to the sensor record
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Sleep Daypoint                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Sensor    │──▶│ Coordinator │──▶│  Daypoint   │       │
//! │  │   source    │   │(transitions)│   │   window    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                 │                 │              │
//! │         ▼                 ▼                 ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   History   │   │  Amendment  │   │  Journal    │       │
//! │  │    merge    │   │   engine    │   │   store     │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sleep_daypoint::{
//!     EngineSettings, EventKind, JournalCoordinator, LifeStage, MemoryStore, ScriptedSensor,
//!     SensorState, UiNotifier,
//! };
//!
//! let (notifier, signals) = UiNotifier::channel(16);
//! let sensor = ScriptedSensor::in_state(SensorState::Idle, None);
//! let mut engine =
//!     JournalCoordinator::new(MemoryStore::new(), sensor, notifier, EngineSettings::default());
//!
//! engine.resynchronize();
//! engine.record_event(LifeStage::InBed, EventKind::GotIntoBed, None);
//!
//! // The UI drains refresh signals from `signals`
//! for signal in signals.try_iter() {
//!     println!("{signal:?}");
//! }
//! ```

pub mod config;
pub mod core;
pub mod notify;
pub mod record;
pub mod sensor;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, WindowPolicy};
pub use core::{
    amend, build_history, summarize, DaypointWindow, EngineSettings, HistoryQuery,
    JournalCoordinator, Slot, StatusView,
};
pub use notify::{UiNotifier, UiSignal};
pub use record::{
    AttributeDef, Event, EventKind, ExternalRecord, IntegratedRecord, JournalId, JournalRecord,
    LifeStage, SensorRecordId, StatusCode,
};
pub use sensor::{ScriptedSensor, SensorSource, SensorState};
pub use store::{JournalStore, JsonFileStore, MemoryStore, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
