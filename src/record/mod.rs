//! Record model shared by the window, the synchronizer and the history merge.

pub mod attribute;
pub mod event;
pub mod external;
pub mod hypnogram;
pub mod integrated;
pub mod journal;

pub use attribute::{AttributeDef, AttributeValue};
pub use event::{is_near_duplicate, Event, EventKind, LifeStage};
pub use external::{EndReason, ExternalRecord, SensorRecordId};
pub use hypnogram::{Hypnogram, SleepStage, BASE_EPOCH_SECS, DISPLAY_EPOCH_SECS};
pub use integrated::IntegratedRecord;
pub use journal::{
    Amendment, BatteryExtremes, ContentSummary, JournalId, JournalRecord, StateFlags, StatusCode,
};
