//! The per-night journal record and its state flags.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::attribute::{AttributeDef, AttributeValue};
use super::event::{is_near_duplicate, Event, EventKind, LifeStage};
use super::external::SensorRecordId;
use super::hypnogram::Hypnogram;

/// Identity assigned by the store on first save.
pub type JournalId = u64;

/// Bitfield of journal and sensor state markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateFlags(u32);

impl StateFlags {
    pub const JOURNAL_EXPLICIT_START: StateFlags = StateFlags(0x0001);
    pub const JOURNAL_EXPLICIT_END: StateFlags = StateFlags(0x0002);
    pub const SENSOR_RECORDED: StateFlags = StateFlags(0x0004);
    pub const SENSOR_EXPLICIT_END: StateFlags = StateFlags(0x0008);
    pub const SENSOR_DEAD: StateFlags = StateFlags(0x0010);
    pub const AMEND_CHECKED: StateFlags = StateFlags(0x0100);
    pub const AMEND_APPLIED: StateFlags = StateFlags(0x0200);
    /// Amendment format version 1
    pub const AMEND_V1: StateFlags = StateFlags(0x1000);

    pub const fn empty() -> Self {
        StateFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when any bit of `other` is set.
    pub const fn intersects(self, other: StateFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: StateFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: StateFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for StateFlags {
    type Output = StateFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        StateFlags(self.0 | rhs.0)
    }
}

/// Highest and lowest headband battery readings seen while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryExtremes {
    pub high: u32,
    pub low: u32,
}

/// Coarse lifecycle position of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Empty,
    JustLinked,
    Recording,
    SoftDone,
    Done,
}

impl StatusCode {
    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Empty => "Empty",
            StatusCode::JustLinked => "Linked only",
            StatusCode::Recording => "Recording",
            StatusCode::SoftDone => "Ended",
            StatusCode::Done => "Done",
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, StatusCode::Done | StatusCode::SoftDone)
    }
}

/// What a record holds, in named terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentSummary {
    pub has_attributes: bool,
    pub has_linkage: bool,
    /// Any user-entered event
    pub has_meaningful_events: bool,
    /// Starting markers, as events or the raw timestamp
    pub starting_markers: usize,
    pub has_recording_marker: bool,
}

impl ContentSummary {
    /// A sensor start that never turned into data or journal content.
    pub fn is_aborted_attempt(&self) -> bool {
        !self.has_attributes
            && !self.has_linkage
            && !self.has_meaningful_events
            && !self.has_recording_marker
            && self.starting_markers <= 1
    }

    /// A record only holding a Starting marker, waiting for the sensor to
    /// allocate a session.
    pub fn is_pending_start(&self) -> bool {
        self.starting_markers > 0 && !self.has_linkage && !self.has_recording_marker
    }
}

/// Corrected stage timeline and statistics derived from journal evidence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Amendment {
    pub time_to_sleep_min: f64,
    pub awake_min: f64,
    pub rem_min: f64,
    pub light_min: f64,
    pub deep_min: f64,
    /// Part of `deep_min` that was light transitioning to deep
    pub light_to_deep_min: f64,
    pub total_sleep_min: f64,
    pub awakenings: u32,
    pub quality_score: i32,
    pub deep_sum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_of_night: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_night: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Hypnogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Hypnogram>,
}

/// One night as tracked by the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    #[serde(default)]
    pub id: Option<JournalId>,
    #[serde(default)]
    pub sensor_link: Option<SensorRecordId>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flags: StateFlags,
    #[serde(default)]
    pub sensor_starting_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sensor_recording_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sensor_ending_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub battery: BatteryExtremes,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub fixed_attributes: Vec<Option<AttributeValue>>,
    #[serde(default)]
    pub variable_attributes: Vec<AttributeValue>,
    #[serde(default)]
    pub amendment: Option<Amendment>,
}

impl JournalRecord {
    /// A fresh, unsaved record starting at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sensor_link: None,
            started_at,
            ended_at: None,
            flags: StateFlags::empty(),
            sensor_starting_at: None,
            sensor_recording_at: None,
            sensor_ending_at: None,
            battery: BatteryExtremes::default(),
            events: Vec::new(),
            fixed_attributes: Vec::new(),
            variable_attributes: Vec::new(),
            amendment: None,
        }
    }

    pub fn is_linked_to(&self, link: SensorRecordId) -> bool {
        self.sensor_link == Some(link)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeValue> {
        self.fixed_attributes
            .iter()
            .flatten()
            .chain(self.variable_attributes.iter())
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes().next().is_some()
    }

    /// Insert keeping timestamp order; equal timestamps keep arrival order.
    pub fn store_event(&mut self, event: Event) {
        let pos = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(pos, event);
    }

    /// Store `event` unless it repeats the latest event of its kind within
    /// `window`. Returns whether it was stored.
    pub fn try_store_event(&mut self, event: Event, window: Duration) -> bool {
        if is_near_duplicate(&self.events, &event, window) {
            return false;
        }
        self.store_event(event);
        true
    }

    /// Write a sensor marker: as an event once the record has events,
    /// otherwise into the matching raw timestamp field.
    pub fn annotate_sensor(&mut self, kind: EventKind, at: DateTime<Utc>) {
        if self.has_events() {
            let stage = match kind {
                EventKind::SensorEnding => LifeStage::After,
                _ => LifeStage::InBed,
            };
            self.store_event(Event::new(stage, at, kind));
            return;
        }
        match kind {
            EventKind::SensorStarting => self.sensor_starting_at = Some(at),
            EventKind::SensorRecording => self.sensor_recording_at = Some(at),
            EventKind::SensorEnding => self.sensor_ending_at = Some(at),
            _ => {}
        }
    }

    /// Store or replace the value for `def`.
    pub fn store_attribute(&mut self, def: &AttributeDef, value: &str, likert: f32) {
        let attribute = AttributeValue {
            stage: def.stage,
            name: def.name.clone(),
            value: value.to_string(),
            likert,
        };
        match def.fixed_slot {
            Some(slot) => {
                if self.fixed_attributes.len() <= slot {
                    self.fixed_attributes.resize(slot + 1, None);
                }
                self.fixed_attributes[slot] = Some(attribute);
            }
            None => {
                match self.variable_attributes.iter_mut().find(|a| a.matches(def)) {
                    Some(existing) => *existing = attribute,
                    None => self.variable_attributes.push(attribute),
                }
            }
        }
    }

    /// Remove the value for `def`; returns whether one existed.
    pub fn remove_attribute(&mut self, def: &AttributeDef) -> bool {
        match def.fixed_slot {
            Some(slot) => match self.fixed_attributes.get_mut(slot) {
                Some(cell) if cell.as_ref().is_some_and(|a| a.matches(def)) => {
                    *cell = None;
                    true
                }
                _ => false,
            },
            None => {
                let before = self.variable_attributes.len();
                self.variable_attributes.retain(|a| !a.matches(def));
                before != self.variable_attributes.len()
            }
        }
    }

    pub fn attribute_value(&self, def: &AttributeDef) -> Option<&str> {
        self.attributes()
            .find(|a| a.matches(def))
            .map(|a| a.value.as_str())
    }

    pub fn content_summary(&self) -> ContentSummary {
        let starting_events = self
            .events
            .iter()
            .filter(|e| e.kind == EventKind::SensorStarting)
            .count();
        ContentSummary {
            has_attributes: self.has_attributes(),
            has_linkage: self.sensor_link.is_some(),
            has_meaningful_events: self.events.iter().any(|e| !e.kind.is_sensor_marker()),
            starting_markers: starting_events + usize::from(self.sensor_starting_at.is_some()),
            has_recording_marker: self.sensor_recording_at.is_some()
                || self.flags.contains(StateFlags::SENSOR_RECORDED)
                || self.events.iter().any(|e| e.kind == EventKind::SensorRecording),
        }
    }

    /// Holds nothing the user entered: only sensor markers and flags.
    pub fn is_sensor_only(&self) -> bool {
        let content = self.content_summary();
        !content.has_attributes && !content.has_meaningful_events
    }

    pub fn is_sensor_dead(&self) -> bool {
        self.flags.contains(StateFlags::SENSOR_DEAD)
    }

    pub fn is_unlinked_and_dead(&self) -> bool {
        self.sensor_link.is_none() && self.is_sensor_dead()
    }

    /// Shows an explicit end from either source.
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
            || self
                .flags
                .intersects(StateFlags::JOURNAL_EXPLICIT_END | StateFlags::SENSOR_EXPLICIT_END)
    }

    pub fn status_code(&self) -> StatusCode {
        if self.flags.contains(StateFlags::JOURNAL_EXPLICIT_END) {
            return StatusCode::Done;
        }
        if self.flags.contains(StateFlags::SENSOR_EXPLICIT_END) || self.ended_at.is_some() {
            return StatusCode::SoftDone;
        }
        if self.has_events()
            || self.has_attributes()
            || self
                .flags
                .intersects(StateFlags::JOURNAL_EXPLICIT_START | StateFlags::SENSOR_RECORDED)
        {
            return StatusCode::Recording;
        }
        if self.sensor_link.is_some() {
            return StatusCode::JustLinked;
        }
        StatusCode::Empty
    }

    pub fn is_amend_checked(&self) -> bool {
        self.flags.contains(StateFlags::AMEND_CHECKED)
    }

    pub fn is_amended(&self) -> bool {
        self.flags.contains(StateFlags::AMEND_APPLIED)
    }

    /// Where the night ends for display: the record end, else the sensor's
    /// Ending marker.
    pub fn display_end(&self) -> Option<DateTime<Utc>> {
        self.ended_at.or(self.sensor_ending_at).or_else(|| {
            self.events
                .iter()
                .rev()
                .find(|e| e.kind == EventKind::SensorEnding)
                .map(|e| e.timestamp)
        })
    }
}
