//! Journal events and the life stages they are grouped under.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Phase of a night an event or attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    Before,
    InBed,
    Going,
    During,
    After,
}

impl LifeStage {
    pub fn label(self) -> &'static str {
        match self {
            LifeStage::Before => "Before",
            LifeStage::InBed => "In Bed",
            LifeStage::Going => "Going",
            LifeStage::During => "During",
            LifeStage::After => "After",
        }
    }

    /// Parse a stage name as typed on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "before" => Some(LifeStage::Before),
            "inbed" => Some(LifeStage::InBed),
            "going" => Some(LifeStage::Going),
            "during" => Some(LifeStage::During),
            "after" => Some(LifeStage::After),
            _ => None,
        }
    }
}

/// What happened at an event's instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GotIntoBed,
    GoingToSleep,
    NotYetSleeping,
    StillAwake,
    WokeUp,
    WokeUpDidSomething,
    WokeUpRetryToSleep,
    DoneSleeping,
    /// Sensor subsystem entered Starting
    SensorStarting,
    /// Sensor subsystem entered Recording
    SensorRecording,
    /// Sensor subsystem entered Ending
    SensorEnding,
    /// Synthetic: the sensor's own sleep-onset instant. Never stored.
    SensorStartedSleep,
    /// Synthetic: start of an unbroken deep run. Never stored.
    SensorDeepSleep,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            EventKind::GotIntoBed => "Got into bed",
            EventKind::GoingToSleep => "Going to sleep",
            EventKind::NotYetSleeping => "Not yet sleeping",
            EventKind::StillAwake => "Still awake",
            EventKind::WokeUp => "Woke up",
            EventKind::WokeUpDidSomething => "Woke up; did something",
            EventKind::WokeUpRetryToSleep => "Retrying to sleep",
            EventKind::DoneSleeping => "Done sleeping",
            EventKind::SensorStarting => "Headband starting",
            EventKind::SensorRecording => "Headband recording",
            EventKind::SensorEnding => "Headband ending",
            EventKind::SensorStartedSleep => "Headband detected sleep",
            EventKind::SensorDeepSleep => "Headband detected deep sleep",
        }
    }

    /// Life-stage an entry of this kind usually belongs to.
    pub fn default_stage(self) -> LifeStage {
        match self {
            EventKind::GotIntoBed | EventKind::SensorStarting | EventKind::SensorRecording => {
                LifeStage::InBed
            }
            EventKind::GoingToSleep | EventKind::NotYetSleeping | EventKind::StillAwake => {
                LifeStage::Going
            }
            EventKind::WokeUp
            | EventKind::WokeUpDidSomething
            | EventKind::WokeUpRetryToSleep
            | EventKind::SensorStartedSleep
            | EventKind::SensorDeepSleep => LifeStage::During,
            EventKind::DoneSleeping | EventKind::SensorEnding => LifeStage::After,
        }
    }

    /// Markers written by the sensor synchronizer rather than the user.
    pub fn is_sensor_marker(self) -> bool {
        matches!(
            self,
            EventKind::SensorStarting
                | EventKind::SensorRecording
                | EventKind::SensorEnding
                | EventKind::SensorStartedSleep
                | EventKind::SensorDeepSleep
        )
    }

    /// Parse an event name as typed on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "gotintobed" | "inbed" => Some(EventKind::GotIntoBed),
            "goingtosleep" => Some(EventKind::GoingToSleep),
            "notyetsleeping" => Some(EventKind::NotYetSleeping),
            "stillawake" => Some(EventKind::StillAwake),
            "wokeup" => Some(EventKind::WokeUp),
            "didsomething" | "wokeupdidsomething" => Some(EventKind::WokeUpDidSomething),
            "retry" | "retrytosleep" | "wokeupretrytosleep" => Some(EventKind::WokeUpRetryToSleep),
            "donesleeping" | "done" => Some(EventKind::DoneSleeping),
            _ => None,
        }
    }
}

/// A single timestamped journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub stage: LifeStage,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Event {
    pub fn new(stage: LifeStage, timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            stage,
            timestamp,
            kind,
            info: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        let info = info.into();
        self.info = if info.is_empty() { None } else { Some(info) };
        self
    }

    /// One-line rendering in the given timezone.
    pub fn summary(&self, tz: Tz) -> String {
        let local = self.timestamp.with_timezone(&tz);
        match &self.info {
            Some(info) => format!("{} {}: {}", local.format("%H:%M"), self.kind.label(), info),
            None => format!("{} {}", local.format("%H:%M"), self.kind.label()),
        }
    }
}

/// Whether `candidate` repeats the latest event of the same kind within
/// `window`.
pub fn is_near_duplicate(events: &[Event], candidate: &Event, window: Duration) -> bool {
    events
        .iter()
        .rev()
        .find(|e| e.kind == candidate.kind)
        .map(|latest| (candidate.timestamp - latest.timestamp).abs() < window)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_names() {
        assert_eq!(EventKind::parse("still-awake"), Some(EventKind::StillAwake));
        assert_eq!(EventKind::parse("Done"), Some(EventKind::DoneSleeping));
        assert_eq!(EventKind::parse("headband"), None);
        assert_eq!(LifeStage::parse("in_bed"), Some(LifeStage::InBed));
    }

    #[test]
    fn test_near_duplicate_only_checks_same_kind() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let events = vec![
            Event::new(LifeStage::InBed, t0, EventKind::GotIntoBed),
            Event::new(LifeStage::Going, t0 + Duration::seconds(20), EventKind::GoingToSleep),
        ];
        let window = Duration::seconds(60);

        let repeat = Event::new(LifeStage::InBed, t0 + Duration::seconds(30), EventKind::GotIntoBed);
        assert!(is_near_duplicate(&events, &repeat, window));

        let later = Event::new(LifeStage::InBed, t0 + Duration::seconds(90), EventKind::GotIntoBed);
        assert!(!is_near_duplicate(&events, &later, window));

        let other = Event::new(LifeStage::During, t0 + Duration::seconds(30), EventKind::WokeUp);
        assert!(!is_near_duplicate(&events, &other, window));
    }

    #[test]
    fn test_summary_uses_timezone() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 22, 5, 0).unwrap();
        let e = Event::new(LifeStage::During, t0, EventKind::WokeUp).with_info("thirsty");
        assert_eq!(e.summary(chrono_tz::UTC), "22:05 Woke up: thirsty");
        assert_eq!(e.summary(chrono_tz::Europe::Berlin), "23:05 Woke up: thirsty");
    }
}
