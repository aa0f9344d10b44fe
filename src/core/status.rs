//! Human-readable status strings and per-night summaries.

use chrono_tz::Tz;

use super::daypoint::{DaypointWindow, Slot};
use crate::record::{JournalRecord, LifeStage, SensorRecordId, StatusCode};
use crate::sensor::{SensorSource, SensorState};

/// Read-only view over the window and sensor for status queries.
pub struct StatusView<'a, Z: ?Sized> {
    window: &'a DaypointWindow,
    sensor: &'a Z,
    tz: Tz,
}

impl<'a, Z: SensorSource + ?Sized> StatusView<'a, Z> {
    pub fn new(window: &'a DaypointWindow, sensor: &'a Z, tz: Tz) -> Self {
        Self { window, sensor, tz }
    }

    /// Label beside the "next" control.
    pub fn next_slot_label(&self) -> String {
        match self.window.cursor() {
            Slot::Prior => format!("{}\n{}", self.tonight_status(), self.times(Slot::Current)),
            Slot::Current => self.next_entry(),
            Slot::Future => String::new(),
        }
    }

    /// Label of the slot under the cursor.
    pub fn current_slot_label(&self) -> String {
        match self.window.cursor() {
            Slot::Prior => self.prior_entry(),
            Slot::Current => format!("{}\n{}", self.tonight_status(), self.times(Slot::Current)),
            Slot::Future => self.next_entry(),
        }
    }

    /// Label beside the "previous" control.
    pub fn previous_slot_label(&self) -> String {
        match self.window.cursor() {
            Slot::Prior => String::new(),
            Slot::Current => self.prior_entry(),
            Slot::Future => format!("{}\n{}", self.tonight_status(), self.times(Slot::Current)),
        }
    }

    /// Sensor status as seen from the cursor slot.
    pub fn sensor_status_label(&self) -> String {
        match self.window.cursor() {
            Slot::Prior => match self.window.active().and_then(|r| r.sensor_link) {
                Some(link) => self.sensor_label_for(link).to_string(),
                None => "None".to_string(),
            },
            Slot::Current => self.sensor.state().label().to_string(),
            Slot::Future => "None".to_string(),
        }
    }

    pub fn journal_status_label(&self) -> String {
        match self.window.active() {
            None => "None".to_string(),
            Some(record) => {
                let linkage = if record.sensor_link.is_some() {
                    "Linked"
                } else {
                    "Unlinked"
                };
                format!("{} & {}", linkage, record.status_code().label())
            }
        }
    }

    pub fn journal_status_code(&self) -> Option<StatusCode> {
        self.window.active().map(JournalRecord::status_code)
    }

    /// Summary lines of the record under the cursor.
    pub fn daypoint_summary(&self) -> Vec<String> {
        match self.window.active() {
            Some(record) => summarize(record, self.tz),
            None => vec!["No Sleep Record created yet".to_string()],
        }
    }

    fn sensor_label_for(&self, link: SensorRecordId) -> &'static str {
        if self.sensor.active_record_id() == Some(link) {
            return self.sensor.state().label();
        }
        match self.sensor.record(link) {
            Some(record) if record.is_active() => SensorState::Recording.label(),
            Some(record) if record.has_sleep() => "Done",
            Some(_) => "Dead",
            None => "None",
        }
    }

    fn prior_entry(&self) -> String {
        if self.window.is_occupied(Slot::Prior) {
            format!("Prior\n{}", self.times(Slot::Prior))
        } else {
            "None".to_string()
        }
    }

    fn next_entry(&self) -> String {
        if self.window.is_occupied(Slot::Future) {
            format!("Next\n{}", self.times(Slot::Future))
        } else {
            String::new()
        }
    }

    /// Overall status of tonight's record combined with the sensor state.
    fn tonight_status(&self) -> &'static str {
        let state = self.sensor.state();
        let code = self
            .window
            .get(Slot::Current)
            .map(JournalRecord::status_code)
            .unwrap_or(StatusCode::Empty);
        match code {
            StatusCode::Empty | StatusCode::JustLinked => match state {
                SensorState::Starting => "Starting",
                SensorState::Recording => "Recording",
                SensorState::Ending => "Ending",
                SensorState::Idle | SensorState::Unknown => "Tonight",
            },
            StatusCode::Recording => match state {
                SensorState::Idle => "Waiting",
                SensorState::Starting => "Syncing",
                SensorState::Recording => "Recording",
                SensorState::Ending => "Ending",
                SensorState::Unknown => "Recording Mis-Sync",
            },
            StatusCode::SoftDone | StatusCode::Done => match state {
                SensorState::Starting => "Mis-Sync",
                SensorState::Recording => "Still Recording",
                SensorState::Ending => "Ending",
                SensorState::Idle | SensorState::Unknown => "Done",
            },
        }
    }

    fn times(&self, slot: Slot) -> String {
        self.window
            .get(slot)
            .map(|record| time_range(record, self.tz))
            .unwrap_or_default()
    }
}

/// `"Fri 22:00-06:30"`, or just the start when the night has no end yet.
pub fn time_range(record: &JournalRecord, tz: Tz) -> String {
    let start = record.started_at.with_timezone(&tz).format("%a %H:%M");
    match record.display_end() {
        Some(end) => format!("{}-{}", start, end.with_timezone(&tz).format("%H:%M")),
        None => start.to_string(),
    }
}

/// Plain-text listing of one record: header, battery, Before attributes,
/// events in order, then After attributes.
pub fn summarize(record: &JournalRecord, tz: Tz) -> Vec<String> {
    let mut lines = Vec::new();

    let mut header = match record.id {
        Some(id) => format!("Sleep Journal-ID# {id}"),
        None => "Sleep Journal-ID# (not yet saved)".to_string(),
    };
    if let Some(link) = record.sensor_link {
        header.push_str(&format!(" linked to Sensor-ID# {link}"));
        if record.is_amended() {
            header.push_str(" amended");
        } else if record.is_amend_checked() {
            header.push_str(" checked not amended");
        } else {
            header.push_str(" not checked");
        }
    }
    lines.push(header);

    if record.battery.high > 0 {
        lines.push(format!("Battery Highest: {}", record.battery.high));
    }
    if record.battery.low > 0 {
        lines.push(format!("Battery Lowest: {}", record.battery.low));
    }

    if record.events.is_empty() && !record.has_attributes() {
        lines.push("Nothing recorded yet".to_string());
        return lines;
    }

    let attribute_lines = |stage: LifeStage| -> Vec<String> {
        record
            .attributes()
            .filter(|a| a.stage == stage)
            .map(|a| format!("{}: {}", stage.label(), a.summary()))
            .collect()
    };

    lines.extend(attribute_lines(LifeStage::Before));
    lines.extend(record.events.iter().map(|e| format!("\t{}", e.summary(tz))));
    lines.extend(attribute_lines(LifeStage::After));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttributeDef, Event, EventKind, StateFlags};
    use crate::sensor::ScriptedSensor;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        // a Friday
        Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_orders_sections() {
        let mut record = JournalRecord::new(t0());
        record.id = Some(12);
        record.sensor_link = Some(4);
        record.flags.insert(StateFlags::AMEND_CHECKED);
        record.battery.high = 97;
        record.store_attribute(&AttributeDef::new("mood", LifeStage::After), "rested", 4.0);
        record.store_attribute(&AttributeDef::new("caffeine", LifeStage::Before), "none", 0.0);
        record.store_event(Event::new(LifeStage::InBed, t0(), EventKind::GotIntoBed));

        let lines = summarize(&record, chrono_tz::UTC);
        assert_eq!(
            lines,
            vec![
                "Sleep Journal-ID# 12 linked to Sensor-ID# 4 checked not amended".to_string(),
                "Battery Highest: 97".to_string(),
                "Before: caffeine=none".to_string(),
                "\t22:00 Got into bed".to_string(),
                "After: mood=rested (4.0)".to_string(),
            ]
        );
    }

    #[test]
    fn test_summary_of_empty_record() {
        let record = JournalRecord::new(t0());
        assert_eq!(
            summarize(&record, chrono_tz::UTC),
            vec!["Sleep Journal-ID# (not yet saved)", "Nothing recorded yet"]
        );
    }

    #[test]
    fn test_labels_follow_cursor() {
        let mut window = DaypointWindow::new();
        let mut prior = JournalRecord::new(t0());
        prior.ended_at = Some(t0() + Duration::hours(8));
        window.put(Slot::Prior, prior);

        let sensor = ScriptedSensor::in_state(SensorState::Idle, None);
        let view = StatusView::new(&window, &sensor, chrono_tz::UTC);
        assert_eq!(view.current_slot_label(), "Tonight\n");
        assert_eq!(view.previous_slot_label(), "Prior\nFri 22:00-06:00");
        assert_eq!(view.next_slot_label(), "");
        assert_eq!(view.journal_status_label(), "None");
        assert_eq!(view.daypoint_summary(), vec!["No Sleep Record created yet"]);

        window.step_cursor_back();
        let view = StatusView::new(&window, &sensor, chrono_tz::UTC);
        assert_eq!(view.current_slot_label(), "Prior\nFri 22:00-06:00");
        assert_eq!(view.previous_slot_label(), "");
        assert_eq!(view.next_slot_label(), "Tonight\n");
        assert_eq!(view.journal_status_label(), "Unlinked & Ended");
    }

    #[test]
    fn test_tonight_status_combines_record_and_sensor() {
        let mut window = DaypointWindow::new();
        let mut record = JournalRecord::new(t0());
        record.flags.insert(StateFlags::JOURNAL_EXPLICIT_START);
        window.put(Slot::Current, record);

        let idle = ScriptedSensor::in_state(SensorState::Idle, None);
        assert_eq!(
            StatusView::new(&window, &idle, chrono_tz::UTC).current_slot_label(),
            "Waiting\nFri 22:00"
        );

        let starting = ScriptedSensor::in_state(SensorState::Starting, None);
        assert_eq!(
            StatusView::new(&window, &starting, chrono_tz::UTC).current_slot_label(),
            "Syncing\nFri 22:00"
        );
    }
}
