//! Scenario tests for the daypoint coordinator

use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbeam_channel::Receiver;
use sleep_daypoint::core::{EngineSettings, JournalCoordinator, ManualClock, Slot};
use sleep_daypoint::notify::{UiNotifier, UiSignal};
use sleep_daypoint::record::{
    AttributeDef, BatteryExtremes, EndReason, EventKind, ExternalRecord, Hypnogram, JournalId,
    JournalRecord, LifeStage, StateFlags, StatusCode,
};
use sleep_daypoint::sensor::{ScriptedSensor, SensorState};
use sleep_daypoint::store::{JournalStore, MemoryStore};

type Engine = JournalCoordinator<MemoryStore, ScriptedSensor>;

/// Friday 22:00 UTC.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
}

struct Harness {
    engine: Engine,
    clock: ManualClock,
    signals: Receiver<UiSignal>,
}

impl Harness {
    fn new(store: MemoryStore, sensor: ScriptedSensor, at: DateTime<Utc>) -> Self {
        let clock = ManualClock::new(at);
        let (notifier, signals) = UiNotifier::channel(256);
        let engine = JournalCoordinator::with_clock(
            store,
            sensor,
            notifier,
            EngineSettings::default(),
            clock.clone(),
        );
        Self {
            engine,
            clock,
            signals,
        }
    }

    fn idle(store: MemoryStore, at: DateTime<Utc>) -> Self {
        Self::new(store, ScriptedSensor::in_state(SensorState::Idle, None), at)
    }

    fn drain(&self) -> Vec<UiSignal> {
        self.signals.try_iter().collect()
    }

    fn sensor_to(&mut self, state: SensorState, record: Option<u64>) {
        self.engine.sensor_mut().transition(state, record);
        self.engine.on_state_changed();
    }

    fn slot(&self, slot: Slot) -> Option<&JournalRecord> {
        self.engine.window().get(slot)
    }

    fn slot_id(&self, slot: Slot) -> Option<JournalId> {
        self.slot(slot).and_then(|r| r.id)
    }
}

fn external(id: u64, start: DateTime<Utc>, total_sleep_min: f64) -> ExternalRecord {
    ExternalRecord {
        id,
        start_of_night: start,
        end_of_night: start + Duration::hours(8),
        display_start: None,
        time_to_sleep_min: 10.0,
        awake_min: 0.0,
        rem_min: total_sleep_min,
        light_min: 0.0,
        deep_min: 0.0,
        total_sleep_min,
        awakenings: 0,
        quality_score: 0,
        deep_sum: 0.0,
        end_reason: EndReason::Completed,
        base: Hypnogram::base(Vec::new()),
        display: Hypnogram::display(Vec::new()),
    }
}

fn journal_with_event(start: DateTime<Utc>) -> JournalRecord {
    let mut record = JournalRecord::new(start);
    record.store_event(sleep_daypoint::record::Event::new(
        LifeStage::InBed,
        start,
        EventKind::GotIntoBed,
    ));
    record.flags.insert(StateFlags::JOURNAL_EXPLICIT_START);
    record
}

#[test]
fn test_recovery_places_recent_records() {
    let now = t0();
    let mut store = MemoryStore::new();
    store.seed(journal_with_event(now - Duration::hours(40)));
    let mut older = journal_with_event(now - Duration::hours(20));
    older.ended_at = Some(now - Duration::hours(12));
    let older_id = store.seed(older);
    let newer_id = store.seed(journal_with_event(now - Duration::hours(2)));

    let mut h = Harness::idle(store, now);
    h.engine.resynchronize();

    assert_eq!(h.slot_id(Slot::Prior), Some(older_id));
    assert_eq!(h.slot_id(Slot::Current), Some(newer_id));
    assert!(h.slot(Slot::Future).is_none());

    let first = h.engine.window().clone();
    h.engine.resynchronize();
    assert_eq!(h.engine.window(), &first);
}

fn dead_sensor_night(start: DateTime<Utc>, link: u64) -> JournalRecord {
    let mut record = JournalRecord::new(start);
    record.sensor_link = Some(link);
    record
        .flags
        .insert(StateFlags::SENSOR_DEAD | StateFlags::SENSOR_EXPLICIT_END);
    record
}

fn ended_night(start: DateTime<Utc>) -> JournalRecord {
    let mut record = journal_with_event(start);
    record.flags.insert(StateFlags::JOURNAL_EXPLICIT_END);
    record
}

#[test]
fn test_recovery_looks_past_dead_sensor_nights() {
    let now = t0();
    let cases = [
        (Duration::hours(5), Duration::hours(16)),
        (Duration::hours(20), Duration::hours(30)),
    ];
    for (dead_age, real_age) in cases {
        let mut store = MemoryStore::new();
        store.seed(dead_sensor_night(now - dead_age, 9));
        let real_id = store.seed(ended_night(now - real_age));

        let mut h = Harness::idle(store, now);
        h.engine.resynchronize();

        assert_eq!(h.slot_id(Slot::Prior), Some(real_id), "dead night {dead_age}");
        assert!(h.slot(Slot::Current).is_none());
    }
}

#[test]
fn test_resynchronize_is_idempotent_while_recording() {
    let now = t0() + Duration::hours(1);
    let mut store = MemoryStore::new();
    let mut linked = JournalRecord::new(t0());
    linked.sensor_link = Some(5);
    let id = store.seed(linked);

    let sensor = ScriptedSensor::in_state(SensorState::Recording, Some(5));
    let mut h = Harness::new(store, sensor, now);
    h.engine.resynchronize();

    let current = h.slot(Slot::Current).unwrap();
    assert_eq!(current.id, Some(id));
    assert!(current.flags.contains(StateFlags::SENSOR_RECORDED));

    let first = h.engine.window().clone();
    h.engine.resynchronize();
    assert_eq!(h.engine.window(), &first);
}

#[test]
fn test_expired_current_falls_back_to_prior() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    assert!(h.engine.record_event(LifeStage::InBed, EventKind::GotIntoBed, None));
    let id = h.slot_id(Slot::Current);

    h.clock.advance(Duration::hours(25));
    h.engine.resynchronize();

    assert!(h.slot(Slot::Current).is_none());
    assert_eq!(h.slot_id(Slot::Prior), id);
}

#[test]
fn test_full_night_with_dead_sensor_record_is_evicted() {
    let mut sensor = ScriptedSensor::in_state(SensorState::Idle, None);
    sensor.insert_record(external(7, t0(), 0.0));
    let mut h = Harness::new(MemoryStore::new(), sensor, t0());
    h.engine.resynchronize();

    h.sensor_to(SensorState::Starting, Some(7));
    assert_eq!(h.engine.window().slot_linked_to(7), Some(Slot::Current));
    assert_eq!(h.slot(Slot::Current).unwrap().sensor_starting_at, Some(t0()));
    assert_eq!(h.engine.store().journal_len(), 0);

    h.clock.advance(Duration::minutes(2));
    h.sensor_to(SensorState::Recording, Some(7));
    assert_eq!(h.engine.store().journal_len(), 1);

    h.clock.advance(Duration::minutes(30));
    h.sensor_to(SensorState::Ending, Some(7));
    assert_eq!(h.engine.window().slot_linked_to(7), Some(Slot::Prior));
    assert_eq!(h.engine.window().cursor(), Slot::Prior);
    assert!(h.slot(Slot::Prior).unwrap().is_sensor_dead());
    h.drain();

    h.sensor_to(SensorState::Idle, None);
    assert!(h.slot(Slot::Prior).is_none());
    assert!(h.drain().contains(&UiSignal::RefreshAll));

    // Evicted from the window, still in storage
    let stored = h.engine.store().journal_linked_to(7).unwrap().unwrap();
    assert!(stored.is_sensor_dead());
    assert!(stored.flags.contains(StateFlags::SENSOR_EXPLICIT_END));
}

#[test]
fn test_sensor_resume_promotes_prior_back_to_current() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    h.engine.resynchronize();
    h.sensor_to(SensorState::Starting, Some(7));
    h.sensor_to(SensorState::Recording, Some(7));
    h.sensor_to(SensorState::Ending, Some(7));
    assert_eq!(h.engine.window().slot_linked_to(7), Some(Slot::Prior));
    h.drain();

    h.clock.advance(Duration::minutes(5));
    h.sensor_to(SensorState::Recording, Some(7));

    assert_eq!(h.engine.window().slot_linked_to(7), Some(Slot::Current));
    assert_eq!(h.engine.window().cursor(), Slot::Current);
    let current = h.slot(Slot::Current).unwrap();
    assert!(!current.flags.contains(StateFlags::SENSOR_EXPLICIT_END));
    assert_eq!(current.sensor_ending_at, None);
    assert_eq!(current.status_code(), StatusCode::Recording);
    assert!(h.drain().contains(&UiSignal::RefreshAll));
}

#[test]
fn test_new_sensor_session_reuses_staged_future_record() {
    let mut store = MemoryStore::new();
    let mut staged = JournalRecord::new(t0() + Duration::hours(2));
    staged.store_attribute(&AttributeDef::new("caffeine", LifeStage::Before), "none", 0.0);
    let staged_id = store.seed(staged);

    let mut h = Harness::idle(store, t0());
    h.engine.resynchronize();
    assert_eq!(h.slot_id(Slot::Future), Some(staged_id));

    h.sensor_to(SensorState::Starting, Some(9));
    assert_eq!(h.slot_id(Slot::Current), Some(staged_id));
    assert_eq!(h.slot(Slot::Current).unwrap().sensor_link, Some(9));
    assert!(h.slot(Slot::Future).is_none());
}

#[test]
fn test_stored_link_is_reseated_in_current() {
    let mut store = MemoryStore::new();
    let mut old = JournalRecord::new(t0() - Duration::hours(40));
    old.sensor_link = Some(11);
    let id = store.seed(old);

    let mut h = Harness::idle(store, t0());
    h.engine.resynchronize();
    assert!(h.engine.window().is_empty());
    h.sensor_to(SensorState::Recording, Some(11));

    assert_eq!(h.slot_id(Slot::Current), Some(id));
}

#[test]
fn test_aborted_start_is_deleted_on_idle() {
    let mut store = MemoryStore::new();
    let mut pending = JournalRecord::new(t0());
    pending.sensor_starting_at = Some(t0());
    let id = store.seed(pending);

    let sensor = ScriptedSensor::in_state(SensorState::Starting, None);
    let mut h = Harness::new(store, sensor, t0() + Duration::minutes(10));
    h.engine.resynchronize();
    assert_eq!(h.slot_id(Slot::Current), Some(id));

    h.sensor_to(SensorState::Idle, None);
    assert!(h.slot(Slot::Current).is_none());
    assert_eq!(h.engine.store().journal_len(), 0);
}

#[test]
fn test_start_without_session_is_staged_unsaved() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    h.engine.resynchronize();

    h.sensor_to(SensorState::Starting, None);
    let current = h.slot(Slot::Current).unwrap();
    assert_eq!(current.sensor_starting_at, Some(t0()));
    assert_eq!(current.id, None);
    assert_eq!(h.engine.store().journal_len(), 0);
    assert!(h.drain().contains(&UiSignal::RefreshStatus));

    h.sensor_to(SensorState::Idle, None);
    assert!(h.slot(Slot::Current).is_none());
}

#[test]
fn test_probe_refreshes_battery_while_recording() {
    let mut store = MemoryStore::new();
    let mut linked = JournalRecord::new(t0());
    linked.sensor_link = Some(3);
    let id = store.seed(linked);

    let sensor = ScriptedSensor::in_state(SensorState::Recording, Some(3));
    let mut h = Harness::new(store, sensor, t0() + Duration::hours(1));
    h.engine.resynchronize();

    h.engine.sensor_mut().set_battery(90, 40);
    h.engine.on_probed_same_state();

    let expected = BatteryExtremes { high: 90, low: 40 };
    assert_eq!(h.slot(Slot::Current).unwrap().battery, expected);
    let stored = h.engine.store().journal_by_id(id).unwrap().unwrap();
    assert_eq!(stored.battery, expected);
}

#[test]
fn test_done_sleeping_concludes_the_night() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    h.engine.resynchronize();
    assert!(h.engine.record_event(LifeStage::InBed, EventKind::GotIntoBed, None));

    h.clock.advance(Duration::hours(8));
    assert!(h.engine.record_event(LifeStage::After, EventKind::DoneSleeping, None));

    assert!(h.slot(Slot::Current).is_none());
    assert_eq!(h.engine.window().cursor(), Slot::Prior);
    let prior = h.slot(Slot::Prior).unwrap();
    assert_eq!(prior.status_code(), StatusCode::Done);
    assert_eq!(prior.ended_at, Some(t0() + Duration::hours(8)));
    assert!(!h.engine.done_sleeping_enabled());
    assert_eq!(
        h.engine.status().current_slot_label(),
        "Prior\nFri 22:00-06:00"
    );

    let stored = h.engine.store().journal_after(None, sleep_daypoint::store::SortOrder::Ascending);
    assert_eq!(stored.unwrap().len(), 1);
}

#[test]
fn test_done_sleeping_checks_linked_sensor_record() {
    let mut store = MemoryStore::new();
    let mut linked = journal_with_event(t0());
    linked.sensor_link = Some(7);
    store.seed(linked);
    let mut sensor = ScriptedSensor::in_state(SensorState::Idle, None);
    sensor.insert_record(external(7, t0(), 420.0));

    let mut h = Harness::new(store, sensor, t0() + Duration::hours(8));
    h.engine.resynchronize();
    assert!(h.engine.record_event(LifeStage::After, EventKind::DoneSleeping, None));

    let prior = h.slot(Slot::Prior).unwrap();
    assert!(prior.is_amend_checked());
    let stored = h.engine.store().journal_linked_to(7).unwrap().unwrap();
    assert!(stored.is_amend_checked());
}

#[test]
fn test_near_duplicate_events_are_rejected() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    assert!(h.engine.record_event(LifeStage::During, EventKind::WokeUp, Some("thirsty")));

    h.clock.advance(Duration::seconds(30));
    assert!(!h.engine.record_event(LifeStage::During, EventKind::WokeUp, None));

    h.clock.advance(Duration::minutes(2));
    assert!(h.engine.record_event(LifeStage::During, EventKind::WokeUp, None));
    assert_eq!(h.slot(Slot::Current).unwrap().events.len(), 2);
}

#[test]
fn test_entries_for_missing_prior_are_refused() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    h.engine.resynchronize();
    assert!(h.engine.step_cursor_back());
    assert!(h.drain().contains(&UiSignal::RefreshAll));

    assert_eq!(
        h.engine.stage_entry_block(LifeStage::InBed),
        Some("No immediately prior sleep session is available")
    );
    assert!(!h.engine.record_event(LifeStage::InBed, EventKind::GotIntoBed, None));
    assert!(h.slot(Slot::Prior).is_none());
    assert!(!h.engine.done_sleeping_enabled());
}

#[test]
fn test_past_nights_only_take_before_and_after_entries() {
    let mut store = MemoryStore::new();
    let mut last_night = journal_with_event(t0() - Duration::hours(24));
    last_night.ended_at = Some(t0() - Duration::hours(16));
    store.seed(last_night);

    let mut h = Harness::idle(store, t0());
    h.engine.resynchronize();
    assert!(h.slot(Slot::Prior).is_some());
    h.engine.step_cursor_back();

    assert_eq!(
        h.engine.stage_entry_block(LifeStage::During),
        Some("Entry of Events for past sleep sessions is not allowed")
    );
    assert_eq!(h.engine.stage_entry_block(LifeStage::After), None);
    let mood = AttributeDef::new("mood", LifeStage::After);
    assert!(h.engine.record_attribute(&mood, "groggy", 2.0));
    assert_eq!(h.engine.attribute_value(&mood).as_deref(), Some("groggy"));
}

#[test]
fn test_attributes_store_and_remove() {
    let mut h = Harness::idle(MemoryStore::new(), t0());
    let caffeine = AttributeDef::new("caffeine", LifeStage::Before);
    let mood = AttributeDef::new("mood", LifeStage::After);

    assert!(!h.engine.remove_attribute(&caffeine));
    assert!(h.engine.record_attribute(&caffeine, "1 cup", 0.0));
    assert_eq!(h.slot(Slot::Current).unwrap().ended_at, None);

    h.clock.advance(Duration::hours(9));
    assert!(h.engine.record_attribute(&mood, "rested", 4.0));
    assert_eq!(
        h.slot(Slot::Current).unwrap().ended_at,
        Some(t0() + Duration::hours(9))
    );

    assert!(h.engine.remove_attribute(&caffeine));
    assert!(!h.engine.remove_attribute(&caffeine));
    assert_eq!(h.engine.attribute_value(&caffeine), None);
}

#[test]
fn test_deleted_record_leaves_the_window() {
    let mut store = MemoryStore::new();
    let id = store.seed(journal_with_event(t0() - Duration::hours(1)));

    let mut h = Harness::idle(store, t0());
    h.engine.resynchronize();
    assert_eq!(h.slot_id(Slot::Current), Some(id));

    assert!(h.engine.store_mut().delete_journal(id).unwrap());
    h.engine.on_record_deleted(id);
    assert!(h.engine.window().is_empty());
    assert!(h.drain().contains(&UiSignal::RefreshStatus));
}
