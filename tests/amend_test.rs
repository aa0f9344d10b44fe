//! Amendment scenarios over whole nights

use chrono::{DateTime, Duration, TimeZone, Utc};
use sleep_daypoint::core::amend;
use sleep_daypoint::record::{
    EndReason, Event, EventKind, ExternalRecord, Hypnogram, JournalRecord, LifeStage, SleepStage,
    StateFlags,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
}

fn minutes(m: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(m)
}

/// 500 minutes: ten minutes awake, then REM to the end.
fn rem_night() -> ExternalRecord {
    let mut base = vec![SleepStage::Wake; 20];
    base.extend(vec![SleepStage::Rem; 980]);
    let mut display = vec![SleepStage::Wake; 2];
    display.extend(vec![SleepStage::Rem; 98]);

    ExternalRecord {
        id: 7,
        start_of_night: t0(),
        end_of_night: minutes(500),
        display_start: None,
        time_to_sleep_min: 10.0,
        awake_min: 0.0,
        rem_min: 490.0,
        light_min: 0.0,
        deep_min: 0.0,
        total_sleep_min: 490.0,
        awakenings: 0,
        quality_score: 104,
        deep_sum: 12.0,
        end_reason: EndReason::Completed,
        base: Hypnogram::base(base),
        display: Hypnogram::display(display),
    }
}

fn done_journal(events: Vec<Event>) -> JournalRecord {
    let mut journal = JournalRecord::new(t0());
    journal.id = Some(1);
    journal.sensor_link = Some(7);
    journal.flags.insert(StateFlags::JOURNAL_EXPLICIT_END);
    for event in events {
        journal.store_event(event);
    }
    journal
}

fn still_awake_events() -> Vec<Event> {
    vec![
        Event::new(LifeStage::InBed, t0(), EventKind::GotIntoBed),
        Event::new(LifeStage::Going, minutes(40), EventKind::StillAwake),
        Event::new(LifeStage::During, minutes(480), EventKind::WokeUp),
    ]
}

#[test]
fn test_still_awake_converts_preceding_rem_to_wake() {
    let external = rem_night();
    let mut journal = done_journal(still_awake_events());

    assert!(amend(&mut journal, &external, false));
    assert!(journal.is_amend_checked());
    assert!(journal.is_amended());
    assert!(journal.flags.contains(StateFlags::AMEND_V1));

    let amendment = journal.amendment.as_ref().unwrap();
    let base = amendment.base.as_ref().unwrap();
    // [T0, T0+40min] is wake: 81 cells of 30 seconds
    for cell in 0..=80 {
        assert_eq!(base.get(cell), Some(SleepStage::Wake), "base cell {cell}");
    }
    assert_eq!(base.get(81), Some(SleepStage::Rem));

    let display = amendment.display.as_ref().unwrap();
    for cell in 0..=8 {
        assert_eq!(display.get(cell), Some(SleepStage::Wake), "display cell {cell}");
    }
    assert_eq!(display.get(9), Some(SleepStage::Rem));

    assert_eq!(amendment.start_of_night, Some(t0()));
    assert_eq!(amendment.end_of_night, Some(minutes(500)));
    assert_eq!(amendment.deep_sum, 12.0);
    assert!(amendment.total_sleep_min < external.total_sleep_min);
}

#[test]
fn test_second_amend_without_recheck_changes_nothing() {
    let external = rem_night();
    let mut journal = done_journal(still_awake_events());

    assert!(amend(&mut journal, &external, false));
    let first = journal.clone();
    assert!(!amend(&mut journal, &external, false));
    assert_eq!(journal, first);
}

#[test]
fn test_no_journal_events_only_marks_checked() {
    let mut external = rem_night();
    external.total_sleep_min = 420.0;
    external.awakenings = 2;
    let mut journal = done_journal(Vec::new());

    assert!(amend(&mut journal, &external, false));
    assert!(journal.is_amend_checked());
    assert!(!journal.is_amended());
    assert!(journal.amendment.is_none());
}

#[test]
fn test_amended_series_are_stable_under_reamendment() {
    let external = rem_night();
    let mut journal = done_journal(still_awake_events());
    amend(&mut journal, &external, false);
    let first = journal.amendment.clone().unwrap();

    let mut amended_night = rem_night();
    amended_night.base = first.base.clone().unwrap();
    amended_night.display = first.display.clone().unwrap();
    amended_night.total_sleep_min = first.total_sleep_min;
    amended_night.awakenings = first.awakenings;
    amended_night.quality_score = first.quality_score;

    let mut again = done_journal(still_awake_events());
    assert!(amend(&mut again, &amended_night, false));
    assert!(again.is_amend_checked());
    assert!(!again.is_amended());
}
