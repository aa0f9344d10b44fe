//! Hypnogram amendment from journal evidence.
//!
//! The headband's stage timeline is recomputed with journal events treated
//! as ground truth: time the user reports being awake is forced to wake in
//! both series, and the summary statistics are derived again from the
//! corrected base series. The sensor record itself is never modified; the
//! results land in the journal record's `amendment`.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::record::{
    Amendment, Event, EventKind, ExternalRecord, Hypnogram, JournalRecord, LifeStage, SleepStage,
    StateFlags, BASE_EPOCH_SECS, DISPLAY_EPOCH_SECS,
};

/// Sensor records the amendment cannot work with.
#[derive(Debug, Error, PartialEq)]
pub enum AmendError {
    #[error("{series} series has {found}s cells, expected {expected}s")]
    Resolution {
        series: &'static str,
        expected: i64,
        found: i64,
    },

    #[error("night ends at {end} before it starts at {start}")]
    InvertedNight {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// One stretch of the night between two awake moments.
#[derive(Debug, Clone, PartialEq)]
struct SleepInterval {
    seq: usize,
    /// Moment the user was known to be awake
    awake: DateTime<Utc>,
    /// Moment the user started trying to sleep again
    trying: Option<DateTime<Utc>>,
    still_awake: Option<DateTime<Utc>>,
    re_awake: Option<DateTime<Utc>>,
}

impl SleepInterval {
    fn opening(seq: usize, awake: DateTime<Utc>, trying: Option<DateTime<Utc>>) -> Self {
        Self {
            seq,
            awake,
            trying,
            still_awake: None,
            re_awake: None,
        }
    }
}

/// Result of one recomputation pass.
#[derive(Debug)]
struct Recomputed {
    amendment: Amendment,
    changed: bool,
}

/// Amend `journal` against its linked sensor record.
///
/// Returns true when the journal record changed and needs saving: either it
/// was checked for the first time or an amendment was applied. Records that
/// are still recording, not finished, or already checked (unless
/// `recheck`) are left alone.
pub fn amend(journal: &mut JournalRecord, external: &ExternalRecord, recheck: bool) -> bool {
    if journal.is_amend_checked() && !recheck {
        tracing::debug!(journal_id = ?journal.id, "Already checked; not amending");
        return false;
    }
    if external.is_active() {
        tracing::debug!(sensor_id = external.id, "Sensor record still active; not amending");
        return false;
    }
    if !journal.status_code().is_done() {
        tracing::debug!(journal_id = ?journal.id, status = journal.status_code().label(), "Journal not done; not amending");
        return false;
    }

    let mut was_not_checked = false;
    if !journal.is_amend_checked() {
        journal.flags.insert(StateFlags::AMEND_CHECKED);
        was_not_checked = true;
    }
    if !external.has_sleep() || journal.events.is_empty() {
        return was_not_checked;
    }

    match recompute(&journal.events, external) {
        Ok(Recomputed {
            mut amendment,
            changed,
        }) => {
            if changed {
                journal
                    .flags
                    .insert(StateFlags::AMEND_APPLIED | StateFlags::AMEND_V1);
                amendment.start_of_night = Some(external.start_of_night);
                amendment.end_of_night = Some(external.end_of_night);
                amendment.display_start = external.display_start;
            }
            if !journal.is_amended() {
                amendment.base = None;
                amendment.display = None;
            }
            tracing::info!(
                journal_id = ?journal.id,
                sensor_id = external.id,
                changed,
                total_sleep_min = amendment.total_sleep_min,
                quality = amendment.quality_score,
                "Amendment computed"
            );
            journal.amendment = Some(amendment);
            changed || was_not_checked
        }
        Err(e) => {
            tracing::error!(
                journal_id = ?journal.id,
                sensor_id = external.id,
                error = %e,
                "Amendment failed"
            );
            was_not_checked
        }
    }
}

fn validate(external: &ExternalRecord) -> Result<(), AmendError> {
    if external.base.epoch_secs != BASE_EPOCH_SECS {
        return Err(AmendError::Resolution {
            series: "base",
            expected: BASE_EPOCH_SECS,
            found: external.base.epoch_secs,
        });
    }
    if external.display.epoch_secs != DISPLAY_EPOCH_SECS {
        return Err(AmendError::Resolution {
            series: "display",
            expected: DISPLAY_EPOCH_SECS,
            found: external.display.epoch_secs,
        });
    }
    if external.end_of_night < external.start_of_night {
        return Err(AmendError::InvertedNight {
            start: external.start_of_night,
            end: external.end_of_night,
        });
    }
    Ok(())
}

fn recompute(events: &[Event], external: &ExternalRecord) -> Result<Recomputed, AmendError> {
    validate(external)?;

    let onset = external.start_of_night
        + Duration::milliseconds((external.time_to_sleep_min * 60_000.0) as i64);
    let onset_index = corrected_onset_index(external);
    tracing::debug!(
        sensor_id = external.id,
        onset_index,
        nominal = (external.time_to_sleep_min * 2.0) as usize,
        "Corrected sleep onset"
    );

    let extended = extended_events(events, external, onset);
    let intervals = fold_intervals(&extended, external);

    let mut base = external.base.clone();
    let mut display = external.display.clone();
    let origin = external.series_origin();
    let mut cells_changed = 0;

    for interval in &intervals {
        let Some(trying) = interval.trying else {
            continue;
        };
        if interval.awake < origin || trying < interval.awake {
            continue;
        }
        tracing::trace!(
            seq = interval.seq,
            awake = %interval.awake,
            trying = %trying,
            still_awake = ?interval.still_awake,
            re_awake = ?interval.re_awake,
            "Sleep interval"
        );
        for series in [&mut display, &mut base] {
            if let (Some(first), Some(last)) = (
                series.cell_at(origin, interval.awake),
                series.cell_at(origin, trying),
            ) {
                cells_changed += series.overwrite_wake(first, last);
            }
        }
    }

    for still in extended.iter().filter(|e| e.kind == EventKind::StillAwake) {
        for series in [&mut display, &mut base] {
            if let Some(cell) = series.cell_at(origin, still.timestamp) {
                cells_changed += series.back_trace_wake(cell);
            }
        }
    }

    let mut amendment = stage_minutes(&base, onset_index);
    amendment.deep_sum = external.deep_sum;

    let mut changed = cells_changed > 0;

    amendment.awakenings = display.count_awakenings();
    if amendment.awakenings != external.awakenings {
        changed = true;
    }

    let total = amendment.rem_min + amendment.light_min + amendment.deep_min;
    amendment.total_sleep_min = external.total_sleep_min;
    if (total - external.total_sleep_min).abs() > f64::EPSILON {
        amendment.total_sleep_min = total;
        changed = true;
    }

    let quality = quality_score(&amendment);
    amendment.quality_score = external.quality_score;
    if quality != external.quality_score {
        amendment.quality_score = quality;
        changed = true;
    }

    amendment.base = Some(base);
    amendment.display = Some(display);
    Ok(Recomputed { amendment, changed })
}

/// Walk the base series backwards from its end until the per-stage sample
/// counts cover the sensor's reported totals. The result is where the
/// sensor actually started accumulating sleep data.
fn corrected_onset_index(external: &ExternalRecord) -> usize {
    let stages = &external.base.stages;
    let needed = |minutes: f64| (minutes * 2.0).max(0.0) as usize;
    let (wake_needed, rem_needed, light_needed, deep_needed) = (
        needed(external.awake_min),
        needed(external.rem_min),
        needed(external.light_min),
        needed(external.deep_min),
    );
    let floor = needed(external.time_to_sleep_min) as i64;

    let (mut wake, mut rem, mut light, mut deep) = (0, 0, 0, 0);
    let mut skip_trailing_wake = true;
    let mut index = stages.len() as i64 - 1;
    while index >= floor {
        match stages[index as usize] {
            SleepStage::Wake => {
                if !skip_trailing_wake {
                    wake += 1;
                }
            }
            SleepStage::Rem => {
                skip_trailing_wake = false;
                rem += 1;
            }
            SleepStage::Light => {
                skip_trailing_wake = false;
                light += 1;
            }
            SleepStage::Deep | SleepStage::LightToDeep => {
                skip_trailing_wake = false;
                deep += 1;
            }
            SleepStage::Undefined => {}
        }
        if wake >= wake_needed && rem >= rem_needed && light >= light_needed && deep >= deep_needed
        {
            break;
        }
        index -= 1;
    }
    index.max(0) as usize
}

/// Journal events merged with the synthetic sensor markers, ascending.
/// Journal events sort before synthetic ones at equal timestamps.
fn extended_events(events: &[Event], external: &ExternalRecord, onset: DateTime<Utc>) -> Vec<Event> {
    let mut synthetic = vec![Event::new(LifeStage::InBed, onset, EventKind::SensorStartedSleep)];
    synthetic.extend(
        external
            .base
            .deep_run_starts(external.start_of_night)
            .into_iter()
            .map(|at| Event::new(LifeStage::During, at, EventKind::SensorDeepSleep)),
    );
    synthetic.sort_by_key(|e| e.timestamp);

    let mut journal: Vec<&Event> = events.iter().collect();
    journal.sort_by_key(|e| e.timestamp);

    let mut merged = Vec::with_capacity(journal.len() + synthetic.len());
    let mut synthetic = synthetic.into_iter().peekable();
    for event in journal {
        while let Some(next) = synthetic.next_if(|s| s.timestamp < event.timestamp) {
            merged.push(next);
        }
        merged.push(event.clone());
    }
    merged.extend(synthetic);
    merged
}

/// Fold the extended event list into sleep intervals.
///
/// A deep-sleep marker suppresses the next would-be interval opener once:
/// an in-bed, going-to-sleep, did-something or retry event after deep
/// sleep closes the interval instead of moving its trying-to-sleep mark.
fn fold_intervals(extended: &[Event], external: &ExternalRecord) -> Vec<SleepInterval> {
    let mut intervals = Vec::new();
    let mut current = SleepInterval::opening(0, external.start_of_night, None);
    let mut goto_next = false;
    let mut wokeup_active = true;

    for event in extended {
        let at = event.timestamp;
        match event.kind {
            EventKind::NotYetSleeping | EventKind::SensorStarting | EventKind::SensorRecording => {}
            EventKind::SensorStartedSleep => current.trying = Some(at),
            EventKind::StillAwake => current.still_awake = Some(at),
            EventKind::SensorDeepSleep => {
                goto_next = true;
                wokeup_active = false;
            }
            EventKind::GotIntoBed
            | EventKind::GoingToSleep
            | EventKind::WokeUpDidSomething
            | EventKind::WokeUpRetryToSleep
                if !goto_next && wokeup_active =>
            {
                if matches!(
                    event.kind,
                    EventKind::GoingToSleep | EventKind::WokeUpRetryToSleep
                ) {
                    wokeup_active = false;
                }
                current.trying = Some(at);
            }
            EventKind::GotIntoBed
            | EventKind::GoingToSleep
            | EventKind::WokeUpDidSomething
            | EventKind::WokeUpRetryToSleep
            | EventKind::WokeUp => {
                if event.kind == EventKind::WokeUp {
                    wokeup_active = true;
                }
                current.re_awake = Some(at);
                let next = SleepInterval::opening(intervals.len() + 1, at, Some(at));
                intervals.push(std::mem::replace(&mut current, next));
                goto_next = false;
            }
            EventKind::SensorEnding | EventKind::DoneSleeping => {
                current.re_awake = Some(at);
                wokeup_active = false;
            }
        }
    }

    if current.re_awake.is_none() {
        current.re_awake = Some(external.end_of_night);
    }
    intervals.push(current);
    intervals
}

/// Stage minutes from the amended base series, starting at `onset_index`.
fn stage_minutes(base: &Hypnogram, onset_index: usize) -> Amendment {
    let cell_min = base.epoch_secs as f64 / 60.0;
    let mut amendment = Amendment::default();
    let mut unknown_min = 0.0;
    let mut before_sleep = true;

    for stage in base.stages.iter().skip(onset_index) {
        match stage {
            SleepStage::Wake => {
                if before_sleep {
                    amendment.time_to_sleep_min += cell_min;
                } else {
                    amendment.awake_min += cell_min;
                }
            }
            SleepStage::Rem => {
                amendment.rem_min += cell_min;
                before_sleep = false;
            }
            SleepStage::Light => {
                amendment.light_min += cell_min;
                before_sleep = false;
            }
            SleepStage::Deep => {
                amendment.deep_min += cell_min;
                before_sleep = false;
            }
            SleepStage::LightToDeep => {
                amendment.light_to_deep_min += cell_min;
                amendment.deep_min += cell_min;
                before_sleep = false;
            }
            SleepStage::Undefined => unknown_min += cell_min,
        }
    }
    if unknown_min > 0.0 {
        tracing::debug!(unknown_min, "Undefined cells in amended series");
    }
    amendment
}

/// Headband-style quality score.
pub fn quality_score(amendment: &Amendment) -> i32 {
    let score = amendment.total_sleep_min / 60.0 + amendment.rem_min / 60.0 / 2.0
        + amendment.deep_min / 60.0 * 1.5
        - amendment.awake_min / 60.0 / 2.0
        - f64::from(amendment.awakenings) / 15.0;
    (score * 8.5).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EndReason;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
    }

    fn sensor(base: &str, display: &str) -> ExternalRecord {
        let base = Hypnogram::from_codes(BASE_EPOCH_SECS, base);
        ExternalRecord {
            id: 7,
            start_of_night: t0(),
            end_of_night: t0() + Duration::seconds(base.len() as i64 * BASE_EPOCH_SECS),
            display_start: None,
            time_to_sleep_min: 1.0,
            awake_min: 0.0,
            rem_min: 1.0,
            light_min: 2.0,
            deep_min: 1.0,
            total_sleep_min: 4.0,
            awakenings: 0,
            quality_score: 1,
            deep_sum: 3.5,
            end_reason: EndReason::Completed,
            base,
            display: Hypnogram::from_codes(DISPLAY_EPOCH_SECS, display),
        }
    }

    fn finished_journal(events: Vec<Event>) -> JournalRecord {
        let mut journal = JournalRecord::new(t0());
        journal.sensor_link = Some(7);
        journal.flags.insert(StateFlags::SENSOR_EXPLICIT_END);
        journal.events = events;
        journal
    }

    #[test]
    fn test_onset_index_skips_trailing_wake() {
        // 2 wake, 2 rem, 4 light, 2 deep, 3 trailing wake
        let ext = sensor("1122333344111", "13");
        assert_eq!(corrected_onset_index(&ext), 2);
    }

    #[test]
    fn test_onset_index_clamps_when_totals_not_met() {
        let mut ext = sensor("1122333344111", "13");
        ext.light_min = 30.0;
        assert_eq!(corrected_onset_index(&ext), 1);
    }

    #[test]
    fn test_extended_events_put_journal_first_on_ties() {
        let ext = sensor("11443344", "13");
        let onset = t0() + Duration::seconds(60);
        let events = vec![Event::new(LifeStage::InBed, onset, EventKind::GotIntoBed)];
        let kinds: Vec<_> = extended_events(&events, &ext, onset)
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::GotIntoBed,
                EventKind::SensorStartedSleep,
                EventKind::SensorDeepSleep,
                EventKind::SensorDeepSleep,
            ]
        );
    }

    #[test]
    fn test_deep_sleep_suppresses_next_opener() {
        let ext = sensor("1133443333", "13");
        let extended = vec![
            Event::new(LifeStage::InBed, t0(), EventKind::GotIntoBed),
            Event::new(LifeStage::InBed, t0() + Duration::seconds(60), EventKind::SensorStartedSleep),
            Event::new(LifeStage::During, t0() + Duration::seconds(120), EventKind::SensorDeepSleep),
            Event::new(LifeStage::During, t0() + Duration::seconds(200), EventKind::WokeUpRetryToSleep),
        ];
        let intervals = fold_intervals(&extended, &ext);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].trying, Some(t0() + Duration::seconds(60)));
        assert_eq!(intervals[0].re_awake, Some(t0() + Duration::seconds(200)));
        assert_eq!(intervals[1].awake, t0() + Duration::seconds(200));
        assert_eq!(intervals[1].re_awake, Some(ext.end_of_night));
    }

    #[test]
    fn test_done_sleeping_sets_re_awake_without_closing() {
        let ext = sensor("11333333", "13");
        let done = t0() + Duration::seconds(200);
        let extended = vec![Event::new(LifeStage::After, done, EventKind::DoneSleeping)];
        let intervals = fold_intervals(&extended, &ext);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].re_awake, Some(done));
    }

    #[test]
    fn test_not_done_journal_is_skipped() {
        let ext = sensor("1122333344", "13");
        let mut journal = finished_journal(Vec::new());
        journal.flags.remove(StateFlags::SENSOR_EXPLICIT_END);
        assert!(!amend(&mut journal, &ext, false));
        assert!(!journal.is_amend_checked());
    }

    #[test]
    fn test_active_sensor_record_is_skipped() {
        let mut ext = sensor("1122333344", "13");
        ext.end_reason = EndReason::Active;
        let mut journal = finished_journal(Vec::new());
        assert!(!amend(&mut journal, &ext, true));
        assert!(!journal.is_amend_checked());
    }

    #[test]
    fn test_malformed_series_only_marks_checked() {
        let mut ext = sensor("1122333344", "13");
        ext.display.epoch_secs = 60;
        let mut journal = finished_journal(vec![Event::new(
            LifeStage::InBed,
            t0(),
            EventKind::GotIntoBed,
        )]);
        assert!(amend(&mut journal, &ext, false));
        assert!(journal.is_amend_checked());
        assert!(!journal.is_amended());
        assert!(journal.amendment.is_none());
    }

    #[test]
    fn test_quality_score_rounds() {
        let amendment = Amendment {
            total_sleep_min: 420.0,
            rem_min: 90.0,
            deep_min: 60.0,
            awake_min: 20.0,
            awakenings: 2,
            ..Amendment::default()
        };
        // 8.5 * (7 + 0.75 + 1.5 - 0.1667 - 0.1333) = 76.075
        assert_eq!(quality_score(&amendment), 76);
    }
}
