//! The reconciliation engine.
//!
//! `JournalCoordinator` owns the daypoint window and reconciles it against
//! the sensor subsystem and the journal store. Every entry point runs to
//! completion on the caller's thread and leaves the window valid; storage
//! failures are logged and the next `resynchronize` corrects what was lost.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use super::amend::amend;
use super::clock::{Clock, SystemClock};
use super::daypoint::{DaypointWindow, Slot};
use super::history::{build_history, find_external, HistoryQuery};
use super::status::StatusView;
use super::transitions::{plan_probe, plan_transition, ProbeAction, SyncAction};
use crate::config::{Config, ConfigError, WindowPolicy};
use crate::notify::{UiNotifier, UiSignal};
use crate::record::{
    AttributeDef, Event, EventKind, IntegratedRecord, JournalId, JournalRecord, LifeStage,
    SensorRecordId, StateFlags,
};
use crate::sensor::{SensorSource, SensorState};
use crate::store::{JournalStore, SortOrder};

const NO_PRIOR_SESSION: &str = "No immediately prior sleep session is available";

/// Tunables of the engine, usually taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub policy: WindowPolicy,
    pub duplicate_window: Duration,
    pub tz: Tz,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            policy: WindowPolicy::default(),
            duplicate_window: Duration::seconds(60),
            tz: chrono_tz::UTC,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            policy: config.window,
            duplicate_window: config.duplicate_window(),
            tz: config.tz()?,
        })
    }
}

/// Save `record`, logging instead of propagating failures.
fn persist<S: JournalStore + ?Sized>(store: &mut S, record: &mut JournalRecord) {
    if let Err(e) = store.save_journal(record) {
        tracing::error!(
            journal_id = ?record.id,
            sensor_id = ?record.sensor_link,
            error = %e,
            "Failed to save journal record"
        );
    }
}

pub struct JournalCoordinator<S, Z> {
    window: DaypointWindow,
    store: S,
    sensor: Z,
    notifier: UiNotifier,
    clock: Box<dyn Clock>,
    settings: EngineSettings,
}

impl<S: JournalStore, Z: SensorSource> JournalCoordinator<S, Z> {
    pub fn new(store: S, sensor: Z, notifier: UiNotifier, settings: EngineSettings) -> Self {
        Self::with_clock(store, sensor, notifier, settings, SystemClock)
    }

    pub fn with_clock(
        store: S,
        sensor: Z,
        notifier: UiNotifier,
        settings: EngineSettings,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            window: DaypointWindow::new(),
            store,
            sensor,
            notifier,
            clock: Box::new(clock),
            settings,
        }
    }

    pub fn window(&self) -> &DaypointWindow {
        &self.window
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn sensor(&self) -> &Z {
        &self.sensor
    }

    /// Mutable access for drivers that feed the sensor; follow up with
    /// [`on_state_changed`](Self::on_state_changed) or
    /// [`on_probed_same_state`](Self::on_probed_same_state).
    pub fn sensor_mut(&mut self) -> &mut Z {
        &mut self.sensor
    }

    pub fn notifier(&self) -> &UiNotifier {
        &self.notifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Status strings and summaries for the UI.
    pub fn status(&self) -> StatusView<'_, Z> {
        StatusView::new(&self.window, &self.sensor, self.settings.tz)
    }

    // ---- window maintenance ----

    /// Purge stale slots, recover from storage when the window is empty,
    /// then line the window up with the live sensor state.
    pub fn resynchronize(&mut self) {
        let now = self.clock.now();
        self.purge_expired(now);
        if self.window.is_empty() {
            self.recover(now);
        }
        self.reconcile_with_sensor();
    }

    /// Sensor link of the live session, if the sensor is past Idle.
    fn live_link(&self) -> Option<SensorRecordId> {
        if self.sensor.state() > SensorState::Idle {
            self.sensor.active_record_id()
        } else {
            None
        }
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.settings.policy.purge_after();
        let live = self.live_link();
        for slot in Slot::ALL {
            let expired = self.window.get(slot).is_some_and(|r| {
                r.started_at <= cutoff && (live.is_none() || r.sensor_link != live)
            });
            if !expired {
                continue;
            }
            if let Some(record) = self.window.evict(slot) {
                tracing::debug!(slot = slot.label(), journal_id = ?record.id, "Purged expired record");
            }
            if self.window.cursor() == slot {
                self.notifier.notify(UiSignal::RefreshAll);
            }
        }
    }

    /// Cold-start recovery of the window from storage.
    fn recover(&mut self, now: DateTime<Utc>) {
        let policy = self.settings.policy;
        let after = now - policy.recovery_window();
        let recent = now - policy.recent_window();

        let candidates = match self.store.journal_after(Some(after), SortOrder::Descending) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load journal records for recovery");
                return;
            }
        };

        for record in candidates {
            if record.is_unlinked_and_dead() {
                continue;
            }
            let dead_sensor_only = record.is_sensor_dead() && record.is_sensor_only();

            if record.started_at > now {
                let slot = if record.sensor_link.is_some() || record.has_events() {
                    Slot::Current
                } else {
                    Slot::Future
                };
                self.place_recovered(slot, record);
                continue;
            }

            if record.started_at >= recent {
                if record.is_ended() {
                    if dead_sensor_only {
                        continue;
                    }
                    self.place_recovered(Slot::Prior, record);
                    break;
                }
                let active = record.sensor_link.is_some()
                    || record
                        .flags
                        .intersects(StateFlags::SENSOR_RECORDED | StateFlags::JOURNAL_EXPLICIT_START);
                if !active || !self.window.is_occupied(Slot::Current) {
                    self.place_recovered(Slot::Current, record);
                    continue;
                }
                self.place_recovered(Slot::Prior, record);
                break;
            }

            if dead_sensor_only {
                tracing::debug!(journal_id = ?record.id, "Skipping dead sensor-only record");
                continue;
            }
            self.place_recovered(Slot::Prior, record);
            break;
        }
    }

    /// Newest records are seen first; an occupied slot is never replaced.
    fn place_recovered(&mut self, slot: Slot, record: JournalRecord) {
        if self.window.is_occupied(slot) {
            tracing::debug!(slot = slot.label(), journal_id = ?record.id, "Slot taken; skipping recovered record");
            return;
        }
        tracing::info!(slot = slot.label(), journal_id = ?record.id, "Recovered journal record");
        self.window.put(slot, record);
    }

    /// Correct slot placement against the sensor after recovery.
    fn reconcile_with_sensor(&mut self) {
        let state = self.sensor.state();
        if state <= SensorState::Idle {
            return;
        }

        let Some(active) = self.sensor.active_record_id() else {
            let pending = Slot::ALL.into_iter().find(|s| {
                self.window
                    .get(*s)
                    .is_some_and(|r| r.content_summary().is_pending_start())
            });
            let Some(slot) = pending else {
                tracing::debug!(?state, "No pending start to reconcile");
                return;
            };
            match slot {
                Slot::Prior => {
                    self.window.promote_prior();
                }
                Slot::Future => {
                    self.window.shift_forward();
                }
                Slot::Current => {}
            }
            if slot != Slot::Current {
                tracing::info!(from = slot.label(), "Re-seated pending start in current");
            }
            self.sync_record(Slot::Current, false, false);
            return;
        };

        match self.window.slot_linked_to(active) {
            Some(Slot::Prior) => {
                let concluded = state == SensorState::Ending
                    || self
                        .window
                        .get(Slot::Prior)
                        .is_some_and(|r| r.flags.contains(StateFlags::JOURNAL_EXPLICIT_END));
                if concluded {
                    self.sync_record(Slot::Prior, false, false);
                } else {
                    tracing::info!(sensor_id = active, "Promoting linked prior record to current");
                    self.window.promote_prior();
                    self.sync_record(Slot::Current, false, false);
                }
            }
            Some(Slot::Current) => self.sync_record(Slot::Current, false, false),
            Some(Slot::Future) => {
                tracing::info!(sensor_id = active, "Shifting linked future record to current");
                self.window.shift_forward();
                self.sync_record(Slot::Current, false, false);
            }
            None => self.sync_current_to_sensor(false, false),
        }
    }

    /// Make the live sensor record sit in `current`, creating or recovering
    /// its journal record as needed, then sync it.
    fn sync_current_to_sensor(&mut self, is_change: bool, inject: bool) {
        let state = self.sensor.state();
        if state <= SensorState::Idle {
            tracing::debug!(?state, "Sensor idle; nothing to align");
            return;
        }
        let Some(active) = self.sensor.active_record_id() else {
            tracing::debug!(?state, "No active sensor record to align");
            return;
        };
        let resumed = is_change && state.is_live();

        match self.window.slot_linked_to(active) {
            Some(Slot::Current) => {}
            Some(Slot::Prior) if resumed => {
                tracing::info!(sensor_id = active, "Sensor resumed; promoting prior record");
                self.window.promote_prior();
                self.window.set_cursor(Slot::Current);
                self.reopen_current();
                self.notifier.notify(UiSignal::RefreshAll);
            }
            Some(Slot::Prior) => {
                self.sync_record(Slot::Prior, is_change, inject);
                return;
            }
            Some(Slot::Future) => {
                tracing::info!(sensor_id = active, "Shifting linked future record to current");
                self.window.shift_forward();
                self.notifier.notify(UiSignal::RefreshAll);
            }
            None => match self.store.journal_linked_to(active) {
                Ok(Some(record)) => {
                    tracing::info!(sensor_id = active, journal_id = ?record.id, "Re-seating stored record in current");
                    self.window.seat_current(record);
                    self.window.set_cursor(Slot::Current);
                    if resumed {
                        self.reopen_current();
                    }
                    self.notifier.notify(UiSignal::RefreshAll);
                }
                Ok(None) => self.link_new(active),
                Err(e) => {
                    tracing::error!(sensor_id = active, error = %e, "Failed to look up linked journal record");
                    return;
                }
            },
        }

        self.sync_record(Slot::Current, is_change, inject);
    }

    fn reopen_current(&mut self) {
        if let Some(record) = self.window.get_mut(Slot::Current) {
            record.flags.remove(StateFlags::SENSOR_EXPLICIT_END);
            record.sensor_ending_at = None;
        }
    }

    /// Link a never-seen sensor record to `current`.
    fn link_new(&mut self, active: SensorRecordId) {
        let cursor = self.window.cursor();
        let now = self.clock.now();

        match self.window.get(Slot::Current) {
            None => match self.window.evict(Slot::Future) {
                Some(staged) => {
                    self.window.put(Slot::Current, staged);
                    if cursor >= Slot::Current {
                        self.notifier.notify(UiSignal::RefreshAll);
                    }
                }
                None => {
                    self.window.put(Slot::Current, JournalRecord::new(now));
                    if cursor == Slot::Current {
                        self.notifier.notify(UiSignal::RefreshAll);
                    }
                }
            },
            Some(record) if record.sensor_link.is_none() => {}
            Some(_) => {
                self.window.seat_current(JournalRecord::new(now));
                if cursor >= Slot::Current {
                    self.notifier.notify(UiSignal::RefreshAll);
                }
            }
        }

        if let Some(record) = self.window.get_mut(Slot::Current) {
            record.sensor_link = Some(active);
            tracing::info!(sensor_id = active, journal_id = ?record.id, "Linked current record to sensor");
        }
    }

    /// Write the sensor state into the record in `slot`.
    ///
    /// `is_change` is set for real transitions; `inject` adds the sensor
    /// marker for the transition.
    fn sync_record(&mut self, slot: Slot, is_change: bool, inject: bool) {
        let now = self.clock.now();
        let state = self.sensor.state();
        let Self {
            window,
            store,
            sensor,
            ..
        } = self;
        let Some(record) = window.get_mut(slot) else {
            tracing::debug!(slot = slot.label(), "No record to sync");
            return;
        };

        match state {
            SensorState::Unknown => {}
            SensorState::Starting => {
                if inject {
                    record.annotate_sensor(EventKind::SensorStarting, now);
                }
            }
            SensorState::Recording => {
                record.flags.insert(StateFlags::SENSOR_RECORDED);
                if inject {
                    record.annotate_sensor(EventKind::SensorRecording, now);
                }
                persist(store, record);
            }
            SensorState::Ending | SensorState::Idle => {
                if state == SensorState::Ending {
                    record.flags.insert(StateFlags::SENSOR_EXPLICIT_END);
                    if inject {
                        record.annotate_sensor(EventKind::SensorEnding, now);
                    }
                }
                if let Some(link) = record.sensor_link.filter(|_| is_change) {
                    match find_external(&*store, &*sensor, link) {
                        Some(external) if external.has_sleep() || external.is_active() => {
                            amend(record, &external, true);
                            record.flags.remove(StateFlags::SENSOR_DEAD);
                        }
                        Some(_) => {
                            tracing::info!(sensor_id = link, "Sensor record has no sleep; marking dead");
                            record.flags.insert(StateFlags::SENSOR_DEAD);
                        }
                        None => {
                            tracing::debug!(sensor_id = link, "Linked sensor record not found");
                        }
                    }
                }
                persist(store, record);
            }
        }
    }

    // ---- sensor notifications ----

    /// The sensor moved to a new state.
    pub fn on_state_changed(&mut self) {
        let state = self.sensor.state();
        let prior = self.sensor.prior_state();
        let active = self.sensor.active_record_id();
        let action = plan_transition(state, prior, active.is_some());
        tracing::debug!(?state, ?prior, sensor_id = ?active, ?action, "Sensor state changed");

        match action {
            SyncAction::Ignore => {}
            SyncAction::AlignToSensor => self.sync_current_to_sensor(true, true),
            SyncAction::StageStart => {
                self.get_or_create(Slot::Current);
                self.sync_record(Slot::Current, true, true);
            }
            SyncAction::ConcludeEnding => self.conclude_ending(active),
            SyncAction::SettleIdle { finalize_prior } => self.settle_idle(finalize_prior),
        }
    }

    fn conclude_ending(&mut self, active: Option<SensorRecordId>) {
        let Some(slot) = active.and_then(|id| self.window.slot_linked_to(id)) else {
            tracing::debug!(sensor_id = ?active, "Ending without a linked record");
            return;
        };
        self.sync_record(slot, true, true);
        if slot == Slot::Current {
            self.shift_forward();
        }
    }

    fn settle_idle(&mut self, finalize_prior: bool) {
        if finalize_prior {
            if self.window.is_occupied(Slot::Prior) {
                self.sync_record(Slot::Prior, true, false);
                let dead = self
                    .window
                    .get(Slot::Prior)
                    .is_some_and(|r| r.is_sensor_dead() && r.is_sensor_only());
                if dead {
                    if let Some(record) = self.window.evict(Slot::Prior) {
                        tracing::info!(journal_id = ?record.id, sensor_id = ?record.sensor_link, "Evicted dead prior record");
                    }
                    if self.window.cursor() == Slot::Prior {
                        self.notifier.notify(UiSignal::RefreshAll);
                    }
                }
            }
            self.sensor.clear_prior_state();
        }

        let aborted = self
            .window
            .get(Slot::Current)
            .filter(|r| r.content_summary().is_aborted_attempt())
            .map(|r| r.id);
        let Some(id) = aborted else {
            return;
        };
        if let Some(id) = id {
            if let Err(e) = self.store.delete_journal(id) {
                tracing::error!(journal_id = id, error = %e, "Failed to delete aborted record");
            }
        }
        self.window.evict(Slot::Current);
        tracing::info!(journal_id = ?id, "Discarded aborted recording attempt");
        if self.window.cursor() == Slot::Current {
            self.notifier.notify(UiSignal::RefreshAll);
        }
    }

    /// The sensor was probed and its state had not changed.
    pub fn on_probed_same_state(&mut self) {
        let action = plan_probe(self.sensor.state(), self.sensor.active_record_id().is_some());
        if action != ProbeAction::RefreshBattery {
            return;
        }
        let battery = self.sensor.battery_extremes();
        let Self { window, store, .. } = self;
        if let Some(record) = window.get_mut(Slot::Current) {
            if record.battery != battery {
                record.battery = battery;
                persist(store, record);
            }
        }
    }

    /// A journal record was deleted from storage by someone else.
    pub fn on_record_deleted(&mut self, id: JournalId) {
        if let Some(slot) = self.window.slot_with_id(id) {
            self.window.evict(slot);
            tracing::info!(journal_id = id, slot = slot.label(), "Evicted deleted record");
        }
        self.resynchronize();
        self.notifier.notify(UiSignal::RefreshStatus);
    }

    // ---- window operations ----

    /// The record in `slot`, created when absent. `current` first reuses a
    /// staged `future` record.
    pub fn get_or_create(&mut self, slot: Slot) -> &mut JournalRecord {
        if !self.window.is_occupied(slot) {
            let staged = match slot {
                Slot::Current => self.window.evict(Slot::Future),
                _ => None,
            };
            match staged {
                Some(record) => {
                    tracing::debug!(journal_id = ?record.id, "Reusing staged future record");
                    self.window.put(slot, record);
                }
                None => self.notifier.notify(UiSignal::RefreshStatus),
            }
        }
        let now = self.clock.now();
        self.window.get_or_insert_with(slot, || JournalRecord::new(now))
    }

    /// Conclude tonight: evict `prior`, move everything one slot back and
    /// leave the cursor on the concluded night.
    pub fn shift_forward(&mut self) {
        if let Some(evicted) = self.window.shift_forward() {
            tracing::debug!(journal_id = ?evicted.id, "Evicted prior record on shift");
        }
        self.window.set_cursor(Slot::Prior);
        self.notifier.notify(UiSignal::RefreshAll);
    }

    pub fn step_cursor_back(&mut self) -> bool {
        let moved = self.window.step_cursor_back();
        self.notifier.notify(UiSignal::RefreshAll);
        moved
    }

    pub fn step_cursor_forward(&mut self) -> bool {
        let moved = self.window.step_cursor_forward();
        self.notifier.notify(UiSignal::RefreshAll);
        moved
    }

    // ---- journal entry ----

    /// Why entries of `stage` are refused at the cursor, if they are.
    pub fn stage_entry_block(&self, stage: LifeStage) -> Option<&'static str> {
        match (self.window.cursor(), stage) {
            (Slot::Current, _) => None,
            (Slot::Prior, _) if !self.window.is_occupied(Slot::Prior) => Some(NO_PRIOR_SESSION),
            (Slot::Prior, LifeStage::InBed | LifeStage::Going | LifeStage::During) => {
                Some("Entry of Events for past sleep sessions is not allowed")
            }
            (Slot::Prior, _) => None,
            (Slot::Future, LifeStage::Before) => {
                Some("Entry of Before Attributes for future sleep sessions is not allowed")
            }
            (Slot::Future, LifeStage::After) => {
                Some("Entry of After Events or Attributes for future sleep sessions is not allowed")
            }
            (Slot::Future, _) => {
                Some("Entry of Going or During Events for future sleep sessions is not allowed")
            }
        }
    }

    pub fn done_sleeping_enabled(&self) -> bool {
        self.window.cursor() == Slot::Current
    }

    /// Record a journal event at the cursor. Returns false when the entry
    /// is refused or repeats a recent event of the same kind.
    pub fn record_event(&mut self, stage: LifeStage, kind: EventKind, info: Option<&str>) -> bool {
        if kind.is_sensor_marker() {
            tracing::debug!(?kind, "Sensor markers are not journal entries");
            return false;
        }
        if let Some(reason) = self.stage_entry_block(stage) {
            tracing::debug!(?stage, reason, "Event refused");
            return false;
        }
        if kind == EventKind::DoneSleeping && !self.done_sleeping_enabled() {
            tracing::debug!("Done sleeping only applies to tonight");
            return false;
        }

        let now = self.clock.now();
        let slot = self.window.cursor();
        let duplicate_window = self.settings.duplicate_window;
        let event = match info {
            Some(info) => Event::new(stage, now, kind).with_info(info),
            None => Event::new(stage, now, kind),
        };

        let record = self.get_or_create(slot);
        if !record.try_store_event(event, duplicate_window) {
            tracing::debug!(?kind, journal_id = ?record.id, "Rejected near-duplicate event");
            return false;
        }
        match kind {
            EventKind::GotIntoBed | EventKind::GoingToSleep => {
                record.flags.insert(StateFlags::JOURNAL_EXPLICIT_START);
            }
            EventKind::DoneSleeping => {
                record.flags.insert(StateFlags::JOURNAL_EXPLICIT_END);
                record.ended_at = Some(now);
            }
            _ => {}
        }

        if kind == EventKind::DoneSleeping {
            self.amend_slot(slot, true);
        }
        self.save_slot(slot);
        if kind == EventKind::DoneSleeping && slot == Slot::Current {
            self.shift_forward();
        }
        self.notifier.notify(UiSignal::RefreshStatus);
        true
    }

    /// Store an attribute value at the cursor. An After attribute also
    /// marks the night ended.
    pub fn record_attribute(&mut self, def: &AttributeDef, value: &str, likert: f32) -> bool {
        if let Some(reason) = self.stage_entry_block(def.stage) {
            tracing::debug!(attribute = %def.name, reason, "Attribute refused");
            return false;
        }
        let now = self.clock.now();
        let slot = self.window.cursor();
        let record = self.get_or_create(slot);
        record.store_attribute(def, value, likert);
        if def.stage == LifeStage::After {
            record.ended_at = Some(now);
        }
        self.save_slot(slot);
        self.notifier.notify(UiSignal::RefreshStatus);
        true
    }

    pub fn remove_attribute(&mut self, def: &AttributeDef) -> bool {
        let slot = self.window.cursor();
        let removed = self
            .window
            .get_mut(slot)
            .is_some_and(|record| record.remove_attribute(def));
        if removed {
            self.save_slot(slot);
            self.notifier.notify(UiSignal::RefreshStatus);
        }
        removed
    }

    pub fn attribute_value(&self, def: &AttributeDef) -> Option<String> {
        self.window
            .active()
            .and_then(|record| record.attribute_value(def))
            .map(str::to_string)
    }

    fn save_slot(&mut self, slot: Slot) {
        let Self { window, store, .. } = self;
        if let Some(record) = window.get_mut(slot) {
            persist(store, record);
        }
    }

    /// Amend the record in `slot` against its linked sensor record.
    fn amend_slot(&mut self, slot: Slot, recheck: bool) -> bool {
        let Self {
            window,
            store,
            sensor,
            ..
        } = self;
        let Some(record) = window.get_mut(slot) else {
            return false;
        };
        let Some(link) = record.sensor_link else {
            return false;
        };
        match find_external(&*store, &*sensor, link) {
            Some(external) => amend(record, &external, recheck),
            None => {
                tracing::debug!(sensor_id = link, "No sensor record to amend against");
                false
            }
        }
    }

    /// Amend the record under the cursor and save it if it changed.
    pub fn amend_active(&mut self, recheck: bool) -> bool {
        let slot = self.window.cursor();
        let changed = self.amend_slot(slot, recheck);
        if changed {
            self.save_slot(slot);
            self.notifier.notify(UiSignal::RefreshStatus);
        }
        changed
    }

    // ---- history ----

    pub fn history(&self, query: &HistoryQuery) -> Vec<IntegratedRecord> {
        build_history(&self.store, &self.sensor, query)
    }

    /// Pair a linked journal record with its sensor record.
    pub fn integrated_for(&self, record: &JournalRecord) -> Option<IntegratedRecord> {
        let link = record.sensor_link?;
        let mut integrated = IntegratedRecord::from_journal(record.clone());
        if let Some(external) = find_external(&self.store, &self.sensor, link) {
            integrated.pair(external);
        }
        integrated.timestamp = record.started_at;
        Some(integrated)
    }

    /// Reload both halves of `integrated` from their sources.
    pub fn refresh_integrated(&self, integrated: &mut IntegratedRecord) {
        if let Some(id) = integrated.journal_id() {
            match self.store.journal_by_id(id) {
                Ok(Some(journal)) => integrated.journal = Some(journal),
                Ok(None) => integrated.journal = None,
                Err(e) => tracing::error!(journal_id = id, error = %e, "Failed to reload journal record"),
            }
        }
        if let Some(link) = integrated.link() {
            if let Some(external) = find_external(&self.store, &self.sensor, link) {
                integrated.external = Some(external);
            }
        }
    }

    /// Give a sensor-only history entry its own saved journal record.
    pub fn attach_journal(&mut self, integrated: &mut IntegratedRecord) -> Option<JournalId> {
        if integrated.journal.is_some() {
            return integrated.journal_id();
        }
        let external = integrated.external.as_ref()?;
        match self.store.journal_linked_to(external.id) {
            Ok(Some(existing)) => {
                tracing::debug!(journal_id = ?existing.id, sensor_id = external.id, "Reusing linked journal record");
                let id = existing.id;
                integrated.journal = Some(existing);
                return id;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(sensor_id = external.id, error = %e, "Failed to look up linked journal record");
                return None;
            }
        }
        let mut journal = JournalRecord::new(external.start_of_night);
        journal.sensor_link = Some(external.id);
        match self.store.save_journal(&mut journal) {
            Ok(id) => {
                tracing::info!(journal_id = id, sensor_id = external.id, "Attached journal record");
                integrated.journal = Some(journal);
                Some(id)
            }
            Err(e) => {
                tracing::error!(sensor_id = external.id, error = %e, "Failed to attach journal record");
                None
            }
        }
    }

    /// Amend a history entry, saving it and refreshing any window copy.
    pub fn amend_integrated(&mut self, integrated: &mut IntegratedRecord, recheck: bool) -> bool {
        let link = integrated.link();
        let (Some(journal), Some(external)) = (integrated.journal.as_mut(), integrated.external.as_ref())
        else {
            tracing::debug!(sensor_id = ?link, "History entry is not paired; not amending");
            return false;
        };
        if !amend(journal, external, recheck) {
            return false;
        }
        persist(&mut self.store, journal);
        if let Some(slot) = journal.id.and_then(|id| self.window.slot_with_id(id)) {
            if let Some(held) = self.window.get_mut(slot) {
                *held = journal.clone();
            }
        }
        true
    }
}
