//! The three-slot rolling window of journal records.
//!
//! Slots are `prior` (last night), `current` (tonight) and `future` (a
//! record staged ahead of the next shift). A cursor selects the slot the UI
//! shows; it is independent of which slot holds the live sensor link.

use serde::{Deserialize, Serialize};

use crate::record::{JournalId, JournalRecord, SensorRecordId};

/// A named window position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Prior,
    Current,
    Future,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Prior, Slot::Current, Slot::Future];

    pub fn label(self) -> &'static str {
        match self {
            Slot::Prior => "prior",
            Slot::Current => "current",
            Slot::Future => "future",
        }
    }
}

/// Up to three live journal records plus the display cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct DaypointWindow {
    prior: Option<JournalRecord>,
    current: Option<JournalRecord>,
    future: Option<JournalRecord>,
    cursor: Slot,
}

impl Default for DaypointWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DaypointWindow {
    /// An empty window with the cursor on `current`.
    pub fn new() -> Self {
        Self {
            prior: None,
            current: None,
            future: None,
            cursor: Slot::Current,
        }
    }

    fn cell(&self, slot: Slot) -> &Option<JournalRecord> {
        match slot {
            Slot::Prior => &self.prior,
            Slot::Current => &self.current,
            Slot::Future => &self.future,
        }
    }

    fn cell_mut(&mut self, slot: Slot) -> &mut Option<JournalRecord> {
        match slot {
            Slot::Prior => &mut self.prior,
            Slot::Current => &mut self.current,
            Slot::Future => &mut self.future,
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&JournalRecord> {
        self.cell(slot).as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut JournalRecord> {
        self.cell_mut(slot).as_mut()
    }

    pub fn is_occupied(&self, slot: Slot) -> bool {
        self.cell(slot).is_some()
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|s| !self.is_occupied(*s))
    }

    pub fn cursor(&self) -> Slot {
        self.cursor
    }

    pub fn set_cursor(&mut self, slot: Slot) {
        self.cursor = slot;
    }

    /// Record under the cursor.
    pub fn active(&self) -> Option<&JournalRecord> {
        self.get(self.cursor)
    }

    /// Place `record` in `slot`, returning whatever it displaced.
    ///
    /// Any other slot holding the same sensor link is evicted first so a
    /// link never appears twice in the window.
    pub fn put(&mut self, slot: Slot, record: JournalRecord) -> Option<JournalRecord> {
        if let Some(link) = record.sensor_link {
            if let Some(other) = self.slot_linked_to(link).filter(|s| *s != slot) {
                self.evict(other);
            }
        }
        self.cell_mut(slot).replace(record)
    }

    /// Record in `slot`, inserting the one built by `make` when empty.
    pub fn get_or_insert_with(
        &mut self,
        slot: Slot,
        make: impl FnOnce() -> JournalRecord,
    ) -> &mut JournalRecord {
        self.cell_mut(slot).get_or_insert_with(make)
    }

    /// Remove and return the record in `slot`.
    pub fn evict(&mut self, slot: Slot) -> Option<JournalRecord> {
        self.cell_mut(slot).take()
    }

    pub fn slot_linked_to(&self, link: SensorRecordId) -> Option<Slot> {
        Slot::ALL
            .into_iter()
            .find(|s| self.get(*s).is_some_and(|r| r.is_linked_to(link)))
    }

    pub fn slot_with_id(&self, id: JournalId) -> Option<Slot> {
        Slot::ALL
            .into_iter()
            .find(|s| self.get(*s).is_some_and(|r| r.id == Some(id)))
    }

    /// Occupied slots in window order.
    pub fn records(&self) -> impl Iterator<Item = (Slot, &JournalRecord)> {
        Slot::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).map(|r| (s, r)))
    }

    /// Evict `prior`, move `current` to `prior` and `future` to `current`.
    /// Returns the evicted record. The cursor is left alone.
    pub fn shift_forward(&mut self) -> Option<JournalRecord> {
        let evicted = self.prior.take();
        self.prior = self.current.take();
        self.current = self.future.take();
        evicted
    }

    /// Move `prior` back into `current`, pushing `current` to `future`.
    /// Returns the displaced `future` record, if any.
    pub fn promote_prior(&mut self) -> Option<JournalRecord> {
        let record = self.prior.take()?;
        self.seat_current(record)
    }

    /// Seat `record` in `current`, pushing an occupant to `future`.
    /// Returns the displaced `future` record, if any.
    pub fn seat_current(&mut self, record: JournalRecord) -> Option<JournalRecord> {
        let mut displaced = None;
        if let Some(occupant) = self.current.take() {
            displaced = self.future.replace(occupant);
        }
        self.put(Slot::Current, record);
        displaced
    }

    /// Move the cursor one slot towards `prior`. Returns whether it moved.
    pub fn step_cursor_back(&mut self) -> bool {
        let next = match self.cursor {
            Slot::Prior => return false,
            Slot::Current => Slot::Prior,
            Slot::Future => Slot::Current,
        };
        self.cursor = next;
        true
    }

    /// Move the cursor one slot towards `current`. Returns whether it moved.
    pub fn step_cursor_forward(&mut self) -> bool {
        if self.cursor == Slot::Prior {
            self.cursor = Slot::Current;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(hours_ago: i64, link: Option<SensorRecordId>) -> JournalRecord {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let mut rec = JournalRecord::new(now - Duration::hours(hours_ago));
        rec.sensor_link = link;
        rec
    }

    #[test]
    fn test_shift_forward_moves_every_slot() {
        let mut window = DaypointWindow::new();
        window.put(Slot::Prior, record(30, Some(1)));
        window.put(Slot::Current, record(8, Some(2)));
        window.put(Slot::Future, record(-10, None));

        let evicted = window.shift_forward();
        assert_eq!(evicted.and_then(|r| r.sensor_link), Some(1));
        assert_eq!(window.get(Slot::Prior).and_then(|r| r.sensor_link), Some(2));
        assert!(window.get(Slot::Current).is_some());
        assert!(window.get(Slot::Future).is_none());
        assert_eq!(window.cursor(), Slot::Current);
    }

    #[test]
    fn test_put_keeps_links_unique() {
        let mut window = DaypointWindow::new();
        window.put(Slot::Prior, record(30, Some(7)));
        window.put(Slot::Current, record(2, Some(7)));
        assert!(window.get(Slot::Prior).is_none());
        assert_eq!(window.slot_linked_to(7), Some(Slot::Current));
    }

    #[test]
    fn test_promote_prior_pushes_current_to_future() {
        let mut window = DaypointWindow::new();
        window.put(Slot::Prior, record(9, Some(3)));
        window.put(Slot::Current, record(1, None));
        window.put(Slot::Future, record(-12, None));

        let displaced = window.promote_prior();
        assert!(displaced.is_some());
        assert_eq!(window.slot_linked_to(3), Some(Slot::Current));
        assert!(window.get(Slot::Prior).is_none());
        assert!(window.get(Slot::Future).is_some());
    }

    #[test]
    fn test_cursor_stays_between_prior_and_current() {
        let mut window = DaypointWindow::new();
        assert!(window.step_cursor_back());
        assert!(!window.step_cursor_back());
        assert_eq!(window.cursor(), Slot::Prior);
        assert!(window.step_cursor_forward());
        assert!(!window.step_cursor_forward());
        assert_eq!(window.cursor(), Slot::Current);
    }
}
