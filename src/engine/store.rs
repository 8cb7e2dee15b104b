use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};

use crate::model::*;

pub type SharedSlot = Arc<Mutex<Slot>>;
pub type SharedDay = Arc<DayState>;

/// One day of the grid, with a lock per room.
pub struct DayState {
    pub date: NaiveDate,
    slots: [SharedSlot; ROOM_COUNT],
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self::from_schedule(DaySchedule::empty(date))
    }

    pub fn from_schedule(day: DaySchedule) -> Self {
        Self {
            date: day.date,
            slots: day.slots.map(|slot| Arc::new(Mutex::new(slot))),
        }
    }

    pub fn slot(&self, room: RoomId) -> SharedSlot {
        self.slots[room.index()].clone()
    }

    /// Copy of the whole day, each slot read under its own lock. Gives up at
    /// `deadline`; the error names the room whose lock was not free in time.
    pub async fn snapshot_until(&self, deadline: Instant) -> Result<DaySchedule, RoomId> {
        let mut day = DaySchedule::empty(self.date);
        for room in RoomId::ALL {
            let slot = timeout_at(deadline, self.slots[room.index()].lock())
                .await
                .map_err(|_| room)?;
            *day.slot_mut(room) = slot.clone();
        }
        Ok(day)
    }
}

/// Slot side of an event. Counter side lives in the ledger.
pub(super) fn apply_to_slot(slot: &mut Slot, event: &Event) {
    match event {
        Event::SlotReconciled {
            occupant, state, ..
        }
        | Event::SlotRestored {
            occupant, state, ..
        } => {
            slot.occupant = occupant.clone();
            slot.state = *state;
        }
        _ => {}
    }
}

#[derive(Default)]
pub(super) struct Store {
    days: DashMap<NaiveDate, SharedDay>,
    pub(super) counters: DashMap<StaffId, RotationCounter>,
}

impl Store {
    /// Rebuild state from a replayed journal. Days are folded as plain
    /// schedules first and only wrapped in locks at the end.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Store::default();
        let mut days: BTreeMap<NaiveDate, DaySchedule> = BTreeMap::new();
        for event in events {
            match event {
                Event::DayCreated { date } => {
                    days.entry(*date).or_insert_with(|| DaySchedule::empty(*date));
                }
                Event::SlotReconciled { date, room, .. } | Event::SlotRestored { date, room, .. } => {
                    let day = days.entry(*date).or_insert_with(|| DaySchedule::empty(*date));
                    apply_to_slot(day.slot_mut(*room), event);
                }
                Event::Reset { .. } => days.clear(),
                _ => {}
            }
            store.apply_ledger(event);
        }
        for (date, day) in days {
            store.days.insert(date, Arc::new(DayState::from_schedule(day)));
        }
        store
    }

    pub fn day(&self, date: &NaiveDate) -> Option<SharedDay> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub fn get_or_insert_day(&self, date: NaiveDate) -> SharedDay {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(DayState::new(date)))
            .value()
            .clone()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Days in `[start, end]`, ascending.
    pub fn days_in(&self, start: NaiveDate, end: NaiveDate) -> Vec<SharedDay> {
        let mut days: Vec<SharedDay> = self
            .days
            .iter()
            .filter(|e| (start..=end).contains(e.key()))
            .map(|e| e.value().clone())
            .collect();
        days.sort_by_key(|d| d.date);
        days
    }

    pub fn all_days(&self) -> Vec<SharedDay> {
        let mut days: Vec<SharedDay> = self.days.iter().map(|e| e.value().clone()).collect();
        days.sort_by_key(|d| d.date);
        days
    }

    /// Drop every day. Returns how many there were.
    pub fn clear_days(&self) -> usize {
        let n = self.days.len();
        self.days.clear();
        n
    }
}
