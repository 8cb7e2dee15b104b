use tracing::warn;

use crate::model::*;

use super::store::Store;

/// Counter movement produced by one occupancy diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerDelta {
    pub released: Option<StaffId>,
    pub credited: Option<StaffId>,
}

impl LedgerDelta {
    /// Moving a slot between two labels of the same person is not a rotation.
    pub fn between(old: Option<StaffId>, new: Option<StaffId>) -> Self {
        if old.is_some() && old == new {
            return Self::default();
        }
        Self {
            released: old,
            credited: new,
        }
    }
}

impl Store {
    pub(super) fn counter(&self, staff_id: StaffId, room: RoomId) -> u32 {
        self.counters
            .get(&staff_id)
            .map_or(0, |row| row.value().get(room))
    }

    pub(super) fn counter_row(&self, staff_id: StaffId) -> Option<RotationCounter> {
        self.counters.get(&staff_id).map(|row| row.value().clone())
    }

    pub(super) fn has_counter_row(&self, staff_id: StaffId) -> bool {
        self.counters.contains_key(&staff_id)
    }

    pub(super) fn counter_rows(&self) -> Vec<RotationCounter> {
        let mut rows: Vec<_> = self.counters.iter().map(|e| e.value().clone()).collect();
        rows.sort_by_key(|r| r.staff_id);
        rows
    }

    fn increment(&self, staff_id: StaffId, room: RoomId) {
        self.counters
            .entry(staff_id)
            .or_insert_with(|| RotationCounter::new(staff_id))
            .increment(room);
    }

    fn decrement_floored(&self, staff_id: StaffId, room: RoomId) {
        let clamped = !self
            .counters
            .entry(staff_id)
            .or_insert_with(|| RotationCounter::new(staff_id))
            .decrement_floored(room);
        if clamped {
            metrics::counter!(crate::observability::CLAMPED_DECREMENTS_TOTAL).increment(1);
            warn!(staff_id, %room, "rotation counter already at zero, decrement clamped");
        }
    }

    /// Apply the counter side of an event. Slot contents are applied separately.
    pub(super) fn apply_ledger(&self, event: &Event) {
        match event {
            Event::SlotReconciled {
                room,
                released,
                credited,
                ..
            } => {
                if let Some(id) = released {
                    self.decrement_floored(*id, *room);
                }
                if let Some(id) = credited {
                    self.increment(*id, *room);
                }
            }
            Event::CounterRowEnsured { staff_id } => {
                self.counters
                    .entry(*staff_id)
                    .or_insert_with(|| RotationCounter::new(*staff_id));
            }
            Event::CounterRowDropped { staff_id } => {
                self.counters.remove(staff_id);
            }
            Event::CounterRestored { staff_id, counts } => {
                self.counters.insert(
                    *staff_id,
                    RotationCounter {
                        staff_id: *staff_id,
                        counts: *counts,
                    },
                );
            }
            Event::Reset { staff_ids } => {
                self.counters.clear();
                for &id in staff_ids {
                    self.counters.insert(id, RotationCounter::new(id));
                }
            }
            Event::DayCreated { .. } | Event::SlotRestored { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reconciled(room: RoomId, released: Option<StaffId>, credited: Option<StaffId>) -> Event {
        Event::SlotReconciled {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            room,
            occupant: None,
            state: RoomState::Open,
            released,
            credited,
        }
    }

    #[test]
    fn same_identity_moves_nothing() {
        assert_eq!(LedgerDelta::between(Some(3), Some(3)), LedgerDelta::default());
        assert_eq!(LedgerDelta::between(None, None), LedgerDelta::default());
        let d = LedgerDelta::between(Some(3), Some(4));
        assert_eq!((d.released, d.credited), (Some(3), Some(4)));
    }

    #[test]
    fn increment_creates_missing_row() {
        let store = Store::default();
        assert!(!store.has_counter_row(1));
        store.apply_ledger(&reconciled(RoomId::Salle16, None, Some(1)));
        assert_eq!(store.counter(1, RoomId::Salle16), 1);
    }

    #[test]
    fn decrement_clamps_and_repairs_row() {
        let store = Store::default();
        store.apply_ledger(&reconciled(RoomId::Salle19, Some(2), None));
        assert!(store.has_counter_row(2));
        assert_eq!(store.counter(2, RoomId::Salle19), 0);
    }

    #[test]
    fn swap_moves_one_unit() {
        let store = Store::default();
        store.apply_ledger(&reconciled(RoomId::Reveil1, None, Some(1)));
        store.apply_ledger(&reconciled(RoomId::Reveil1, Some(1), Some(2)));
        assert_eq!(store.counter(1, RoomId::Reveil1), 0);
        assert_eq!(store.counter(2, RoomId::Reveil1), 1);
    }

    #[test]
    fn reset_seeds_zero_rows() {
        let store = Store::default();
        store.apply_ledger(&reconciled(RoomId::Salle16, None, Some(9)));
        store.apply_ledger(&Event::Reset { staff_ids: vec![1, 2] });
        assert!(!store.has_counter_row(9));
        let ids: Vec<_> = store.counter_rows().iter().map(|r| r.staff_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
