use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::label::resolve;
use crate::limits::MAX_LABEL_LEN;
use crate::model::*;
use crate::observability::{DAYS_ACTIVE, UNRESOLVED_LABELS_TOTAL, timed};

use super::diff::{OccupancyDiff, diff_occupancy, diff_state_change, normalize_label};
use super::ledger::LedgerDelta;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Put an occupant in a slot (or clear it), moving rotation counters
    /// for whoever left and whoever arrived.
    pub async fn assign(&self, date: NaiveDate, room: RoomId, target: AssignTarget) -> Result<AssignOutcome, EngineError> {
        timed("assign", self.assign_inner(date, room, target)).await
    }

    pub async fn assign_label(&self, date: NaiveDate, room: RoomId, label: &str) -> Result<AssignOutcome, EngineError> {
        self.assign(date, room, AssignTarget::Label(label.to_string())).await
    }

    async fn assign_inner(&self, date: NaiveDate, room: RoomId, target: AssignTarget) -> Result<AssignOutcome, EngineError> {
        let requested = self.requested_label(target).await?;
        let mut lease = self.lease_slot(date, room).await?;

        if !lease.state.is_open() {
            debug!(%date, %room, state = %lease.state, "assignment rejected, room not open");
            return Ok(AssignOutcome {
                date,
                room,
                occupant: None,
                previous: lease.occupant.clone(),
                warnings: Vec::new(),
                noop: true,
                blocked_by: Some(lease.state),
            });
        }

        let diff = diff_occupancy(&lease, requested.as_deref());
        if diff.is_noop() {
            return Ok(AssignOutcome {
                date,
                room,
                occupant: diff.new,
                previous: diff.old,
                warnings: Vec::new(),
                noop: true,
                blocked_by: None,
            });
        }

        let (delta, warnings) = self.resolve_delta(&diff).await?;
        let event = Event::SlotReconciled {
            date,
            room,
            occupant: diff.new.clone(),
            state: lease.state,
            released: delta.released,
            credited: delta.credited,
        };
        self.persist_and_apply(&mut lease, &event).await?;
        debug!(%date, %room, occupant = ?diff.new, previous = ?diff.old, "slot assigned");

        Ok(AssignOutcome {
            date,
            room,
            occupant: diff.new,
            previous: diff.old,
            warnings,
            noop: false,
            blocked_by: None,
        })
    }

    /// Remove the occupant of a slot. The day and the occupant must exist.
    pub async fn unassign(&self, date: NaiveDate, room: RoomId) -> Result<UnassignOutcome, EngineError> {
        timed("unassign", self.unassign_inner(date, room)).await
    }

    async fn unassign_inner(&self, date: NaiveDate, room: RoomId) -> Result<UnassignOutcome, EngineError> {
        let mut lease = self.lease_existing_slot(date, room).await?;
        let Some(removed) = lease.occupant.clone() else {
            return Err(EngineError::SlotEmpty { date, room });
        };

        let diff = OccupancyDiff {
            old: Some(removed.clone()),
            new: None,
        };
        let (delta, warnings) = self.resolve_delta(&diff).await?;
        let event = Event::SlotReconciled {
            date,
            room,
            occupant: None,
            state: lease.state,
            released: delta.released,
            credited: None,
        };
        self.persist_and_apply(&mut lease, &event).await?;
        debug!(%date, %room, %removed, "slot cleared");

        Ok(UnassignOutcome {
            date,
            room,
            removed,
            warnings,
        })
    }

    /// Open, close or retire a room for a day. Leaving the open state evicts
    /// the occupant and releases their counter in the same transition.
    pub async fn set_room_state(&self, date: NaiveDate, room: RoomId, state: RoomState) -> Result<RoomStateOutcome, EngineError> {
        timed("set_room_state", self.set_room_state_inner(date, room, state)).await
    }

    async fn set_room_state_inner(&self, date: NaiveDate, room: RoomId, state: RoomState) -> Result<RoomStateOutcome, EngineError> {
        let mut lease = self.lease_slot(date, room).await?;
        let diff = diff_state_change(&lease, state);

        if diff.is_noop() && lease.state == state {
            return Ok(RoomStateOutcome {
                date,
                room,
                state,
                cleared_occupant: None,
                warnings: Vec::new(),
                noop: true,
            });
        }

        let (delta, warnings) = if diff.is_noop() {
            (LedgerDelta::default(), Vec::new())
        } else {
            self.resolve_delta(&diff).await?
        };
        let event = Event::SlotReconciled {
            date,
            room,
            occupant: diff.new.clone(),
            state,
            released: delta.released,
            credited: delta.credited,
        };
        self.persist_and_apply(&mut lease, &event).await?;
        debug!(%date, %room, %state, "room state changed");

        let cleared_occupant = if diff.is_noop() { None } else { diff.old };
        Ok(RoomStateOutcome {
            date,
            room,
            state,
            cleared_occupant,
            warnings,
            noop: false,
        })
    }

    /// Give a roster member an all-zero counter row. Returns false when the
    /// row already existed.
    pub async fn ensure_counter_row(&self, staff_id: StaffId) -> Result<bool, EngineError> {
        timed("ensure_counter_row", self.ensure_counter_row_inner(staff_id)).await
    }

    async fn ensure_counter_row_inner(&self, staff_id: StaffId) -> Result<bool, EngineError> {
        let _gate = self.shared_gate().await?;
        if !self.ask_roster(self.roster.staff_exists(staff_id)).await? {
            return Err(EngineError::UnknownStaff(staff_id));
        }
        if self.store.has_counter_row(staff_id) {
            return Ok(false);
        }
        self.persist_ledger(&Event::CounterRowEnsured { staff_id }).await?;
        Ok(true)
    }

    /// Forget a staff member's counters. Returns false when there was no row.
    pub async fn drop_counter_row(&self, staff_id: StaffId) -> Result<bool, EngineError> {
        timed("drop_counter_row", self.drop_counter_row_inner(staff_id)).await
    }

    async fn drop_counter_row_inner(&self, staff_id: StaffId) -> Result<bool, EngineError> {
        let _gate = self.shared_gate().await?;
        if !self.store.has_counter_row(staff_id) {
            return Ok(false);
        }
        self.persist_ledger(&Event::CounterRowDropped { staff_id }).await?;
        Ok(true)
    }

    /// Clear every schedule and zero every counter, seeding one row per
    /// roster member. Waits for in-flight transitions to finish.
    pub async fn reset(&self) -> Result<ResetSummary, EngineError> {
        timed("reset", self.reset_inner()).await
    }

    async fn reset_inner(&self) -> Result<ResetSummary, EngineError> {
        let _gate = self.exclusive_gate().await?;
        let staff_ids: Vec<StaffId> = self
            .ask_roster(self.roster.list_staff())
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let counter_rows = staff_ids.len();
        let event = Event::Reset { staff_ids };

        self.wal_append(&event).await?;
        let days_cleared = self.store.clear_days();
        self.store.apply_ledger(&event);
        metrics::gauge!(DAYS_ACTIVE).set(0.0);
        self.notify.broadcast(&event);
        info!(days_cleared, counter_rows, "schedules and counters reset");

        Ok(ResetSummary {
            days_cleared,
            counter_rows,
        })
    }

    /// Rewrite the journal as the minimal event set that rebuilds current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.exclusive_gate().await?;
        let mut events = Vec::new();

        for day in self.store.all_days() {
            let snapshot = self.read_day(&day).await?;
            events.push(Event::DayCreated { date: snapshot.date });
            for room in RoomId::ALL {
                let slot = snapshot.slot(room);
                if *slot != Slot::default() {
                    events.push(Event::SlotRestored {
                        date: snapshot.date,
                        room,
                        occupant: slot.occupant.clone(),
                        state: slot.state,
                    });
                }
            }
        }
        for row in self.store.counter_rows() {
            events.push(Event::CounterRestored {
                staff_id: row.staff_id,
                counts: row.counts,
            });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        self.notify.prune();
        info!(events = count, "journal compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    async fn requested_label(&self, target: AssignTarget) -> Result<Option<String>, EngineError> {
        let label = match target {
            AssignTarget::Label(label) => normalize_label(&label),
            AssignTarget::Staff(id) => {
                let staff = self
                    .ask_roster(self.roster.get_staff(id))
                    .await?
                    .ok_or(EngineError::UnknownStaff(id))?;
                Some(staff.label())
            }
            AssignTarget::Clear => None,
        };
        if label.as_ref().is_some_and(|l| l.len() > MAX_LABEL_LEN) {
            return Err(EngineError::LimitExceeded("occupant label too long"));
        }
        Ok(label)
    }

    /// Resolve both sides of a diff to roster ids. Labels nobody matches
    /// produce warnings instead of errors.
    async fn resolve_delta(&self, diff: &OccupancyDiff) -> Result<(LedgerDelta, Vec<Warning>), EngineError> {
        let mut warnings = Vec::new();

        let old_id = match diff.old.as_deref() {
            Some(label) => {
                let id = self.ask_roster(resolve(self.roster.as_ref(), label)).await?;
                if id.is_none() {
                    warnings.push(Warning::UnresolvedPrevious { label: label.to_string() });
                }
                id
            }
            None => None,
        };
        let new_id = match diff.new.as_deref() {
            Some(label) => {
                let id = self.ask_roster(resolve(self.roster.as_ref(), label)).await?;
                if id.is_none() {
                    metrics::counter!(UNRESOLVED_LABELS_TOTAL).increment(1);
                    warn!(label, "occupant label matches no roster entry, no counter credited");
                    warnings.push(Warning::UnresolvedIdentity { label: label.to_string() });
                }
                id
            }
            None => None,
        };

        Ok((LedgerDelta::between(old_id, new_id), warnings))
    }
}
