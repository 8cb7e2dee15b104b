use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::future::join_all;

use crate::detect;
use crate::limits::MAX_RANGE_DAYS;
use crate::model::*;
use crate::observability::timed;

use super::{Engine, EngineError};

impl Engine {
    /// Snapshot of a day, or None if nothing was ever written for it.
    pub async fn day(&self, date: NaiveDate) -> Result<Option<DaySchedule>, EngineError> {
        match self.store.day(&date) {
            Some(day) => Ok(Some(self.read_day(&day).await?)),
            None => Ok(None),
        }
    }

    /// Day grid with duplicate and unavailable rooms flagged. A missing day
    /// is reported as empty and open, with `exists` false.
    pub async fn day_view(&self, date: NaiveDate) -> Result<DayView, EngineError> {
        timed("day_view", self.day_view_inner(date)).await
    }

    async fn day_view_inner(&self, date: NaiveDate) -> Result<DayView, EngineError> {
        Ok(match self.day(date).await? {
            Some(day) => detect::day_view(&day, true),
            None => detect::day_view(&DaySchedule::empty(date), false),
        })
    }

    /// Existing days in `[start, end]`, ascending.
    pub async fn days_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayView>, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        if (end - start).num_days() + 1 > MAX_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let days = self.store.days_in(start, end);
        let snapshots = join_all(days.iter().map(|d| self.read_day(d))).await;
        snapshots
            .into_iter()
            .map(|d| d.map(|d| detect::day_view(&d, true)))
            .collect()
    }

    pub async fn room_states(&self, date: NaiveDate) -> Result<BTreeMap<RoomId, RoomState>, EngineError> {
        let day = self.day(date).await?.unwrap_or_else(|| DaySchedule::empty(date));
        Ok(RoomId::ALL.into_iter().map(|room| (room, day.slot(room).state)).collect())
    }

    pub async fn slot_occupant(&self, date: NaiveDate, room: RoomId) -> Result<Option<String>, EngineError> {
        Ok(self.read_slot(date, room).await?.and_then(|slot| slot.occupant))
    }

    pub async fn slot_state(&self, date: NaiveDate, room: RoomId) -> Result<RoomState, EngineError> {
        Ok(self.read_slot(date, room).await?.map_or(RoomState::Open, |slot| slot.state))
    }

    /// Is this person free on `date`? A slot equal to `exclude` doesn't count,
    /// so a caller can ask "can I keep them where they are".
    pub async fn check_availability(
        &self,
        who: StaffRef,
        date: NaiveDate,
        exclude: Option<RoomId>,
    ) -> Result<AvailabilityReport, EngineError> {
        timed("check_availability", self.check_availability_inner(who, date, exclude)).await
    }

    async fn check_availability_inner(
        &self,
        who: StaffRef,
        date: NaiveDate,
        exclude: Option<RoomId>,
    ) -> Result<AvailabilityReport, EngineError> {
        let label = match who {
            StaffRef::Label(label) => label.trim().to_string(),
            StaffRef::Staff(id) => self
                .ask_roster(self.roster.get_staff(id))
                .await?
                .ok_or(EngineError::UnknownStaff(id))?
                .label(),
        };
        let Some(day) = self.day(date).await? else {
            return Ok(AvailabilityReport {
                available: true,
                assigned_room: None,
                occupied_rooms: Vec::new(),
                blocked_rooms: Vec::new(),
            });
        };

        let holding = if label.is_empty() {
            Vec::new()
        } else {
            detect::rooms_holding(&day, &label)
        };
        let assigned_room = holding.first().copied();
        let occupied_rooms: Vec<RoomId> = holding.into_iter().filter(|room| Some(*room) != exclude).collect();

        Ok(AvailabilityReport {
            available: occupied_rooms.is_empty(),
            assigned_room,
            occupied_rooms,
            blocked_rooms: detect::unavailable_rooms(&day).into_iter().collect(),
        })
    }

    pub fn counter(&self, staff_id: StaffId, room: RoomId) -> u32 {
        self.store.counter(staff_id, room)
    }

    pub fn counter_row(&self, staff_id: StaffId) -> Option<RotationCounter> {
        self.store.counter_row(staff_id)
    }

    /// One row per roster member ordered by (given name, surname). Members
    /// without a counter row report zeros.
    pub async fn statistics(&self) -> Result<Vec<StaffStatistics>, EngineError> {
        let mut staff = self.ask_roster(self.roster.list_staff()).await?;
        staff.sort_by(|a, b| (&a.given_name, &a.surname).cmp(&(&b.given_name, &b.surname)));
        Ok(staff
            .into_iter()
            .map(|s| StaffStatistics {
                staff_id: s.id,
                label: s.label(),
                counts: self.store.counter_row(s.id).map_or([0; ROOM_COUNT], |row| row.counts),
            })
            .collect())
    }

    pub fn day_count(&self) -> usize {
        self.store.day_count()
    }
}
