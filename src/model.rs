use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Roster identifier of a staff member.
pub type StaffId = i64;

pub const ROOM_COUNT: usize = 12;

/// The fixed set of room slots in a day schedule. Discriminants index the
/// per-day slot array and the per-staff counter array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomId {
    Salle16,
    Salle17,
    Salle18,
    Salle19,
    Salle20,
    Salle21,
    Salle22,
    Salle23,
    Salle24,
    Reveil1,
    Reveil2,
    Perinduction,
}

impl RoomId {
    pub const ALL: [RoomId; ROOM_COUNT] = [
        RoomId::Salle16,
        RoomId::Salle17,
        RoomId::Salle18,
        RoomId::Salle19,
        RoomId::Salle20,
        RoomId::Salle21,
        RoomId::Salle22,
        RoomId::Salle23,
        RoomId::Salle24,
        RoomId::Reveil1,
        RoomId::Reveil2,
        RoomId::Perinduction,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomId::Salle16 => "salle16",
            RoomId::Salle17 => "salle17",
            RoomId::Salle18 => "salle18",
            RoomId::Salle19 => "salle19",
            RoomId::Salle20 => "salle20",
            RoomId::Salle21 => "salle21",
            RoomId::Salle22 => "salle22",
            RoomId::Salle23 => "salle23",
            RoomId::Salle24 => "salle24",
            RoomId::Reveil1 => "reveil1",
            RoomId::Reveil2 => "reveil2",
            RoomId::Perinduction => "perinduction",
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomId::ALL
            .into_iter()
            .find(|room| room.as_str() == s)
            .ok_or_else(|| ParseError::UnknownRoom(s.to_string()))
    }
}

/// Availability of a room slot. `Open` is the default (persisted as no flag).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomState {
    #[default]
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "close")]
    Closed,
    #[serde(rename = "unuse")]
    Unused,
}

impl RoomState {
    pub fn is_open(self) -> bool {
        matches!(self, RoomState::Open)
    }

    /// Persisted flag: `None` for open, `close` / `unuse` otherwise.
    pub fn as_flag(self) -> Option<&'static str> {
        match self {
            RoomState::Open => None,
            RoomState::Closed => Some("close"),
            RoomState::Unused => Some("unuse"),
        }
    }

    /// Parse a persisted or user-supplied flag. A missing or empty flag is `Open`.
    pub fn from_flag(flag: Option<&str>) -> Result<Self, ParseError> {
        match flag.map(str::trim) {
            None | Some("") | Some("open") => Ok(RoomState::Open),
            Some("close") | Some("closed") => Ok(RoomState::Closed),
            Some("unuse") | Some("unused") => Ok(RoomState::Unused),
            Some(other) => Err(ParseError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag().unwrap_or("open"))
    }
}

impl FromStr for RoomState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomState::from_flag(Some(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownRoom(String),
    UnknownState(String),
    BadDate(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownRoom(r) => write!(f, "unknown room: {r}"),
            ParseError::UnknownState(s) => write!(f, "unknown room state: {s}"),
            ParseError::BadDate(d) => write!(f, "invalid date (expected YYYY-MM-DD): {d}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ParseError::BadDate(s.to_string()))
}

/// A member of the roster. Owned by the roster collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    #[serde(alias = "nom")]
    pub surname: String,
    #[serde(alias = "prenom")]
    pub given_name: String,
    /// Shift code, e.g. `J1`.
    #[serde(default)]
    pub status: String,
    #[serde(default = "default_present", deserialize_with = "present_flag")]
    pub present: bool,
}

fn default_present() -> bool {
    true
}

/// Accept `true`/`false` as well as the `0`/`1` integers older exports use.
fn present_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl Staff {
    /// The slot label for this staff member: `"<given> <surname> - <status>"`.
    pub fn label(&self) -> String {
        format!("{} {} - {}", self.given_name, self.surname, self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub occupant: Option<String>,
    pub state: RoomState,
}

/// A fully materialized day: one slot per room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub slots: [Slot; ROOM_COUNT],
}

impl DaySchedule {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    pub fn slot(&self, room: RoomId) -> &Slot {
        &self.slots[room.index()]
    }

    pub fn slot_mut(&mut self, room: RoomId) -> &mut Slot {
        &mut self.slots[room.index()]
    }

    pub fn occupied(&self) -> impl Iterator<Item = (RoomId, &str)> {
        RoomId::ALL
            .into_iter()
            .filter_map(|room| self.slot(room).occupant.as_deref().map(|label| (room, label)))
    }
}

/// Per-staff fairness ledger: how many times each room was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCounter {
    pub staff_id: StaffId,
    pub counts: [u32; ROOM_COUNT],
}

impl RotationCounter {
    pub fn new(staff_id: StaffId) -> Self {
        Self {
            staff_id,
            counts: [0; ROOM_COUNT],
        }
    }

    pub fn get(&self, room: RoomId) -> u32 {
        self.counts[room.index()]
    }

    pub fn increment(&mut self, room: RoomId) {
        let c = &mut self.counts[room.index()];
        *c = c.saturating_add(1);
    }

    /// Decrement, flooring at zero. Returns false when the counter was already zero.
    pub fn decrement_floored(&mut self, room: RoomId) -> bool {
        let c = &mut self.counts[room.index()];
        if *c == 0 {
            return false;
        }
        *c -= 1;
        true
    }
}

/// Journal record. One record per state transition, so a slot write and its
/// counter adjustments are replayed together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DayCreated {
        date: NaiveDate,
    },
    SlotReconciled {
        date: NaiveDate,
        room: RoomId,
        occupant: Option<String>,
        state: RoomState,
        /// Staff whose counter for `room` is decremented.
        released: Option<StaffId>,
        /// Staff whose counter for `room` is incremented.
        credited: Option<StaffId>,
    },
    CounterRowEnsured {
        staff_id: StaffId,
    },
    CounterRowDropped {
        staff_id: StaffId,
    },
    /// Clear every schedule and counter, then seed zeroed rows.
    Reset {
        staff_ids: Vec<StaffId>,
    },
    // Compaction output: restore state without ledger side effects.
    SlotRestored {
        date: NaiveDate,
        room: RoomId,
        occupant: Option<String>,
        state: RoomState,
    },
    CounterRestored {
        staff_id: StaffId,
        counts: [u32; ROOM_COUNT],
    },
}

impl Event {
    /// The date a record belongs to, for per-day notification.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Event::DayCreated { date }
            | Event::SlotReconciled { date, .. }
            | Event::SlotRestored { date, .. } => Some(*date),
            Event::CounterRowEnsured { .. }
            | Event::CounterRowDropped { .. }
            | Event::Reset { .. }
            | Event::CounterRestored { .. } => None,
        }
    }
}

// ── Request and result types ─────────────────────────────────────

/// What to put in a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    Label(String),
    Staff(StaffId),
    Clear,
}

/// Who to look for in an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaffRef {
    Label(String),
    Staff(StaffId),
}

/// Non-fatal conditions reported alongside a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The new occupant label matches no roster entry; no counter was credited.
    UnresolvedIdentity { label: String },
    /// The removed occupant label matches no roster entry; no counter was released.
    UnresolvedPrevious { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignOutcome {
    pub date: NaiveDate,
    pub room: RoomId,
    pub occupant: Option<String>,
    pub previous: Option<String>,
    pub warnings: Vec<Warning>,
    /// Nothing was written.
    pub noop: bool,
    /// Set when the assignment was rejected because the room is not open.
    pub blocked_by: Option<RoomState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnassignOutcome {
    pub date: NaiveDate,
    pub room: RoomId,
    pub removed: String,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStateOutcome {
    pub date: NaiveDate,
    pub room: RoomId,
    pub state: RoomState,
    pub cleared_occupant: Option<String>,
    pub warnings: Vec<Warning>,
    pub noop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub room: RoomId,
    pub occupant: Option<String>,
    pub state: RoomState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    /// False when no schedule has been written for this date yet.
    pub exists: bool,
    pub slots: Vec<SlotView>,
    pub duplicates: BTreeSet<RoomId>,
    pub unavailable: BTreeSet<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub assigned_room: Option<RoomId>,
    /// Rooms holding the label, other than the excluded one.
    pub occupied_rooms: Vec<RoomId>,
    /// Rooms that are closed or unused that day.
    pub blocked_rooms: Vec<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffStatistics {
    pub staff_id: StaffId,
    pub label: String,
    pub counts: [u32; ROOM_COUNT],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub days_cleared: usize,
    pub counter_rows: usize,
}
