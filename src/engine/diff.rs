use crate::model::*;

/// The (old, new) occupant pair for one slot update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyDiff {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl OccupancyDiff {
    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

/// Trim a requested label; a blank label means "clear".
pub fn normalize_label(label: &str) -> Option<String> {
    let trimmed = label.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Diff a requested occupant against the slot. A closed or unused slot
/// always ends up empty, whatever was requested.
pub fn diff_occupancy(slot: &Slot, requested: Option<&str>) -> OccupancyDiff {
    let new = if slot.state.is_open() {
        requested.map(str::to_string)
    } else {
        None
    };
    OccupancyDiff {
        old: slot.occupant.clone(),
        new,
    }
}

/// Diff a state change: entering a non-open state evicts the occupant.
pub fn diff_state_change(slot: &Slot, state: RoomState) -> OccupancyDiff {
    let new = if state.is_open() {
        slot.occupant.clone()
    } else {
        None
    };
    OccupancyDiff {
        old: slot.occupant.clone(),
        new,
    }
}
