use std::collections::{BTreeSet, HashMap};

use crate::model::*;

/// Rooms whose occupant label also appears in another room the same day.
/// Every room of a shared label is flagged. Labels are compared verbatim.
pub fn duplicate_rooms(day: &DaySchedule) -> BTreeSet<RoomId> {
    let mut by_label: HashMap<&str, Vec<RoomId>> = HashMap::new();
    for (room, label) in day.occupied() {
        by_label.entry(label).or_default().push(room);
    }
    by_label
        .into_values()
        .filter(|rooms| rooms.len() > 1)
        .flatten()
        .collect()
}

/// Rooms that are closed or unused.
pub fn unavailable_rooms(day: &DaySchedule) -> BTreeSet<RoomId> {
    RoomId::ALL
        .into_iter()
        .filter(|&room| !day.slot(room).state.is_open())
        .collect()
}

/// Rooms whose occupant is exactly `label`, in room order.
pub fn rooms_holding(day: &DaySchedule, label: &str) -> Vec<RoomId> {
    day.occupied()
        .filter(|(_, occupant)| *occupant == label)
        .map(|(room, _)| room)
        .collect()
}

pub fn day_view(day: &DaySchedule, exists: bool) -> DayView {
    DayView {
        date: day.date,
        exists,
        slots: RoomId::ALL
            .into_iter()
            .map(|room| {
                let slot = day.slot(room);
                SlotView {
                    room,
                    occupant: slot.occupant.clone(),
                    state: slot.state,
                }
            })
            .collect(),
        duplicates: duplicate_rooms(day),
        unavailable: unavailable_rooms(day),
    }
}
