use crate::model::StaffId;
use crate::roster::{Roster, RosterError};

/// The parts of an occupant label `"<given> <surname> - <status>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLabel<'a> {
    pub given: &'a str,
    pub surname: &'a str,
    pub status: Option<&'a str>,
}

/// Split a label into name parts.
///
/// The name segment (before the first `-`) splits at its first space: the
/// first token is the given name and the rest is the surname, so multi-word
/// given names and hyphenated names do not split the way a reader would
/// expect. The status is the segment between the first and second `-`.
/// Returns `None` when no given name can be extracted.
pub fn parse_label(label: &str) -> Option<ParsedLabel<'_>> {
    let mut segments = label.split('-');
    let name = segments.next().unwrap_or_default().trim();
    let status = segments.next().map(str::trim).filter(|s| !s.is_empty());

    let (given, surname) = match name.split_once(' ') {
        Some((given, rest)) => (given.trim(), rest.trim()),
        None => (name, ""),
    };
    if given.is_empty() {
        return None;
    }
    Some(ParsedLabel {
        given,
        surname,
        status,
    })
}

/// Resolve a label to a roster id. `Ok(None)` means unresolved.
pub async fn resolve(roster: &dyn Roster, label: &str) -> Result<Option<StaffId>, RosterError> {
    let Some(parsed) = parse_label(label) else {
        return Ok(None);
    };
    roster
        .find_staff(parsed.given, parsed.surname, parsed.status)
        .await
}
