use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Staff, StaffId};

/// Failure of the roster collaborator itself (store unreachable, bad data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterError(pub String);

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "roster unavailable: {}", self.0)
    }
}

impl std::error::Error for RosterError {}

/// Read-only view of the staff roster the engine resolves identities against.
#[async_trait]
pub trait Roster: Send + Sync {
    /// Exact, case-sensitive match. `status: None` ignores the status column.
    /// Several matches resolve to the lowest id.
    async fn find_staff(
        &self,
        given: &str,
        surname: &str,
        status: Option<&str>,
    ) -> Result<Option<StaffId>, RosterError>;

    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, RosterError>;

    async fn staff_exists(&self, id: StaffId) -> Result<bool, RosterError> {
        Ok(self.get_staff(id).await?.is_some())
    }

    async fn list_staff(&self) -> Result<Vec<Staff>, RosterError>;
}

/// Roster held in memory, optionally loaded from a JSON array of staff records.
pub struct InMemoryRoster {
    staff: DashMap<StaffId, Staff>,
}

impl Default for InMemoryRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self {
            staff: DashMap::new(),
        }
    }

    pub fn from_staff(staff: impl IntoIterator<Item = Staff>) -> Self {
        let roster = Self::new();
        for s in staff {
            roster.insert(s);
        }
        roster
    }

    /// Load `[{"id": 1, "surname": "...", "given_name": "...", "status": "J1"}, ...]`.
    /// A missing file yields an empty roster.
    pub fn load_json(path: &Path) -> std::io::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e),
        };
        let staff: Vec<Staff> = serde_json::from_slice(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_staff(staff))
    }

    pub fn insert(&self, staff: Staff) -> Option<Staff> {
        self.staff.insert(staff.id, staff)
    }

    pub fn len(&self) -> usize {
        self.staff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staff.is_empty()
    }
}

#[async_trait]
impl Roster for InMemoryRoster {
    async fn find_staff(
        &self,
        given: &str,
        surname: &str,
        status: Option<&str>,
    ) -> Result<Option<StaffId>, RosterError> {
        Ok(self
            .staff
            .iter()
            .filter(|e| {
                let s = e.value();
                s.given_name == given
                    && s.surname == surname
                    && status.is_none_or(|st| s.status == st)
            })
            .map(|e| *e.key())
            .min())
    }

    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, RosterError> {
        Ok(self.staff.get(&id).map(|e| e.value().clone()))
    }

    async fn list_staff(&self) -> Result<Vec<Staff>, RosterError> {
        let mut all: Vec<Staff> = self.staff.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }
}
