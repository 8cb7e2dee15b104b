use chrono::NaiveDate;

use crate::model::{ParseError, RoomId, StaffId};
use crate::roster::RosterError;

#[derive(Debug)]
pub enum EngineError {
    Invalid(ParseError),
    InvalidRange { start: NaiveDate, end: NaiveDate },
    LimitExceeded(&'static str),
    DayNotFound(NaiveDate),
    SlotEmpty { date: NaiveDate, room: RoomId },
    UnknownStaff(StaffId),
    LockTimeout { date: NaiveDate, room: RoomId },
    Busy,
    Roster(RosterError),
    WalError(String),
}

/// How a caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was written.
    Validation,
    /// The target does not exist; nothing was written.
    NotFound,
    /// Contention on the same slot; safe to re-issue.
    Concurrency,
    /// A collaborator or the journal failed.
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Invalid(_) | EngineError::InvalidRange { .. } | EngineError::LimitExceeded(_) => {
                ErrorKind::Validation
            }
            EngineError::DayNotFound(_) | EngineError::SlotEmpty { .. } | EngineError::UnknownStaff(_) => {
                ErrorKind::NotFound
            }
            EngineError::LockTimeout { .. } | EngineError::Busy => ErrorKind::Concurrency,
            EngineError::Roster(_) | EngineError::WalError(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Invalid(e) => write!(f, "{e}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid date range: {start} .. {end}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::DayNotFound(date) => write!(f, "no schedule for {date}"),
            EngineError::SlotEmpty { date, room } => {
                write!(f, "no assignment in {room} on {date}")
            }
            EngineError::UnknownStaff(id) => write!(f, "unknown staff id: {id}"),
            EngineError::LockTimeout { date, room } => {
                write!(f, "timed out waiting for {room} on {date}, retry")
            }
            EngineError::Busy => write!(f, "engine busy with a bulk operation, retry"),
            EngineError::Roster(e) => write!(f, "{e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::Invalid(e)
    }
}

impl From<RosterError> for EngineError {
    fn from(e: RosterError) -> Self {
        EngineError::Roster(e)
    }
}
