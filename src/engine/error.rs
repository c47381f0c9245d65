use ulid::Ulid;

use crate::model::Span;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The proposed time overlaps an active booking.
    Conflict(Ulid),
    /// The proposed time overlaps a busy period from a connected calendar.
    ExternalConflict(Span),
    /// The subject could not be resolved to an assigned staff member.
    NoAssignedStaff(String),
    InvalidTransition { id: Ulid, reason: String },
    HasActiveBookings(Ulid),
    Validation(String),
    LimitExceeded(&'static str),
    WalError(String),
    Calendar(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "slot no longer available: conflicts with booking {id}")
            }
            EngineError::ExternalConflict(span) => write!(
                f,
                "slot no longer available: calendar busy [{}, {})",
                span.start, span.end
            ),
            EngineError::NoAssignedStaff(who) => {
                write!(f, "no assigned staff member for subject {who}")
            }
            EngineError::InvalidTransition { id, reason } => {
                write!(f, "invalid transition for booking {id}: {reason}")
            }
            EngineError::HasActiveBookings(id) => {
                write!(f, "staff member {id} still has active bookings")
            }
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Calendar(e) => write!(f, "calendar error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::calendar::CalendarError> for EngineError {
    fn from(e: crate::calendar::CalendarError) -> Self {
        EngineError::Calendar(e.0)
    }
}
