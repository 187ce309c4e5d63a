//! Room-level error taxonomy.
//!
//! Everything except `InvariantViolation` is scoped to a single message or
//! session and never affects the rest of the room.

use thiserror::Error;

use crate::net::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Join rejected because occupancy reached the limit.
    #[error("room is full ({limit} sessions)")]
    RoomFull { limit: usize },
    /// Input or leave for a session that is gone.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    /// Transport dropped; handled like a leave.
    #[error("connection lost for session {0}")]
    ConnectionLost(SessionId),
    #[error("room has been disposed")]
    Disposed,
    /// Simulation produced impossible state. The room must be torn down.
    #[error("room invariant violated: {0}")]
    InvariantViolation(String),
}

impl RoomError {
    /// Whether the whole room has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoomError::InvariantViolation(_))
    }
}
