//! Error types for the room layer.

use dibujo_protocol::{ErrorCode, PlayerId, RoomCode};

/// Errors that can occur during room and game operations.
///
/// None of these mutate shared state: a rejected request leaves the room
/// exactly as it was and only the requester hears about it.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this code exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// The room has no game yet (teams were never assigned).
    #[error("no game in room {0}")]
    GameNotFound(RoomCode),

    /// The room is at capacity.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The requester is not allowed to do this (not the host, not the
    /// drawer, not the guesser).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The action is not valid for the current room status or turn phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// A collaborator (room lookup, word bank) failed.
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl RoomError {
    /// The wire code reported in a failure ack.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoomNotFound(_) | Self::GameNotFound(_) => ErrorCode::NotFound,
            Self::RoomFull(_) => ErrorCode::Capacity,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::InvalidState(_) | Self::NotInRoom(..) => ErrorCode::InvalidState,
            Self::Unavailable(_) | Self::Lookup(_) => ErrorCode::Internal,
        }
    }
}
