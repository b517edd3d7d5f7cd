//! Unified error type for the Dibujo server.

use dibujo_protocol::{ErrorCode, ProtocolError};
use dibujo_room::RoomError;
use dibujo_session::SessionError;
use dibujo_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// the `?` operator converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DibujoError {
    /// The listener or a player's socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The credential was rejected or the connection is in the wrong state.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room or game rule rejected the request.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl DibujoError {
    /// The wire code reported when this error rejects a request.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Internal,
            Self::Protocol(_) => ErrorCode::BadRequest,
            Self::Session(e) => e.code(),
            Self::Room(e) => e.code(),
        }
    }
}
