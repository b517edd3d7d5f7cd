//! Error types for the session layer.

use dibujo_protocol::ErrorCode;
use dibujo_transport::ConnectionId;

/// Errors raised while identifying connections.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential was missing or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// No live connection is registered under this id.
    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    /// The connection is in the wrong state for the request, e.g. it is
    /// already bound to another room.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl SessionError {
    /// The wire code reported in a failure ack.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidState(_) => ErrorCode::InvalidState,
        }
    }
}
