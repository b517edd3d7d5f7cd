//! Error types for the protocol layer.
//!
//! Each Dibujo crate owns its error enum. A `ProtocolError` always means
//! a frame could not be turned into bytes or back, or carried a value
//! the protocol does not allow.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not a well-formed frame: malformed JSON, an unknown
    /// event name, a missing field or a field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but a value is out of range, e.g. team number 3
    /// or victory condition `first_to_0`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
