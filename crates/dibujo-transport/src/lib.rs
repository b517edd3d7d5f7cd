//! Socket layer for Dibujo: accepts players' WebSocket connections and
//! moves raw frames in and out.
//!
//! Every player socket is identified by a [`ConnectionId`] handed out at
//! upgrade time. The upgrade is also where the player's bearer credential
//! is read (`Authorization` header or `token` query parameter); this crate
//! keeps it on the [`Connection`] and leaves verifying it to the session
//! layer.
//!
//! The `websocket` feature (on by default) provides [`WebSocketTransport`]
//! on top of `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Identifies one player socket for as long as it is open.
///
/// Ids are never reused within a process, so a stale id held by a room
/// can't be confused with a newer socket of the same player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Source of upgraded player sockets.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// The next socket that finished its upgrade.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops taking new players. Open sockets are unaffected.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One player's socket.
///
/// A task may wait in [`recv`](Connection::recv) while another task
/// sends on the same connection.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next frame. `Ok(None)` means the player closed the
    /// socket.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// The bearer credential read during the upgrade, if the client sent
    /// one.
    fn credential(&self) -> Option<&str>;
}
