#[cfg(feature = "websocket")]
use tokio_tungstenite::tungstenite;

/// Why a listener or a player's socket failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The background acceptor is gone; no more players can connect.
    #[error("listener stopped")]
    ListenerStopped,

    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The client never completed the WebSocket handshake.
    #[cfg(feature = "websocket")]
    #[error("upgrade rejected: {0}")]
    Upgrade(#[source] tungstenite::Error),

    /// Writing a frame failed, usually because the player dropped.
    #[cfg(feature = "websocket")]
    #[error("send failed: {0}")]
    Send(#[source] tungstenite::Error),

    #[cfg(feature = "websocket")]
    #[error("receive failed: {0}")]
    Receive(#[source] tungstenite::Error),
}
