//! `DibujoServer` builder and accept loop.
//!
//! This is the entry point for running a Dibujo game server. It ties
//! together all the layers: transport → protocol → session → room.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dibujo_protocol::JsonCodec;
use dibujo_room::{GameSettings, RoomLookup, RoomRegistry, WordBank};
use dibujo_session::{Authenticator, ConnectionRegistry};
use dibujo_transport::{Transport, WebSocketTransport};

use crate::DibujoError;
use crate::handler::handle_connection;

/// Connection-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,
    /// A connection that sends nothing for this long is dropped. Clients
    /// keep quiet connections alive with `ping`.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Both
/// registries carry their own locks.
pub(crate) struct ServerState<A, L, W> {
    pub(crate) connections: ConnectionRegistry<A>,
    pub(crate) rooms: RoomRegistry<L, W>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Dibujo server.
///
/// # Example
///
/// ```rust,ignore
/// use dibujo::prelude::*;
///
/// let server = DibujoServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(auth, Arc::new(rooms), Arc::new(words))
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct DibujoServerBuilder {
    config: ServerConfig,
    settings: GameSettings,
}

impl DibujoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets how long a silent connection may live.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the game settings every room is opened with.
    pub fn settings(mut self, settings: GameSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Binds the listener and assembles the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A, L, W>(
        self,
        auth: A,
        lookup: Arc<L>,
        words: Arc<W>,
    ) -> Result<DibujoServer<A, L, W>, DibujoError>
    where
        A: Authenticator,
        L: RoomLookup,
        W: WordBank,
    {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;

        let state = Arc::new(ServerState {
            connections: ConnectionRegistry::new(auth),
            rooms: RoomRegistry::new(lookup, words, self.settings),
            codec: JsonCodec,
            config: self.config,
        });

        Ok(DibujoServer { transport, state })
    }
}

/// A bound Dibujo game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DibujoServer<A, L, W> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, L, W>>,
}

impl<A, L, W> DibujoServer<A, L, W>
where
    A: Authenticator,
    L: RoomLookup,
    W: WordBank,
{
    /// Creates a new builder.
    pub fn builder() -> DibujoServerBuilder {
        DibujoServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each upgraded connection. Returns once
    /// the listener stops.
    pub async fn run(mut self) -> Result<(), DibujoError> {
        tracing::info!(addr = %self.transport.local_addr(), "Dibujo server running");

        loop {
            let conn = match self.transport.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "listener stopped");
                    return Err(e.into());
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(conn, state).await {
                    tracing::debug!(error = %e, "connection ended with error");
                }
            });
        }
    }
}
