//! The connection registry: which identity sits behind which connection,
//! and which room that connection is in.
//!
//! A connection is registered once, right after the WebSocket upgrade,
//! and unregistered when its task ends. In between it can be bound to at
//! most one room at a time.
//!
//! ```text
//! register() ──→ bind_room() ──→ clear_room() ──→ unregister()
//!     │                                               ↑
//!     └───────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency note
//!
//! The registry is shared by every connection task. The table sits behind
//! a `tokio::sync::Mutex`, and the authenticator is awaited *before* the
//! lock is taken so a slow auth backend never blocks other connections.

use std::collections::HashMap;

use dibujo_protocol::RoomCode;
use dibujo_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::{Authenticator, Identity, SessionError};

/// What the registry knows about one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub identity: Identity,
    /// The room this connection has joined, if any.
    pub room: Option<RoomCode>,
}

/// Maps live connections to verified identities and their current room.
pub struct ConnectionRegistry<A> {
    auth: A,
    connections: Mutex<HashMap<ConnectionId, ConnectionRecord>>,
}

impl<A: Authenticator> ConnectionRegistry<A> {
    pub fn new(auth: A) -> Self {
        Self {
            auth,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Verifies `credential` and records the resulting identity.
    ///
    /// Registering never disconnects anything: the same user may hold
    /// several connections.
    ///
    /// # Errors
    /// - [`SessionError::Unauthenticated`] if the credential is missing
    ///   or the authenticator rejects it.
    /// - [`SessionError::InvalidState`] if the connection id is already
    ///   registered.
    pub async fn register(
        &self,
        conn: ConnectionId,
        credential: Option<&str>,
    ) -> Result<Identity, SessionError> {
        let token = credential
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SessionError::Unauthenticated("missing credential".into()))?;
        let identity = self.auth.authenticate(token).await?;

        let mut connections = self.connections.lock().await;
        if connections.contains_key(&conn) {
            return Err(SessionError::InvalidState(format!(
                "connection {conn} already registered"
            )));
        }
        connections.insert(
            conn,
            ConnectionRecord {
                identity: identity.clone(),
                room: None,
            },
        );

        tracing::info!(%conn, user = %identity.user_id, "connection registered");
        Ok(identity)
    }

    /// Removes a connection and hands back its record so the caller can
    /// run the disconnect cascade against the room it was in.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<ConnectionRecord> {
        let record = self.connections.lock().await.remove(&conn);
        if let Some(record) = &record {
            tracing::info!(%conn, user = %record.identity.user_id, "connection unregistered");
        }
        record
    }

    /// The identity behind a connection.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the connection is unknown.
    pub async fn lookup(&self, conn: ConnectionId) -> Result<Identity, SessionError> {
        self.connections
            .lock()
            .await
            .get(&conn)
            .map(|r| r.identity.clone())
            .ok_or(SessionError::NotFound(conn))
    }

    /// Records that `conn` joined `room`. Binding to the room it is
    /// already in is a no-op.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the connection is unknown.
    /// - [`SessionError::InvalidState`] if it is bound to another room.
    pub async fn bind_room(
        &self,
        conn: ConnectionId,
        room: RoomCode,
    ) -> Result<(), SessionError> {
        let mut connections = self.connections.lock().await;
        let record = connections
            .get_mut(&conn)
            .ok_or(SessionError::NotFound(conn))?;
        match &record.room {
            Some(current) if *current != room => Err(SessionError::InvalidState(format!(
                "already in room {current}, leave it first"
            ))),
            _ => {
                record.room = Some(room);
                Ok(())
            }
        }
    }

    /// Drops the room binding if `conn` is bound to `room`. Returns
    /// whether a binding was removed.
    pub async fn clear_room(&self, conn: ConnectionId, room: &RoomCode) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.get_mut(&conn) {
            Some(record) if record.room.as_ref() == Some(room) => {
                record.room = None;
                true
            }
            _ => false,
        }
    }

    /// The room `conn` is currently in.
    pub async fn current_room(&self, conn: ConnectionId) -> Option<RoomCode> {
        self.connections
            .lock()
            .await
            .get(&conn)
            .and_then(|r| r.room.clone())
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use dibujo_protocol::PlayerId;

    use super::*;
    use crate::TokenTable;

    fn registry() -> ConnectionRegistry<TokenTable> {
        ConnectionRegistry::new(
            TokenTable::new()
                .with_token("t-1", Identity::new(PlayerId(1), "uno"))
                .with_token("t-2", Identity::new(PlayerId(2), "dos")),
        )
    }

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[tokio::test]
    async fn test_register_valid_credential_stores_identity() {
        let reg = registry();
        let identity = reg.register(conn(1), Some("t-1")).await.unwrap();
        assert_eq!(identity.user_id, PlayerId(1));
        assert_eq!(reg.lookup(conn(1)).await.unwrap(), identity);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_missing_credential_is_unauthenticated() {
        let reg = registry();
        let err = reg.register(conn(1), None).await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated(_)));
        let err = reg.register(conn(1), Some("")).await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated(_)));
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_invalid_credential_is_unauthenticated() {
        let reg = registry();
        let err = reg.register(conn(1), Some("forged")).await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated(_)));
        assert!(reg.lookup(conn(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_register_same_user_twice_keeps_both_connections() {
        let reg = registry();
        reg.register(conn(1), Some("t-1")).await.unwrap();
        reg.register(conn(2), Some("t-1")).await.unwrap();
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn test_register_duplicate_connection_id_is_invalid_state() {
        let reg = registry();
        reg.register(conn(1), Some("t-1")).await.unwrap();
        let err = reg.register(conn(1), Some("t-2")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(reg.lookup(conn(1)).await.unwrap().user_id, PlayerId(1));
    }

    #[tokio::test]
    async fn test_lookup_unknown_connection_returns_not_found() {
        let reg = registry();
        let err = reg.lookup(conn(9)).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(c) if c == conn(9)));
    }

    #[tokio::test]
    async fn test_unregister_returns_record_with_room() {
        let reg = registry();
        reg.register(conn(1), Some("t-1")).await.unwrap();
        reg.bind_room(conn(1), RoomCode::new("ABC123")).await.unwrap();

        let record = reg.unregister(conn(1)).await.unwrap();
        assert_eq!(record.identity.user_id, PlayerId(1));
        assert_eq!(record.room, Some(RoomCode::new("ABC123")));
        assert!(reg.unregister(conn(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_bind_room_other_room_is_invalid_state() {
        let reg = registry();
        reg.register(conn(1), Some("t-1")).await.unwrap();
        reg.bind_room(conn(1), RoomCode::new("AAA111")).await.unwrap();
        // Same room again is fine.
        reg.bind_room(conn(1), RoomCode::new("aaa111")).await.unwrap();

        let err = reg
            .bind_room(conn(1), RoomCode::new("BBB222"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(reg.current_room(conn(1)).await, Some(RoomCode::new("AAA111")));
    }

    #[tokio::test]
    async fn test_bind_room_unknown_connection_returns_not_found() {
        let reg = registry();
        let err = reg
            .bind_room(conn(4), RoomCode::new("AAA111"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_room_only_matching_room() {
        let reg = registry();
        reg.register(conn(1), Some("t-1")).await.unwrap();
        reg.bind_room(conn(1), RoomCode::new("AAA111")).await.unwrap();

        assert!(!reg.clear_room(conn(1), &RoomCode::new("BBB222")).await);
        assert!(reg.current_room(conn(1)).await.is_some());

        assert!(reg.clear_room(conn(1), &RoomCode::new("AAA111")).await);
        assert!(reg.current_room(conn(1)).await.is_none());
        // Now free to join elsewhere.
        reg.bind_room(conn(1), RoomCode::new("BBB222")).await.unwrap();
    }

    #[test]
    fn test_session_error_codes() {
        use dibujo_protocol::ErrorCode;
        assert_eq!(
            SessionError::Unauthenticated("x".into()).code(),
            ErrorCode::Unauthenticated
        );
        assert_eq!(SessionError::NotFound(conn(1)).code(), ErrorCode::NotFound);
        assert_eq!(
            SessionError::InvalidState("x".into()).code(),
            ErrorCode::InvalidState
        );
    }
}
