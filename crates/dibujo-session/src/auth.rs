//! Authentication hook for validating player identity.
//!
//! Dibujo doesn't issue or verify credentials itself; that belongs to
//! whatever service hands out tokens (a JWT issuer, a session store, an
//! API gateway). The server only needs the [`Authenticator`] trait: one
//! async method that takes the bearer token a client presented during the
//! WebSocket upgrade and returns an [`Identity`] or an error.

use std::collections::HashMap;

use dibujo_protocol::{PlayerId, PlayerInfo};

use crate::SessionError;

/// A verified user: the id other players see plus a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: PlayerId,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// The public view of this identity sent in events.
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            user_id: self.user_id,
            username: self.username.clone(),
        }
    }
}

/// Validates a client's bearer token and returns their identity.
///
/// # Trait bounds
///
/// - `Send + Sync` → one authenticator is shared by every connection
///   task, and Tokio may poll those tasks on any worker thread.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use dibujo_protocol::PlayerId;
/// use dibujo_session::{Authenticator, Identity, SessionError};
///
/// /// Accepts `user-<n>` tokens. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         let id: u64 = token
///             .strip_prefix("user-")
///             .and_then(|n| n.parse().ok())
///             .ok_or_else(|| SessionError::Unauthenticated("bad token".into()))?;
///         Ok(Identity::new(PlayerId(id), token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token and returns the player's identity.
    ///
    /// # Returns
    /// - `Ok(Identity)`: the token is valid
    /// - `Err(SessionError::Unauthenticated)`: the token is invalid or expired
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// An [`Authenticator`] backed by a fixed token → identity table.
///
/// ```rust
/// use dibujo_protocol::PlayerId;
/// use dibujo_session::{Identity, TokenTable};
///
/// let auth = TokenTable::new()
///     .with_token("t-ana", Identity::new(PlayerId(1), "ana"))
///     .with_token("t-beto", Identity::new(PlayerId(2), "beto"));
/// assert_eq!(auth.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Identity>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.insert(token, identity);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for TokenTable {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::Unauthenticated("unknown token".into()))
    }
}
