//! Connection identity for Dibujo.
//!
//! This crate answers "who is on the other end of this socket, and which
//! room are they in?":
//!
//! 1. **Authentication**: the [`Authenticator`] trait turns the bearer
//!    credential captured at upgrade time into an [`Identity`].
//!    [`TokenTable`] is a static implementation for development and tests.
//! 2. **Connection tracking**: the [`ConnectionRegistry`] maps every live
//!    connection to its identity and, once joined, its current room.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)     ← receives commands tagged with an Identity
//!     ↕
//! Session Layer (this)   ← connection → identity → room
//!     ↕
//! Transport (below)      ← ConnectionId, credential from the upgrade
//! ```

mod auth;
mod error;
mod registry;

pub use auth::{Authenticator, Identity, TokenTable};
pub use error::SessionError;
pub use registry::{ConnectionRecord, ConnectionRegistry};
