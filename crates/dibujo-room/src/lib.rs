//! Rooms and the games played in them.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! membership, team roster, game state machine, turn timer and the set
//! of connections subscribed to its events.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: opens room actors on demand, routes by room code
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`GameSession`]: rounds, turns, scores and victory detection
//! - [`RoomSession`]: who is in a room and through which connection
//! - [`Subscribers`]: fan-out of events to connections
//! - [`RoomLookup`] / [`WordBank`]: the persistence collaborators
//! - [`GameSettings`]: turn duration, dice delay, categories, grace periods

#![allow(async_fn_in_trait)]

mod collab;
mod config;
mod dispatch;
mod error;
mod game;
mod membership;
mod registry;
mod room;
mod teams;

pub use collab::{MemoryWordBank, RoomDirectory, RoomLookup, RoomRecord, Word, WordBank};
pub use config::{
    DEFAULT_CATEGORIES, GameSettings, MAX_ROOM_CAPACITY, MIN_ROOM_CAPACITY, clamp_capacity,
};
pub use dispatch::{Outbound, OutboundSender, Recipient, Subscribers};
pub use error::RoomError;
pub use game::{AssignedWord, GameSession, Outgoing, Team, Turn};
pub use membership::{JoinOutcome, Member, RoomSession};
pub use registry::RoomRegistry;
pub use room::{JoinAck, RoomHandle, RoomInfo};
pub use teams::{Roster, assign_manually, assign_randomly};
