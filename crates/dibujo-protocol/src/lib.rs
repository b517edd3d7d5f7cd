//! Wire protocol for Dibujo.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`PlayerId`], [`RoomCode`], [`VictoryCondition`],
//!   [`GameSnapshot`], etc.): identities, lifecycle enums and the views
//!   of rooms, teams and turns that clients render.
//! - **Messages** ([`ClientMessage`], [`ServerEvent`], [`Ack`]): one
//!   variant per request and per pushed event, plus the frames
//!   ([`ClientFrame`], [`ServerFrame`]) that carry them.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! room actors (game rules). It knows nothing about sockets or turns;
//! it only knows the shape of every message.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientFrame) → Room (game rules)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    Ack, ClientFrame, ClientMessage, ErrorCode, ServerEvent, ServerFrame,
};
pub use types::{
    Category, GameId, GameOverReason, GameSnapshot, GameStatus, PlayerId,
    PlayerInfo, RoomCode, RoomStatus, TeamNumber, TeamScore, TeamView,
    TurnPhase, TurnView, VictoryCondition, WordId,
};
