//! # Dibujo
//!
//! Real-time game server for a team drawing game played in small rooms.
//!
//! Clients connect over WebSocket with a bearer credential, join a room
//! by its code, and drive the game with request frames. The server
//! answers every request with an ack and pushes the room's events to
//! everyone in it: team assignment, dice, the drawer's word, the
//! countdown, scores and the end of the game.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dibujo::prelude::*;
//!
//! # async fn run() -> Result<(), DibujoError> {
//! let auth = TokenTable::new().with_token("t-ana", Identity::new(PlayerId(1), "ana"));
//! let rooms = RoomDirectory::new().with_room(
//!     "ABC123",
//!     RoomRecord { id: "room-1".into(), host_id: PlayerId(1), max_players: 8 },
//! );
//!
//! let server = DibujoServer::<TokenTable, RoomDirectory, MemoryWordBank>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(auth, Arc::new(rooms), Arc::new(MemoryWordBank::with_defaults()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::DibujoError;
pub use server::{DibujoServer, DibujoServerBuilder, ServerConfig};

/// Everything needed to assemble and run a server.
pub mod prelude {
    pub use crate::{DibujoError, DibujoServer, DibujoServerBuilder, ServerConfig};
    pub use dibujo_protocol::{
        Category, ErrorCode, PlayerId, PlayerInfo, RoomCode, VictoryCondition,
    };
    pub use dibujo_room::{
        GameSettings, MemoryWordBank, RoomDirectory, RoomError, RoomLookup, RoomRecord, Word,
        WordBank,
    };
    pub use dibujo_session::{Authenticator, Identity, SessionError, TokenTable};
}
