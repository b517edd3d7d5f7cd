//! A Dibujo server with a fixed set of players and rooms, for trying the
//! game locally.
//!
//! Players connect to `ws://HOST/?token=<name>` with one of the names in
//! [`PLAYERS`] and join room `FIESTA` (hosted by `ana`) or `TARDE`
//! (hosted by `beto`).

use std::sync::Arc;

use dibujo::prelude::*;
use tracing_subscriber::EnvFilter;

const PLAYERS: [&str; 8] = ["ana", "beto", "caro", "dani", "eli", "fede", "gabi", "hugo"];

fn demo_auth() -> TokenTable {
    PLAYERS
        .iter()
        .zip(1u64..)
        .fold(TokenTable::new(), |table, (name, id)| {
            table.with_token(*name, Identity::new(PlayerId(id), *name))
        })
}

fn demo_rooms() -> RoomDirectory {
    RoomDirectory::new()
        .with_room(
            "FIESTA",
            RoomRecord {
                id: "fiesta".into(),
                host_id: PlayerId(1),
                max_players: 8,
            },
        )
        .with_room(
            "TARDE",
            RoomRecord {
                id: "tarde".into(),
                host_id: PlayerId(2),
                max_players: 4,
            },
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("DIBUJO_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let words = MemoryWordBank::with_defaults();
    tracing::info!(%bind, players = PLAYERS.len(), words = words.len(), "starting party server");

    let server = DibujoServer::<TokenTable, RoomDirectory, MemoryWordBank>::builder()
        .bind(&bind)
        .build(
            demo_auth(),
            Arc::new(demo_rooms()),
            Arc::new(words),
        )
        .await?;

    server.run().await?;
    Ok(())
}
