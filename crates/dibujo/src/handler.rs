//! Per-connection handler: authentication, request routing and event
//! delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the credential captured at upgrade time → Identity
//!   2. Loop over three sources:
//!      - client frames → route to the room, answer with one ack each
//!      - room events → write as event frames, in order
//!      - idle deadline → drop silent connections
//!   3. On exit the drop guard unregisters the connection and tells its
//!      room it is gone.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dibujo_protocol::{
    Ack, ClientFrame, ClientMessage, Codec, ErrorCode, JsonCodec, ServerFrame,
};
use dibujo_room::{
    Outbound, OutboundSender, RoomLookup, RoomRegistry, WordBank,
};
use dibujo_session::{Authenticator, Identity, SessionError};
use dibujo_transport::{Connection, ConnectionId, WebSocketConnection};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::DibujoError;
use crate::server::ServerState;

/// Drop guard that unregisters a connection when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async part.
struct ConnectionGuard<A: Authenticator, L: RoomLookup, W: WordBank> {
    conn: ConnectionId,
    state: Arc<ServerState<A, L, W>>,
}

impl<A: Authenticator, L: RoomLookup, W: WordBank> Drop for ConnectionGuard<A, L, W> {
    fn drop(&mut self) {
        let conn = self.conn;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let Some(record) = state.connections.unregister(conn).await else {
                return;
            };
            if let Some(code) = record.room {
                if let Ok(room) = state.rooms.get(&code).await {
                    let _ = room.disconnect(conn).await;
                }
            }
        });
    }
}

/// Writes frames to one socket, numbering events as it goes.
struct FrameWriter<'a> {
    conn: &'a WebSocketConnection,
    codec: &'a JsonCodec,
    /// Last event sequence number handed out.
    seq: u64,
    start: Instant,
}

impl FrameWriter<'_> {
    async fn event(&mut self, mut outbound: Outbound) -> Result<(), DibujoError> {
        self.seq += 1;
        let frame = ServerFrame::Event {
            seq: self.seq,
            timestamp: u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            event: outbound.event.clone(),
        };
        self.write(&frame).await?;
        outbound.mark_delivered();
        Ok(())
    }

    async fn ack(&mut self, request_id: u64, ack: Ack) -> Result<(), DibujoError> {
        self.write(&ServerFrame::Ack { request_id, ack }).await
    }

    async fn write(&self, frame: &ServerFrame) -> Result<(), DibujoError> {
        let bytes = self.codec.encode(frame)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }
}

/// Everything a request needs to know about where it came from.
struct RequestContext<'a, A, L, W> {
    state: &'a ServerState<A, L, W>,
    conn: ConnectionId,
    identity: &'a Identity,
    events: &'a OutboundSender,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, L, W>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, L, W>>,
) -> Result<(), DibujoError>
where
    A: Authenticator,
    L: RoomLookup,
    W: WordBank,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Authenticate ---
    let identity = match state.connections.register(conn_id, conn.credential()).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "rejecting connection");
            let _ = conn.close().await;
            return Err(e.into());
        }
    };
    let _guard = ConnectionGuard {
        conn: conn_id,
        state: Arc::clone(&state),
    };

    // --- Step 2: Message loop ---
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Outbound>();
    let mut writer = FrameWriter {
        conn: &conn,
        codec: &state.codec,
        seq: 0,
        start: Instant::now(),
    };
    let ctx = RequestContext {
        state: &state,
        conn: conn_id,
        identity: &identity,
        events: &events_tx,
    };
    let idle = state.config.idle_timeout;
    let mut deadline = Instant::now() + idle;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, user = %identity.user_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                deadline = Instant::now() + idle;

                let Some((request_id, ack)) = handle_frame(&ctx, &data).await else {
                    continue;
                };
                // Events the request produced go out before its ack.
                while let Ok(outbound) = events_rx.try_recv() {
                    writer.event(outbound).await?;
                }
                writer.ack(request_id, ack).await?;
            }
            Some(outbound) = events_rx.recv() => {
                writer.event(outbound).await?;
            }
            () = time::sleep_until(deadline) => {
                tracing::info!(%conn_id, user = %identity.user_id, "connection idle, closing");
                let _ = conn.close().await;
                break;
            }
        }
    }

    // _guard drops here → unregister and room disconnect fire.
    Ok(())
}

/// Just enough of a frame to answer a request we could not parse.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdOnly {
    request_id: u64,
}

/// Decodes and routes one frame. Returns the ack to send, or `None` if
/// the frame was too broken to know whom to answer.
async fn handle_frame<A, L, W>(
    ctx: &RequestContext<'_, A, L, W>,
    data: &[u8],
) -> Option<(u64, Ack)>
where
    A: Authenticator,
    L: RoomLookup,
    W: WordBank,
{
    let frame: ClientFrame = match ctx.state.codec.decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(conn_id = %ctx.conn, error = %e, "failed to decode frame");
            let RequestIdOnly { request_id } = ctx.state.codec.decode::<RequestIdOnly>(data).ok()?;
            return Some((
                request_id,
                Ack::failure(ErrorCode::BadRequest, format!("invalid request: {e}")),
            ));
        }
    };

    let name = frame.message.name();
    let ack = match route(ctx, frame.message).await {
        Ok(ack) => ack,
        Err(e) => {
            tracing::debug!(
                conn_id = %ctx.conn,
                user = %ctx.identity.user_id,
                request = name,
                error = %e,
                "request rejected"
            );
            Ack::failure(e.code(), e.to_string())
        }
    };
    Some((frame.request_id, ack))
}

/// Executes one request against the rooms.
async fn route<A, L, W>(
    ctx: &RequestContext<'_, A, L, W>,
    message: ClientMessage,
) -> Result<Ack, DibujoError>
where
    A: Authenticator,
    L: RoomLookup,
    W: WordBank,
{
    let rooms: &RoomRegistry<L, W> = &ctx.state.rooms;
    let user = ctx.identity.user_id;

    match message {
        ClientMessage::Ping => Ok(Ack {
            server_time: Some(epoch_millis()),
            ..Ack::ok()
        }),

        ClientMessage::JoinRoom { room_code } => {
            if let Some(current) = ctx.state.connections.current_room(ctx.conn).await {
                if current != room_code {
                    return Err(SessionError::InvalidState(format!(
                        "already in room {current}, leave it first"
                    ))
                    .into());
                }
            }
            let room = rooms.get_or_open(&room_code).await?;
            let joined = room
                .join(ctx.identity.info(), ctx.conn, ctx.events.clone())
                .await?;
            ctx.state.connections.bind_room(ctx.conn, room_code).await?;
            Ok(Ack {
                room_code: Some(joined.room_code),
                room_id: Some(joined.room_id),
                player_count: Some(joined.player_count),
                max_players: Some(joined.max_players),
                ..Ack::ok()
            })
        }

        ClientMessage::LeaveRoom { room_code } => {
            let room = rooms.get(&room_code).await?;
            room.leave(user).await?;
            ctx.state.connections.clear_room(ctx.conn, &room_code).await;
            Ok(Ack {
                room_code: Some(room_code.clone()),
                ..Ack::ok_with_message(format!("left room {room_code}"))
            })
        }

        ClientMessage::AssignTeams {
            room_code,
            team1_user_ids,
            team2_user_ids,
        } => {
            rooms
                .get(&room_code)
                .await?
                .assign_teams(user, team1_user_ids, team2_user_ids)
                .await?;
            Ok(Ack::ok_with_message("teams assigned"))
        }

        ClientMessage::AssignTeamsRandom { room_code } => {
            rooms.get(&room_code).await?.assign_random(user).await?;
            Ok(Ack::ok_with_message("teams assigned randomly"))
        }

        ClientMessage::StartGame {
            room_code,
            victory_condition,
        } => {
            rooms
                .get(&room_code)
                .await?
                .start_game(user, victory_condition)
                .await?;
            Ok(Ack::ok())
        }

        ClientMessage::RollDice { room_code } => {
            rooms.get(&room_code).await?.roll_dice(user).await?;
            Ok(Ack::ok())
        }

        ClientMessage::MarkGuessed { room_code } => {
            rooms.get(&room_code).await?.mark_guessed(user).await?;
            Ok(Ack::ok())
        }

        ClientMessage::RejoinGame { room_code } => {
            rooms.get(&room_code).await?.rejoin_game(user).await?;
            Ok(Ack::ok())
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
