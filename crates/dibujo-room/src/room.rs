//! Room actor: an isolated Tokio task that owns one room and its game.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. Membership, teams, the game state machine,
//! the turn timer and the subscriber set all live inside the task, so
//! every mutation of a room is serialized by construction.
//!
//! Besides commands, the actor's loop waits on:
//!
//! - the [`TurnTimer`] (ticks and the timeout),
//! - the dice delay between `dice_rolling` and `dice_rolled`,
//! - the reconnect grace of a paused game,
//! - the idle TTL of an empty room.
//!
//! Slow collaborator calls (picking a word) run in spawned tasks that
//! post their result back as a command, so the loop never blocks on them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dibujo_protocol::{
    Category, GameId, GameStatus, PlayerId, PlayerInfo, RoomCode, RoomStatus,
    ServerEvent, TeamNumber, VictoryCondition,
};
use dibujo_timer::{TimerEvent, TurnTimer};
use dibujo_transport::ConnectionId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::dispatch::{OutboundSender, Recipient, Subscribers};
use crate::game::{GameSession, Outgoing};
use crate::membership::{JoinOutcome, Member, RoomSession};
use crate::teams::{self, Roster};
use crate::{GameSettings, RoomError, RoomLookup, RoomRecord, Word, WordBank};

/// Counter for generating unique game ids.
static NEXT_GAME_ID: AtomicU64 = AtomicU64::new(1);

fn next_game_id() -> GameId {
    GameId(NEXT_GAME_ID.fetch_add(1, Ordering::Relaxed))
}

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
///
/// Variants carrying a `reply` are requests: the caller waits for the
/// outcome on that oneshot channel.
pub(crate) enum RoomCommand {
    Join {
        player: PlayerInfo,
        conn: ConnectionId,
        sender: OutboundSender,
        reply: Reply<JoinAck>,
    },
    Leave {
        player: PlayerId,
        reply: Reply<()>,
    },
    /// The connection is gone. Fire-and-forget.
    Disconnect {
        conn: ConnectionId,
    },
    AssignTeams {
        requester: PlayerId,
        team1: Vec<PlayerId>,
        team2: Vec<PlayerId>,
        reply: Reply<()>,
    },
    AssignRandom {
        requester: PlayerId,
        reply: Reply<()>,
    },
    Start {
        requester: PlayerId,
        victory: VictoryCondition,
        reply: Reply<()>,
    },
    RollDice {
        requester: PlayerId,
        reply: Reply<()>,
    },
    MarkGuessed {
        requester: PlayerId,
        reply: Reply<()>,
    },
    Rejoin {
        requester: PlayerId,
        reply: Reply<()>,
    },
    /// Posted by the word-pick task.
    WordResolved {
        round: u32,
        category: Category,
        word: Result<Option<Word>, RoomError>,
    },
    /// Posted once the joiner has its `room_state`.
    AnnounceJoin {
        player: PlayerId,
        conn: ConnectionId,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// What a successful join reports back to the joiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAck {
    pub room_code: RoomCode,
    pub room_id: String,
    pub player_count: usize,
    pub max_players: usize,
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub room_id: String,
    pub host_id: PlayerId,
    pub status: RoomStatus,
    /// `None` until teams have been assigned.
    pub game_status: Option<GameStatus>,
    pub player_count: usize,
    pub max_players: usize,
    /// Connected players in join order.
    pub players: Vec<PlayerInfo>,
}

/// Handle to a running room actor.
///
/// Cheap to clone: it is an `mpsc::Sender` wrapper. Every method fails
/// with [`RoomError::Unavailable`] once the actor has stopped.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Whether the actor behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Adds `player` on `conn`. Events for the connection flow through
    /// `sender` from now on, starting with `room_state`.
    pub async fn join(
        &self,
        player: PlayerInfo,
        conn: ConnectionId,
        sender: OutboundSender,
    ) -> Result<JoinAck, RoomError> {
        self.request(|reply| RoomCommand::Join {
            player,
            conn,
            sender,
            reply,
        })
        .await
    }

    pub async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply }).await
    }

    /// Reports a dropped connection (fire-and-forget).
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.post(RoomCommand::Disconnect { conn }).await
    }

    pub async fn assign_teams(
        &self,
        requester: PlayerId,
        team1: Vec<PlayerId>,
        team2: Vec<PlayerId>,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::AssignTeams {
            requester,
            team1,
            team2,
            reply,
        })
        .await
    }

    pub async fn assign_random(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::AssignRandom { requester, reply })
            .await
    }

    pub async fn start_game(
        &self,
        requester: PlayerId,
        victory: VictoryCondition,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start {
            requester,
            victory,
            reply,
        })
        .await
    }

    pub async fn roll_dice(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::RollDice { requester, reply })
            .await
    }

    pub async fn mark_guessed(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::MarkGuessed { requester, reply })
            .await
    }

    /// Asks for a `game_state_sync` to be pushed to the requester.
    pub async fn rejoin_game(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Rejoin { requester, reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(RoomCommand::Info { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.post(RoomCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(command(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    async fn post(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<L, W> {
    session: RoomSession,
    subscribers: Subscribers,
    game: Option<GameSession>,
    timer: TurnTimer,
    rng: StdRng,
    settings: GameSettings,
    lookup: Arc<L>,
    words: Arc<W>,
    /// For spawned tasks to post results back. Weak, so the actor still
    /// stops once every [`RoomHandle`] is gone.
    mailbox: mpsc::WeakSender<RoomCommand>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// When the pending roll settles, and for which round.
    dice_at: Option<(Instant, u32)>,
    abandon_at: Option<Instant>,
    idle_at: Option<Instant>,
}

impl<L: RoomLookup, W: WordBank> RoomActor<L, W> {
    /// Runs the actor loop until shutdown, idle expiry, or every handle
    /// being dropped.
    async fn run(mut self) {
        tracing::info!(room = %self.session.code(), "room actor started");
        self.sync_deadlines();

        loop {
            let dice_at = self.dice_at.map(|(at, _)| at);
            let abandon_at = self.abandon_at;
            let idle_at = self.idle_at;

            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                event = self.timer.next_event() => self.on_timer(event),
                () = sleep_until_opt(dice_at) => self.on_dice_settled(),
                () = sleep_until_opt(abandon_at) => self.on_abandon(),
                () = sleep_until_opt(idle_at) => {
                    if self.session.is_empty() {
                        tracing::info!(room = %self.session.code(), "empty room expired");
                        break;
                    }
                    self.idle_at = None;
                }
            }

            self.sync_deadlines();
        }

        self.timer.cancel();
        tracing::info!(room = %self.session.code(), "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player,
                conn,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_join(player, conn, sender));
            }
            RoomCommand::Leave { player, reply } => {
                let _ = reply.send(self.handle_leave(player));
            }
            RoomCommand::Disconnect { conn } => self.handle_disconnect(conn),
            RoomCommand::AssignTeams {
                requester,
                team1,
                team2,
                reply,
            } => {
                let result = self.check_team_setup(requester).and_then(|()| {
                    let roster =
                        teams::assign_manually(&self.session.player_ids(), team1, team2)?;
                    self.apply_roster(roster)
                });
                let _ = reply.send(result);
            }
            RoomCommand::AssignRandom { requester, reply } => {
                let result = self.check_team_setup(requester).and_then(|()| {
                    let roster = teams::assign_randomly(&self.session.player_ids(), &mut self.rng);
                    self.apply_roster(roster)
                });
                let _ = reply.send(result);
            }
            RoomCommand::Start {
                requester,
                victory,
                reply,
            } => {
                let _ = reply.send(self.handle_start(requester, victory));
            }
            RoomCommand::RollDice { requester, reply } => {
                let _ = reply.send(self.handle_roll(requester));
            }
            RoomCommand::MarkGuessed { requester, reply } => {
                let _ = reply.send(self.handle_guessed(requester));
            }
            RoomCommand::Rejoin { requester, reply } => {
                let _ = reply.send(self.handle_rejoin(requester));
            }
            RoomCommand::WordResolved {
                round,
                category,
                word,
            } => self.on_word_resolved(round, category, word),
            RoomCommand::AnnounceJoin { player, conn } => self.announce_join(player, conn),
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room = %self.session.code(), "room shutting down");
                return false;
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    fn handle_join(
        &mut self,
        player: PlayerInfo,
        conn: ConnectionId,
        sender: OutboundSender,
    ) -> Result<JoinAck, RoomError> {
        let player_id = player.user_id;
        let outcome = self.session.join(player, conn)?;
        if let JoinOutcome::Rejoined { previous } = outcome {
            if previous != conn {
                self.subscribers.unsubscribe(previous);
            }
        }
        self.subscribers.subscribe(conn, sender);
        tracing::info!(
            room = %self.session.code(),
            player = %player_id,
            %conn,
            players = self.session.player_count(),
            "player joined"
        );

        let receipt = self.subscribers.send_with_receipt(conn, self.room_state());
        if let Some(game) = self.game.as_mut() {
            if game.status() != GameStatus::Pending {
                let snapshot = game.snapshot(player_id, &self.timer);
                self.subscribers
                    .send_to_connection(conn, ServerEvent::GameStateSync(snapshot));
            }
            let session = &self.session;
            let out = game.try_resume(|p| session.contains(p), &mut self.timer);
            self.dispatch(out);
        }

        if outcome == JoinOutcome::Joined {
            if let Some(mailbox) = self.mailbox.upgrade() {
                tokio::spawn(async move {
                    if receipt.await.is_ok() {
                        let _ = mailbox
                            .send(RoomCommand::AnnounceJoin {
                                player: player_id,
                                conn,
                            })
                            .await;
                    }
                });
            }
        }

        Ok(JoinAck {
            room_code: self.session.code().clone(),
            room_id: self.session.id().to_owned(),
            player_count: self.session.player_count(),
            max_players: self.session.max_players(),
        })
    }

    /// Tells everyone else about a joiner whose `room_state` is out.
    fn announce_join(&self, player: PlayerId, conn: ConnectionId) {
        let Some(member) = self.session.member(player).filter(|m| m.conn == conn) else {
            return;
        };
        let event = ServerEvent::PlayerJoined {
            room_code: self.session.code().clone(),
            player: member.player.clone(),
            player_count: self.session.player_count(),
            max_players: self.session.max_players(),
        };
        self.subscribers.send_to_room(&event, Some(conn));
    }

    fn handle_leave(&mut self, player: PlayerId) -> Result<(), RoomError> {
        let member = self.session.leave(player)?;
        self.departed(member, "player left");
        Ok(())
    }

    fn handle_disconnect(&mut self, conn: ConnectionId) {
        match self.session.disconnect(conn) {
            Some(member) => self.departed(member, "player disconnected"),
            None => {
                self.subscribers.unsubscribe(conn);
            }
        }
    }

    fn departed(&mut self, member: Member, reason: &'static str) {
        self.subscribers.unsubscribe(member.conn);
        let player = member.player.user_id;
        tracing::info!(
            room = %self.session.code(),
            %player,
            players = self.session.player_count(),
            "{reason}"
        );

        self.subscribers.send_to_room(
            &ServerEvent::PlayerLeft {
                room_code: self.session.code().clone(),
                player: member.player,
                player_count: self.session.player_count(),
            },
            None,
        );

        if let Some(game) = self.game.as_mut() {
            let out = game.pause_for(player, &mut self.timer);
            self.dispatch(out);
        }

        if self.session.is_empty() {
            let lookup = Arc::clone(&self.lookup);
            let code = self.session.code().clone();
            tokio::spawn(async move { lookup.room_emptied(&code).await });
        }
    }

    // -----------------------------------------------------------------------
    // Teams and game
    // -----------------------------------------------------------------------

    fn require_member(&self, player: PlayerId) -> Result<(), RoomError> {
        if self.session.contains(player) {
            Ok(())
        } else {
            Err(RoomError::NotInRoom(player, self.session.code().clone()))
        }
    }

    fn require_host(&self, player: PlayerId, action: &str) -> Result<(), RoomError> {
        self.require_member(player)?;
        if self.session.is_host(player) {
            Ok(())
        } else {
            Err(RoomError::Unauthorized(format!("only the host can {action}")))
        }
    }

    fn check_team_setup(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.require_host(requester, "assign teams")?;
        if self.session.status() == RoomStatus::Finished {
            return Err(RoomError::InvalidState("room is finished".into()));
        }
        match self.game.as_ref().map(GameSession::status) {
            None | Some(GameStatus::Pending) => Ok(()),
            Some(_) => Err(RoomError::InvalidState("game already started".into())),
        }
    }

    fn apply_roster(&mut self, roster: Roster) -> Result<(), RoomError> {
        if self.game.is_none() {
            let game = GameSession::new(
                next_game_id(),
                self.session.code().clone(),
                self.settings.categories.clone(),
                self.settings.turn_duration,
            );
            tracing::info!(room = %self.session.code(), game = %game.id(), "game created");
            self.game = Some(game);
        }
        let players = self.session.connected_players();
        let event = match self.game.as_mut() {
            Some(game) => game.set_roster(roster, &players)?,
            None => return Err(RoomError::GameNotFound(self.session.code().clone())),
        };
        self.session.advance_status(RoomStatus::TeamSetup);
        self.subscribers.send_to_room(&event, None);
        Ok(())
    }

    fn handle_start(
        &mut self,
        requester: PlayerId,
        victory: VictoryCondition,
    ) -> Result<(), RoomError> {
        self.require_host(requester, "start the game")?;
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| RoomError::GameNotFound(self.session.code().clone()))?;
        let session = &self.session;
        let out = game.start(victory, |p| session.contains(p), &mut self.timer)?;
        let seated: Vec<PlayerId> = [TeamNumber::One, TeamNumber::Two]
            .into_iter()
            .flat_map(|n| game.team(n).members.iter().copied())
            .collect();
        self.session.hold_seats(seated);
        self.session.advance_status(RoomStatus::InProgress);
        self.dispatch(out);
        Ok(())
    }

    fn handle_roll(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        self.require_member(requester)?;
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| RoomError::GameNotFound(self.session.code().clone()))?;
        let out = game.roll_dice(requester, &mut self.rng)?;
        self.dice_at = Some((Instant::now() + self.settings.dice_delay, game.round()));
        self.dispatch(out);
        Ok(())
    }

    fn on_dice_settled(&mut self) {
        let Some((_, round)) = self.dice_at.take() else {
            return;
        };
        let Some(game) = self.game.as_mut() else {
            return;
        };
        let Some((out, category)) = game.settle_dice(round) else {
            return;
        };
        let game_id = game.id();
        self.dispatch(out);

        let Some(mailbox) = self.mailbox.upgrade() else {
            return;
        };
        let words = Arc::clone(&self.words);
        tokio::spawn(async move {
            let word = words.pick_unused(game_id, &category).await;
            let _ = mailbox
                .send(RoomCommand::WordResolved {
                    round,
                    category,
                    word,
                })
                .await;
        });
    }

    fn on_word_resolved(
        &mut self,
        round: u32,
        category: Category,
        word: Result<Option<Word>, RoomError>,
    ) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        match word {
            Ok(word) => {
                let out = game.word_resolved(round, &category, word, &mut self.timer);
                self.dispatch(out);
            }
            Err(err) => {
                tracing::warn!(room = %self.session.code(), %category, %err, "word pick failed");
                game.word_failed(round, &category);
            }
        }
    }

    fn handle_guessed(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        self.require_member(requester)?;
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| RoomError::GameNotFound(self.session.code().clone()))?;
        let session = &self.session;
        let out = game.mark_guessed(requester, |p| session.contains(p), &mut self.timer)?;
        self.dispatch(out);
        Ok(())
    }

    fn handle_rejoin(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        let conn = self
            .session
            .connection_of(requester)
            .ok_or_else(|| RoomError::NotInRoom(requester, self.session.code().clone()))?;
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| RoomError::GameNotFound(self.session.code().clone()))?;

        let snapshot = game.snapshot(requester, &self.timer);
        self.subscribers
            .send_to_connection(conn, ServerEvent::GameStateSync(snapshot));
        let session = &self.session;
        let out = game.try_resume(|p| session.contains(p), &mut self.timer);
        self.dispatch(out);
        Ok(())
    }

    fn on_timer(&mut self, event: TimerEvent) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        let out = match event {
            TimerEvent::Tick { remaining } => game.tick(remaining),
            TimerEvent::Timeout => {
                let session = &self.session;
                game.on_timeout(|p| session.contains(p), &mut self.timer)
            }
        };
        self.dispatch(out);
    }

    fn on_abandon(&mut self) {
        self.abandon_at = None;
        if let Some(game) = self.game.as_mut() {
            tracing::info!(room = %self.session.code(), "reconnect grace expired");
            let out = game.abandon(&mut self.timer);
            self.dispatch(out);
        }
    }

    /// Re-arms or clears the deadlines after every event.
    fn sync_deadlines(&mut self) {
        let status = self.game.as_ref().map(GameSession::status);

        if status == Some(GameStatus::Paused) {
            if self.abandon_at.is_none() {
                self.abandon_at = Some(Instant::now() + self.settings.reconnect_grace);
            }
        } else {
            self.abandon_at = None;
        }

        if status == Some(GameStatus::Finished) {
            self.dice_at = None;
            self.session.release_seats();
            if self.session.advance_status(RoomStatus::Finished) {
                if let Some(game_id) = self.game.as_ref().map(GameSession::id) {
                    let words = Arc::clone(&self.words);
                    tokio::spawn(async move { words.game_finished(game_id).await });
                }
            }
        }

        if self.session.is_empty() {
            if self.idle_at.is_none() {
                self.idle_at = Some(Instant::now() + self.settings.idle_ttl);
            }
        } else {
            self.idle_at = None;
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Routes game events to the subscribed connections.
    fn dispatch(&self, out: Outgoing) {
        for (recipient, event) in out {
            tracing::trace!(room = %self.session.code(), event = event.name(), "dispatch");
            match recipient {
                Recipient::All => self.subscribers.send_to_room(&event, None),
                Recipient::Player(player) => {
                    if let Some(conn) = self.session.connection_of(player) {
                        self.subscribers.send_to_connection(conn, event);
                    }
                }
            }
        }
    }

    fn room_state(&self) -> ServerEvent {
        ServerEvent::RoomState {
            room_code: self.session.code().clone(),
            room_id: self.session.id().to_owned(),
            host_id: self.session.host_id(),
            status: self.session.status(),
            players: self.session.connected_players(),
            player_count: self.session.player_count(),
            max_players: self.session.max_players(),
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.session.code().clone(),
            room_id: self.session.id().to_owned(),
            host_id: self.session.host_id(),
            status: self.session.status(),
            game_status: self.game.as_ref().map(GameSession::status),
            player_count: self.session.player_count(),
            max_players: self.session.max_players(),
            players: self.session.connected_players(),
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Spawns a room actor task and returns a handle to communicate with it.
///
/// The command channel is bounded by `settings.channel_size`; senders
/// wait when it is full.
pub(crate) fn spawn_room<L: RoomLookup, W: WordBank>(
    code: RoomCode,
    record: RoomRecord,
    settings: GameSettings,
    lookup: Arc<L>,
    words: Arc<W>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(settings.channel_size);
    let rng = settings
        .rng_seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

    let actor = RoomActor {
        session: RoomSession::new(code.clone(), record),
        subscribers: Subscribers::new(),
        game: None,
        timer: TurnTimer::new(),
        rng,
        settings,
        lookup,
        words,
        mailbox: tx.downgrade(),
        receiver: rx,
        dice_at: None,
        abandon_at: None,
        idle_at: None,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
