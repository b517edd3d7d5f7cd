//! Messages, events, acknowledgements and the frames that carry them.
//!
//! Every client request is a [`ClientFrame`]: a request id plus a
//! [`ClientMessage`]. The server answers each request with exactly one
//! [`ServerFrame::Ack`] carrying the same id, and pushes asynchronous
//! [`ServerEvent`]s as [`ServerFrame::Event`]s.
//!
//! ```text
//! → {"requestId":7,"message":{"event":"roll_dice","data":{"roomCode":"ABC123"}}}
//! ← {"type":"ack","requestId":7,"ack":{"success":true}}
//! ← {"type":"event","seq":12,"timestamp":5031,"event":{"event":"dice_rolling","data":{...}}}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{
    Category, GameId, GameOverReason, GameSnapshot, PlayerId, PlayerInfo,
    RoomCode, RoomStatus, TeamNumber, TeamScore, TeamView, VictoryCondition,
    WordId,
};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A request from a client.
///
/// Adjacently tagged: `{"event": "join_room", "data": {"roomCode": "ABC123"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinRoom {
        room_code: RoomCode,
    },
    LeaveRoom {
        room_code: RoomCode,
    },
    /// Host only. Ids not listed in either team become spectators.
    AssignTeams {
        room_code: RoomCode,
        team1_user_ids: Vec<PlayerId>,
        team2_user_ids: Vec<PlayerId>,
    },
    /// Host only.
    AssignTeamsRandom {
        room_code: RoomCode,
    },
    /// Host only.
    StartGame {
        room_code: RoomCode,
        victory_condition: VictoryCondition,
    },
    /// Current drawer only.
    RollDice {
        room_code: RoomCode,
    },
    /// Current guesser only.
    MarkGuessed {
        room_code: RoomCode,
    },
    /// Ask for a `game_state_sync` of the room's game.
    RejoinGame {
        room_code: RoomCode,
    },
    Ping,
}

impl ClientMessage {
    /// The wire name of this message, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::AssignTeams { .. } => "assign_teams",
            Self::AssignTeamsRandom { .. } => "assign_teams_random",
            Self::StartGame { .. } => "start_game",
            Self::RollDice { .. } => "roll_dice",
            Self::MarkGuessed { .. } => "mark_guessed",
            Self::RejoinGame { .. } => "rejoin_game",
            Self::Ping => "ping",
        }
    }

    /// The room this message targets, if any.
    pub fn room_code(&self) -> Option<&RoomCode> {
        match self {
            Self::JoinRoom { room_code }
            | Self::LeaveRoom { room_code }
            | Self::AssignTeams { room_code, .. }
            | Self::AssignTeamsRandom { room_code }
            | Self::StartGame { room_code, .. }
            | Self::RollDice { room_code }
            | Self::MarkGuessed { room_code }
            | Self::RejoinGame { room_code } => Some(room_code),
            Self::Ping => None,
        }
    }
}

/// The envelope a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// Echoed back in the matching ack.
    pub request_id: u64,
    pub message: ClientMessage,
}

// ---------------------------------------------------------------------------
// Acknowledgements
// ---------------------------------------------------------------------------

/// Machine-readable failure category of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthenticated,
    Unauthorized,
    NotFound,
    InvalidState,
    Capacity,
    BadRequest,
    Internal,
}

/// The synchronous reply to one request.
///
/// Only `success` is always present; the rest depends on the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_code: Option<RoomCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<u64>,
}

impl Ack {
    /// A bare `{success: true}`.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Success with a human-readable message.
    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A rejected request.
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client events
// ---------------------------------------------------------------------------

/// Asynchronous notifications pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent only to a joining player, before anyone hears about them.
    RoomState {
        room_code: RoomCode,
        room_id: String,
        host_id: PlayerId,
        status: RoomStatus,
        players: Vec<PlayerInfo>,
        player_count: usize,
        max_players: usize,
    },
    PlayerJoined {
        room_code: RoomCode,
        player: PlayerInfo,
        player_count: usize,
        max_players: usize,
    },
    PlayerLeft {
        room_code: RoomCode,
        player: PlayerInfo,
        player_count: usize,
    },
    TeamsAssigned {
        game_id: GameId,
        team1: Vec<PlayerInfo>,
        team2: Vec<PlayerInfo>,
        unassigned: Vec<PlayerInfo>,
    },
    GameStarted {
        game_id: GameId,
        victory_condition: VictoryCondition,
        teams: Vec<TeamView>,
    },
    TurnStarted {
        round_number: u32,
        team_number: TeamNumber,
        drawer: PlayerInfo,
        guesser: PlayerInfo,
        /// Turn budget in seconds.
        duration: u32,
    },
    DiceRolling {
        round_number: u32,
        drawer: PlayerId,
    },
    DiceRolled {
        round_number: u32,
        category: Category,
    },
    /// Drawer only.
    WordAssigned {
        word_id: WordId,
        word: String,
        category: Category,
    },
    /// No unused word left in the rolled category; the drawer re-rolls.
    CategoryExhausted {
        round_number: u32,
        category: Category,
    },
    TimerTick {
        time_remaining: u32,
    },
    WordGuessed {
        round_number: u32,
        team_number: TeamNumber,
        new_score: u32,
        category: Category,
        /// Seconds between word assignment and the guess.
        time_elapsed: u32,
    },
    TurnTimeout {
        round_number: u32,
        word: String,
        category: Category,
    },
    GameOver {
        game_id: GameId,
        reason: GameOverReason,
        winner_team_number: Option<TeamNumber>,
        winners: Vec<PlayerInfo>,
        final_scores: Vec<TeamScore>,
        total_rounds: u32,
        victory_condition: VictoryCondition,
    },
    GamePaused {
        player: PlayerInfo,
        message: String,
        time_remaining: u32,
    },
    GameResumed {
        time_remaining: u32,
    },
    GameStateSync(GameSnapshot),
}

impl ServerEvent {
    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomState { .. } => "room_state",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::TeamsAssigned { .. } => "teams_assigned",
            Self::GameStarted { .. } => "game_started",
            Self::TurnStarted { .. } => "turn_started",
            Self::DiceRolling { .. } => "dice_rolling",
            Self::DiceRolled { .. } => "dice_rolled",
            Self::WordAssigned { .. } => "word_assigned",
            Self::CategoryExhausted { .. } => "category_exhausted",
            Self::TimerTick { .. } => "timer_tick",
            Self::WordGuessed { .. } => "word_guessed",
            Self::TurnTimeout { .. } => "turn_timeout",
            Self::GameOver { .. } => "game_over",
            Self::GamePaused { .. } => "game_paused",
            Self::GameResumed { .. } => "game_resumed",
            Self::GameStateSync(_) => "game_state_sync",
        }
    }
}

/// Everything the server writes to a socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    Ack {
        request_id: u64,
        ack: Ack,
    },
    Event {
        /// Per-connection sequence number, starting at 1.
        seq: u64,
        /// Milliseconds since the connection was accepted.
        timestamp: u64,
        event: ServerEvent,
    },
}
