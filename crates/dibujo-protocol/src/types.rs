//! Core protocol types: identities and the game views that travel on
//! the wire.
//!
//! Everything here is plain data. The server builds these views from its
//! internal state and clients render them; nothing in this module knows
//! about rooms, timers or connections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player (a verified user).
///
/// Newtype wrapper so a `PlayerId` can't be confused with a `GameId`
/// even though both are `u64` underneath. `#[serde(transparent)]` keeps
/// the JSON a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identifies one game session (one match played in a room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// Identifies a word owned by the word bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordId(pub u64);

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W-{}", self.0)
    }
}

/// The short, human-shareable code of a room (e.g. `ABC123`).
///
/// Codes are case-insensitive for users, so they are normalized to
/// trimmed upper case on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A word category, e.g. `Objetos`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Team 1 or team 2. Serialized as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TeamNumber {
    One,
    Two,
}

impl TeamNumber {
    /// The opposing team.
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    /// Zero-based index, handy for `[T; 2]` storage.
    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

impl TryFrom<u8> for TeamNumber {
    type Error = ProtocolError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ProtocolError::InvalidMessage(format!(
                "team number must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<TeamNumber> for u8 {
    fn from(team: TeamNumber) -> Self {
        match team {
            TeamNumber::One => 1,
            TeamNumber::Two => 2,
        }
    }
}

impl fmt::Display for TeamNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}", u8::from(*self))
    }
}

/// A player as shown to other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub user_id: PlayerId,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Lifecycle enums
// ---------------------------------------------------------------------------

/// Lifecycle of a room, strictly forward:
///
/// ```text
/// Waiting → TeamSetup → InProgress → Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    TeamSetup,
    InProgress,
    Finished,
}

/// Lifecycle of a game session.
///
/// ```text
/// Pending → Active ⇄ Paused
///              ↓        ↓
///           Finished ←──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Pending,
    Active,
    Paused,
    Finished,
}

/// Where a turn is within its dice → word → drawing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Waiting for the drawer to roll the dice.
    AwaitingRoll,
    /// Dice animation is playing; category chosen but not revealed.
    Rolling,
    /// Category revealed; a word is being fetched from the word bank.
    PickingWord,
    /// Word assigned and the countdown is running.
    Drawing,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// A team met the victory condition.
    Victory,
    /// A turn owner never came back within the reconnect grace.
    Abandoned,
    /// Every category ran out of unused words.
    WordsExhausted,
}

// ---------------------------------------------------------------------------
// VictoryCondition
// ---------------------------------------------------------------------------

/// How a game is won. Travels as a string: `first_to_3`, `first_to_5`,
/// or `all_categories`. Any `first_to_<N>` with `N >= 1` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VictoryCondition {
    /// First team whose score reaches N.
    FirstTo(u32),
    /// First team to guess a word in every configured category.
    AllCategories,
}

impl FromStr for VictoryCondition {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all_categories" {
            return Ok(Self::AllCategories);
        }
        s.strip_prefix("first_to_")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(Self::FirstTo)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!(
                    "unknown victory condition: {s}"
                ))
            })
    }
}

impl TryFrom<String> for VictoryCondition {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VictoryCondition> for String {
    fn from(v: VictoryCondition) -> Self {
        v.to_string()
    }
}

impl fmt::Display for VictoryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstTo(n) => write!(f, "first_to_{n}"),
            Self::AllCategories => f.write_str("all_categories"),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A team as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub team_number: TeamNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub score: u32,
    pub players: Vec<PlayerInfo>,
    pub categories_guessed: Vec<Category>,
}

/// The current turn as seen by one client.
///
/// `word` is only filled in for the drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub round_number: u32,
    pub team_number: TeamNumber,
    pub drawer: PlayerInfo,
    pub guesser: PlayerInfo,
    pub phase: TurnPhase,
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    /// Milliseconds since the Unix epoch when the countdown started.
    pub started_at: Option<u64>,
    pub time_remaining: u32,
}

/// Full game state, sent on reconnection and on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub room_code: RoomCode,
    pub status: GameStatus,
    pub victory_condition: Option<VictoryCondition>,
    pub current_round: u32,
    pub teams: Vec<TeamView>,
    pub current_turn: Option<TurnView>,
}

/// Final score of one team, used in `game_over`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    pub team_number: TeamNumber,
    pub score: u32,
}
