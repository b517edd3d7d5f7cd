//! The game session state machine.
//!
//! A [`GameSession`] owns rounds, turns, scores and victory detection for
//! one room. It is plain synchronous state: the room actor calls into it
//! with the acting player, a random source and the room's [`TurnTimer`],
//! and gets back the events to dispatch.
//!
//! ```text
//! Pending ──start──→ Active ⇄ Paused
//!                      │        │
//!                      ↓        ↓
//!                   Finished ←──┘
//! ```
//!
//! A turn walks through its phases:
//!
//! ```text
//! AwaitingRoll ──roll──→ Rolling ──settle──→ PickingWord ──word──→ Drawing
//!      ↑                                          │                  │
//!      └──────────── category exhausted ──────────┘      guess / timeout
//!                                                                    ↓
//!                                                            next turn / game over
//! ```
//!
//! # Rotation
//!
//! Teams alternate strictly: odd rounds belong to team 1, even rounds to
//! team 2. On a team's k-th turn (counting from 0) with members `m`, the
//! drawer is `m[k % n]` and the guesser `m[(k + 1) % n]`, so in a
//! two-player team the roles swap every time the team plays.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dibujo_protocol::{
    Category, GameId, GameOverReason, GameSnapshot, GameStatus, PlayerId,
    PlayerInfo, RoomCode, ServerEvent, TeamNumber, TeamScore, TeamView,
    TurnPhase, TurnView, VictoryCondition, WordId,
};
use dibujo_timer::TurnTimer;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::dispatch::Recipient;
use crate::teams::Roster;
use crate::{RoomError, Word};

/// Events produced by one state change, in dispatch order.
pub type Outgoing = Vec<(Recipient, ServerEvent)>;

/// One of the two teams.
#[derive(Debug, Clone)]
pub struct Team {
    pub number: TeamNumber,
    pub name: Option<String>,
    pub members: Vec<PlayerId>,
    pub score: u32,
    /// Categories this team has guessed a word in.
    pub completed: BTreeSet<Category>,
}

impl Team {
    fn new(number: TeamNumber) -> Self {
        Self {
            number,
            name: None,
            members: Vec::new(),
            score: 0,
            completed: BTreeSet::new(),
        }
    }
}

/// The word being drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedWord {
    pub id: WordId,
    pub text: String,
}

/// The turn in progress.
#[derive(Debug, Clone)]
pub struct Turn {
    pub round: u32,
    pub team: TeamNumber,
    pub drawer: PlayerId,
    pub guesser: PlayerId,
    pub phase: TurnPhase,
    pub category: Option<Category>,
    pub word: Option<AssignedWord>,
    /// Unix millis when the countdown started.
    pub started_at: Option<u64>,
}

impl Turn {
    pub fn involves(&self, player: PlayerId) -> bool {
        self.drawer == player || self.guesser == player
    }
}

/// State of one game played in a room.
#[derive(Debug)]
pub struct GameSession {
    id: GameId,
    room_code: RoomCode,
    status: GameStatus,
    victory: Option<VictoryCondition>,
    round: u32,
    teams: [Team; 2],
    turn: Option<Turn>,
    /// Display names of everyone who was in the room at assignment time.
    names: HashMap<PlayerId, PlayerInfo>,
    categories: Vec<Category>,
    exhausted: BTreeSet<Category>,
    turn_duration: Duration,
}

impl GameSession {
    pub fn new(
        id: GameId,
        room_code: RoomCode,
        categories: Vec<Category>,
        turn_duration: Duration,
    ) -> Self {
        Self {
            id,
            room_code,
            status: GameStatus::Pending,
            victory: None,
            round: 0,
            teams: [Team::new(TeamNumber::One), Team::new(TeamNumber::Two)],
            turn: None,
            names: HashMap::new(),
            categories,
            exhausted: BTreeSet::new(),
            turn_duration,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn(&self) -> Option<&Turn> {
        self.turn.as_ref()
    }

    pub fn team(&self, number: TeamNumber) -> &Team {
        &self.teams[number.index()]
    }

    /// Whether `player` is the current drawer or guesser.
    pub fn is_turn_owner(&self, player: PlayerId) -> bool {
        self.turn.as_ref().is_some_and(|t| t.involves(player))
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Replaces the teams. Only allowed before the game starts.
    ///
    /// `players` supplies display names; returns the `teams_assigned` event.
    pub fn set_roster(
        &mut self,
        roster: Roster,
        players: &[PlayerInfo],
    ) -> Result<ServerEvent, RoomError> {
        if self.status != GameStatus::Pending {
            return Err(RoomError::InvalidState("game already started".into()));
        }
        self.names = players.iter().map(|p| (p.user_id, p.clone())).collect();
        for team in &mut self.teams {
            team.members.clear();
        }
        self.teams[0].members = roster.team1;
        self.teams[1].members = roster.team2;

        Ok(ServerEvent::TeamsAssigned {
            game_id: self.id,
            team1: self.infos(&self.teams[0].members),
            team2: self.infos(&self.teams[1].members),
            unassigned: self.infos(&roster.unassigned),
        })
    }

    /// Starts the game and the first turn.
    ///
    /// # Errors
    /// [`RoomError::InvalidState`] if the game already started or either
    /// team has fewer than two players.
    pub fn start(
        &mut self,
        victory: VictoryCondition,
        present: impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Result<Outgoing, RoomError> {
        if self.status != GameStatus::Pending {
            return Err(RoomError::InvalidState("game already started".into()));
        }
        let sizes = self.teams.each_ref().map(|t| t.members.len());
        if sizes.iter().sum::<usize>() < 2 {
            return Err(RoomError::InvalidState("need at least two players".into()));
        }
        if sizes.contains(&0) {
            return Err(RoomError::InvalidState("both teams need players".into()));
        }
        if sizes.iter().any(|n| *n < 2) {
            return Err(RoomError::InvalidState(
                "each team needs at least two players".into(),
            ));
        }

        self.victory = Some(victory);
        self.status = GameStatus::Active;
        self.round = 1;
        tracing::info!(game = %self.id, room = %self.room_code, %victory, "game started");

        let mut out = vec![(
            Recipient::All,
            ServerEvent::GameStarted {
                game_id: self.id,
                victory_condition: victory,
                teams: self.team_views(),
            },
        )];
        out.extend(self.begin_turn(&present, timer));
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Turn actions
    // -----------------------------------------------------------------------

    /// The drawer rolls for a category.
    ///
    /// The category is drawn uniformly from the ones not yet exhausted in
    /// this game. The caller settles the roll after the dice delay.
    pub fn roll_dice<R: Rng + ?Sized>(
        &mut self,
        requester: PlayerId,
        rng: &mut R,
    ) -> Result<Outgoing, RoomError> {
        self.require_active()?;
        let available: Vec<Category> = self
            .categories
            .iter()
            .filter(|c| !self.exhausted.contains(*c))
            .cloned()
            .collect();
        let turn = self.current_turn_mut()?;
        if turn.drawer != requester {
            return Err(RoomError::Unauthorized("only the drawer can roll the dice".into()));
        }
        if turn.category.is_some() || turn.phase != TurnPhase::AwaitingRoll {
            return Err(RoomError::InvalidState("dice already rolled this turn".into()));
        }
        let category = available
            .choose(rng)
            .cloned()
            .ok_or_else(|| RoomError::InvalidState("no categories left".into()))?;

        tracing::debug!(round = turn.round, %category, "dice rolling");
        turn.category = Some(category);
        turn.phase = TurnPhase::Rolling;
        Ok(vec![(
            Recipient::All,
            ServerEvent::DiceRolling {
                round_number: turn.round,
                drawer: turn.drawer,
            },
        )])
    }

    /// Reveals the rolled category once the dice animation is over.
    ///
    /// Returns the event and the category to fetch a word for, or `None`
    /// if the roll is stale (the turn moved on).
    pub fn settle_dice(&mut self, round: u32) -> Option<(Outgoing, Category)> {
        let turn = self.turn.as_mut()?;
        if turn.round != round || turn.phase != TurnPhase::Rolling {
            return None;
        }
        let category = turn.category.clone()?;
        turn.phase = TurnPhase::PickingWord;
        let out = vec![(
            Recipient::All,
            ServerEvent::DiceRolled {
                round_number: round,
                category: category.clone(),
            },
        )];
        Some((out, category))
    }

    /// Applies the word bank's answer for `round`/`category`.
    ///
    /// Answers for a turn that has since changed are dropped. A word
    /// starts the countdown (frozen straight away if the game is paused);
    /// no word exhausts the category and sends the drawer back to roll.
    pub fn word_resolved(
        &mut self,
        round: u32,
        category: &Category,
        word: Option<Word>,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        if !self.awaiting_word(round, category) {
            tracing::debug!(round, %category, "stale word pick dropped");
            return Vec::new();
        }
        let paused = self.status == GameStatus::Paused;
        let budget = self.turn_duration;

        let Some(word) = word else {
            return self.exhaust(round, category, timer);
        };
        let Some(turn) = self.turn.as_mut() else {
            return Vec::new();
        };
        turn.word = Some(AssignedWord {
            id: word.id,
            text: word.text.clone(),
        });
        turn.phase = TurnPhase::Drawing;
        turn.started_at = Some(epoch_millis());
        timer.start(budget);
        if paused {
            timer.pause();
        }
        tracing::debug!(round, %category, word = %word.id, "word assigned");

        vec![(
            Recipient::Player(turn.drawer),
            ServerEvent::WordAssigned {
                word_id: word.id,
                word: word.text,
                category: category.clone(),
            },
        )]
    }

    /// The word bank failed; let the drawer roll again.
    pub fn word_failed(&mut self, round: u32, category: &Category) {
        if self.awaiting_word(round, category) {
            if let Some(turn) = self.turn.as_mut() {
                turn.category = None;
                turn.phase = TurnPhase::AwaitingRoll;
            }
        }
    }

    /// The guesser got it.
    ///
    /// # Errors
    /// - [`RoomError::Unauthorized`] if `requester` is not the guesser.
    /// - [`RoomError::InvalidState`] unless a word is being drawn and the
    ///   countdown is running.
    pub fn mark_guessed(
        &mut self,
        requester: PlayerId,
        present: impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Result<Outgoing, RoomError> {
        self.require_active()?;
        let turn = self.current_turn_mut()?;
        if turn.guesser != requester {
            return Err(RoomError::Unauthorized("only the guesser can mark the word".into()));
        }
        if turn.phase != TurnPhase::Drawing || !timer.is_running() {
            return Err(RoomError::InvalidState("no word is being drawn".into()));
        }
        let category = turn
            .category
            .clone()
            .ok_or_else(|| RoomError::InvalidState("turn has no category".into()))?;
        let (round, team_number) = (turn.round, turn.team);

        let time_elapsed = u32::try_from(timer.elapsed().as_secs()).unwrap_or(u32::MAX);
        timer.cancel();

        let team = &mut self.teams[team_number.index()];
        team.score += 1;
        team.completed.insert(category.clone());
        tracing::info!(game = %self.id, round, team = %team_number, score = team.score, "word guessed");

        let mut out = vec![(
            Recipient::All,
            ServerEvent::WordGuessed {
                round_number: round,
                team_number,
                new_score: team.score,
                category,
                time_elapsed,
            },
        )];
        out.extend(self.advance_turn(&present, timer));
        Ok(out)
    }

    /// The countdown ran out. Reveals the word; scores stay as they are.
    pub fn on_timeout(
        &mut self,
        present: impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        if self.status != GameStatus::Active {
            return Vec::new();
        }
        let Some(turn) = self.turn.as_ref() else {
            return Vec::new();
        };
        let (Some(word), Some(category)) = (&turn.word, &turn.category) else {
            return Vec::new();
        };
        if turn.phase != TurnPhase::Drawing {
            return Vec::new();
        }

        tracing::info!(game = %self.id, round = turn.round, "turn timed out");
        let mut out = vec![(
            Recipient::All,
            ServerEvent::TurnTimeout {
                round_number: turn.round,
                word: word.text.clone(),
                category: category.clone(),
            },
        )];
        out.extend(self.advance_turn(&present, timer));
        out
    }

    /// A countdown tick, forwarded while the game is active.
    pub fn tick(&self, remaining: u32) -> Outgoing {
        if self.status != GameStatus::Active {
            return Vec::new();
        }
        vec![(
            Recipient::All,
            ServerEvent::TimerTick {
                time_remaining: remaining,
            },
        )]
    }

    // -----------------------------------------------------------------------
    // Pause / resume / abandon
    // -----------------------------------------------------------------------

    /// Pauses the game because `player`, a turn owner, is gone.
    ///
    /// Does nothing unless the game is active and `player` is the current
    /// drawer or guesser.
    pub fn pause_for(&mut self, player: PlayerId, timer: &mut TurnTimer) -> Outgoing {
        if self.status != GameStatus::Active || !self.is_turn_owner(player) {
            return Vec::new();
        }
        timer.pause();
        self.status = GameStatus::Paused;
        let info = self.info(player);
        tracing::info!(game = %self.id, player = %player, "game paused");

        vec![(
            Recipient::All,
            ServerEvent::GamePaused {
                message: format!("{} disconnected, waiting for them to return", info.username),
                player: info,
                time_remaining: self.time_remaining(timer),
            },
        )]
    }

    /// Resumes a paused game once both turn owners are back.
    pub fn try_resume(
        &mut self,
        present: impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        if self.status != GameStatus::Paused {
            return Vec::new();
        }
        let Some(turn) = self.turn.as_ref() else {
            return Vec::new();
        };
        if !present(turn.drawer) || !present(turn.guesser) {
            return Vec::new();
        }
        self.status = GameStatus::Active;
        timer.resume();
        tracing::info!(game = %self.id, "game resumed");

        vec![(
            Recipient::All,
            ServerEvent::GameResumed {
                time_remaining: self.time_remaining(timer),
            },
        )]
    }

    /// Ends a paused game whose turn owner never came back. The leading
    /// team wins; a tie has no winner.
    pub fn abandon(&mut self, timer: &mut TurnTimer) -> Outgoing {
        if self.status != GameStatus::Paused {
            return Vec::new();
        }
        let leader = self.leader();
        self.finish(GameOverReason::Abandoned, leader, timer)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Full state as seen by `viewer`. The word is only included for the
    /// current drawer.
    pub fn snapshot(&self, viewer: PlayerId, timer: &TurnTimer) -> GameSnapshot {
        GameSnapshot {
            game_id: self.id,
            room_code: self.room_code.clone(),
            status: self.status,
            victory_condition: self.victory,
            current_round: self.round,
            teams: self.team_views(),
            current_turn: self.turn.as_ref().map(|turn| TurnView {
                round_number: turn.round,
                team_number: turn.team,
                drawer: self.info(turn.drawer),
                guesser: self.info(turn.guesser),
                phase: turn.phase,
                category: turn.category.clone(),
                word: turn
                    .word
                    .as_ref()
                    .filter(|_| viewer == turn.drawer)
                    .map(|w| w.text.clone()),
                started_at: turn.started_at,
                time_remaining: self.time_remaining(timer),
            }),
        }
    }

    pub fn team_views(&self) -> Vec<TeamView> {
        self.teams
            .iter()
            .map(|team| TeamView {
                team_number: team.number,
                name: team.name.clone(),
                score: team.score,
                players: self.infos(&team.members),
                categories_guessed: team.completed.iter().cloned().collect(),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn begin_turn(
        &mut self,
        present: &impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        timer.cancel();
        let team = if self.round % 2 == 1 {
            TeamNumber::One
        } else {
            TeamNumber::Two
        };
        let members = &self.teams[team.index()].members;
        let n = members.len().max(1);
        let k = ((self.round.saturating_sub(1)) / 2) as usize;
        let (Some(&drawer), Some(&guesser)) = (members.get(k % n), members.get((k + 1) % n))
        else {
            return Vec::new();
        };

        self.turn = Some(Turn {
            round: self.round,
            team,
            drawer,
            guesser,
            phase: TurnPhase::AwaitingRoll,
            category: None,
            word: None,
            started_at: None,
        });
        tracing::debug!(round = self.round, %team, %drawer, %guesser, "turn started");

        let mut out = vec![(
            Recipient::All,
            ServerEvent::TurnStarted {
                round_number: self.round,
                team_number: team,
                drawer: self.info(drawer),
                guesser: self.info(guesser),
                duration: secs(self.turn_duration),
            },
        )];
        if let Some(absent) = [drawer, guesser].into_iter().find(|p| !present(*p)) {
            out.extend(self.pause_for(absent, timer));
        }
        out
    }

    fn advance_turn(
        &mut self,
        present: &impl Fn(PlayerId) -> bool,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        timer.cancel();
        if let Some(winner) = self.victor() {
            return self.finish(GameOverReason::Victory, Some(winner), timer);
        }
        self.round += 1;
        self.begin_turn(present, timer)
    }

    /// The team meeting the victory condition, checking the team that
    /// just played first.
    fn victor(&self) -> Option<TeamNumber> {
        let victory = self.victory?;
        let first = self.turn.as_ref().map_or(TeamNumber::One, |t| t.team);
        [first, first.other()].into_iter().find(|n| {
            let team = &self.teams[n.index()];
            match victory {
                VictoryCondition::FirstTo(target) => team.score >= target,
                VictoryCondition::AllCategories => {
                    self.categories.iter().all(|c| team.completed.contains(c))
                }
            }
        })
    }

    fn leader(&self) -> Option<TeamNumber> {
        let [one, two] = self.teams.each_ref().map(|t| t.score);
        match one.cmp(&two) {
            std::cmp::Ordering::Greater => Some(TeamNumber::One),
            std::cmp::Ordering::Less => Some(TeamNumber::Two),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn exhaust(&mut self, round: u32, category: &Category, timer: &mut TurnTimer) -> Outgoing {
        self.exhausted.insert(category.clone());
        tracing::info!(game = %self.id, %category, "category exhausted");
        let mut out = vec![(
            Recipient::All,
            ServerEvent::CategoryExhausted {
                round_number: round,
                category: category.clone(),
            },
        )];

        if self.categories.iter().all(|c| self.exhausted.contains(c)) {
            let leader = self.leader();
            out.extend(self.finish(GameOverReason::WordsExhausted, leader, timer));
        } else if let Some(turn) = self.turn.as_mut() {
            turn.category = None;
            turn.phase = TurnPhase::AwaitingRoll;
        }
        out
    }

    fn finish(
        &mut self,
        reason: GameOverReason,
        winner: Option<TeamNumber>,
        timer: &mut TurnTimer,
    ) -> Outgoing {
        let Some(victory) = self.victory else {
            return Vec::new();
        };
        timer.cancel();
        self.status = GameStatus::Finished;
        self.turn = None;
        tracing::info!(game = %self.id, ?reason, ?winner, rounds = self.round, "game over");

        let winners = winner
            .map(|n| self.infos(&self.teams[n.index()].members))
            .unwrap_or_default();
        vec![(
            Recipient::All,
            ServerEvent::GameOver {
                game_id: self.id,
                reason,
                winner_team_number: winner,
                winners,
                final_scores: self
                    .teams
                    .iter()
                    .map(|t| TeamScore {
                        team_number: t.number,
                        score: t.score,
                    })
                    .collect(),
                total_rounds: self.round,
                victory_condition: victory,
            },
        )]
    }

    fn awaiting_word(&self, round: u32, category: &Category) -> bool {
        matches!(self.status, GameStatus::Active | GameStatus::Paused)
            && self.turn.as_ref().is_some_and(|t| {
                t.round == round
                    && t.phase == TurnPhase::PickingWord
                    && t.category.as_ref() == Some(category)
            })
    }

    fn require_active(&self) -> Result<(), RoomError> {
        match self.status {
            GameStatus::Active => Ok(()),
            GameStatus::Pending => Err(RoomError::InvalidState("game has not started".into())),
            GameStatus::Paused => Err(RoomError::InvalidState("game is paused".into())),
            GameStatus::Finished => Err(RoomError::InvalidState("game is over".into())),
        }
    }

    fn current_turn_mut(&mut self) -> Result<&mut Turn, RoomError> {
        self.turn
            .as_mut()
            .ok_or_else(|| RoomError::InvalidState("no turn in progress".into()))
    }

    /// Seconds shown to players: the live countdown while drawing, the
    /// full budget before the word is out.
    fn time_remaining(&self, timer: &TurnTimer) -> u32 {
        match self.turn.as_ref().map(|t| t.phase) {
            Some(TurnPhase::Drawing) => timer.remaining_secs(),
            _ => secs(self.turn_duration),
        }
    }

    fn info(&self, player: PlayerId) -> PlayerInfo {
        self.names.get(&player).cloned().unwrap_or_else(|| PlayerInfo {
            user_id: player,
            username: player.to_string(),
        })
    }

    fn infos(&self, players: &[PlayerId]) -> Vec<PlayerInfo> {
        players.iter().map(|p| self.info(*p)).collect()
    }
}

fn secs(d: Duration) -> u32 {
    u32::try_from(d.as_secs()).unwrap_or(u32::MAX)
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    const TURN: Duration = Duration::from_secs(60);

    fn p(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn infos(ids: &[u64]) -> Vec<PlayerInfo> {
        ids.iter()
            .map(|id| PlayerInfo {
                user_id: p(*id),
                username: format!("p{id}"),
            })
            .collect()
    }

    fn categories() -> Vec<Category> {
        ["Acciones", "Objetos"].into_iter().map(Category::new).collect()
    }

    fn word(id: u64, category: &Category) -> Word {
        Word {
            id: WordId(id),
            category: category.clone(),
            text: format!("word-{id}"),
            active: true,
        }
    }

    fn everyone(_: PlayerId) -> bool {
        true
    }

    /// Teams {1,3} vs {2,4}, started with `victory`.
    fn started(victory: VictoryCondition, timer: &mut TurnTimer) -> GameSession {
        let mut game = GameSession::new(GameId(1), RoomCode::new("ABC123"), categories(), TURN);
        game.set_roster(
            Roster {
                team1: vec![p(1), p(3)],
                team2: vec![p(2), p(4)],
                unassigned: vec![],
            },
            &infos(&[1, 2, 3, 4]),
        )
        .unwrap();
        game.start(victory, everyone, timer).unwrap();
        game
    }

    /// Rolls, settles and assigns a word for the current turn.
    fn draw(game: &mut GameSession, rng: &mut StdRng, timer: &mut TurnTimer, word_id: u64) -> Category {
        let turn = game.turn().unwrap().clone();
        game.roll_dice(turn.drawer, rng).unwrap();
        let (_, category) = game.settle_dice(turn.round).unwrap();
        game.word_resolved(turn.round, &category, Some(word(word_id, &category)), timer);
        category
    }

    fn events(out: &Outgoing) -> Vec<&'static str> {
        out.iter().map(|(_, e)| e.name()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_first_turn_belongs_to_team_one() {
        let mut timer = TurnTimer::new();
        let mut game = GameSession::new(GameId(1), RoomCode::new("A"), categories(), TURN);
        game.set_roster(
            Roster {
                team1: vec![p(1), p(3)],
                team2: vec![p(2), p(4)],
                unassigned: vec![],
            },
            &infos(&[1, 2, 3, 4]),
        )
        .unwrap();
        let out = game.start(VictoryCondition::FirstTo(3), everyone, &mut timer).unwrap();

        assert_eq!(events(&out), vec!["game_started", "turn_started"]);
        assert_eq!(game.status(), GameStatus::Active);
        let turn = game.turn().unwrap();
        assert_eq!((turn.round, turn.team), (1, TeamNumber::One));
        assert_eq!((turn.drawer, turn.guesser), (p(1), p(3)));
        assert_eq!(turn.phase, TurnPhase::AwaitingRoll);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_two_players_per_team() {
        let mut timer = TurnTimer::new();
        let mut game = GameSession::new(GameId(1), RoomCode::new("A"), categories(), TURN);
        game.set_roster(
            Roster {
                team1: vec![p(1)],
                team2: vec![p(2), p(3)],
                unassigned: vec![],
            },
            &infos(&[1, 2, 3]),
        )
        .unwrap();
        let err = game
            .start(VictoryCondition::FirstTo(3), everyone, &mut timer)
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
        assert_eq!(game.status(), GameStatus::Pending);
        assert!(game.turn().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_empty_team_rejected() {
        let mut timer = TurnTimer::new();
        let mut game = GameSession::new(GameId(1), RoomCode::new("A"), categories(), TURN);
        game.set_roster(
            Roster {
                team1: vec![p(1), p(2)],
                team2: vec![],
                unassigned: vec![],
            },
            &infos(&[1, 2]),
        )
        .unwrap();
        assert!(game.start(VictoryCondition::FirstTo(3), everyone, &mut timer).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_roster_after_start_is_invalid_state() {
        let mut timer = TurnTimer::new();
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        let err = game.set_roster(Roster::default(), &[]).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
        assert_eq!(game.team(TeamNumber::One).members, vec![p(1), p(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roll_dice_by_non_drawer_is_unauthorized() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        let err = game.roll_dice(p(3), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::Unauthorized(_)));
        assert_eq!(game.turn().unwrap().phase, TurnPhase::AwaitingRoll);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roll_dice_twice_is_invalid_state() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        let out = game.roll_dice(p(1), &mut rng).unwrap();
        assert_eq!(events(&out), vec!["dice_rolling"]);
        let err = game.roll_dice(p(1), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_roll_dice_picks_configured_category() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        game.roll_dice(p(1), &mut rng).unwrap();
        let (out, category) = game.settle_dice(1).unwrap();
        assert!(categories().contains(&category));
        assert_eq!(events(&out), vec!["dice_rolled"]);
        assert_eq!(game.turn().unwrap().phase, TurnPhase::PickingWord);
    }

    #[tokio::test(start_paused = true)]
    async fn test_word_resolved_goes_to_drawer_and_starts_timer() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        game.roll_dice(p(1), &mut rng).unwrap();
        let (_, category) = game.settle_dice(1).unwrap();
        let out = game.word_resolved(1, &category, Some(word(7, &category)), &mut timer);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, Recipient::Player(p(1)));
        assert!(matches!(&out[0].1, ServerEvent::WordAssigned { word, .. } if word == "word-7"));
        assert!(timer.is_running());
        assert_eq!(game.turn().unwrap().phase, TurnPhase::Drawing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_word_resolved_stale_round_is_dropped() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        game.roll_dice(p(1), &mut rng).unwrap();
        let (_, category) = game.settle_dice(1).unwrap();
        let out = game.word_resolved(2, &category, Some(word(7, &category)), &mut timer);

        assert!(out.is_empty());
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_word_resolved_none_exhausts_category_and_allows_reroll() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        game.roll_dice(p(1), &mut rng).unwrap();
        let (_, first) = game.settle_dice(1).unwrap();
        let out = game.word_resolved(1, &first, None, &mut timer);
        assert_eq!(events(&out), vec!["category_exhausted"]);
        assert_eq!(game.turn().unwrap().phase, TurnPhase::AwaitingRoll);

        // The re-roll can only land on the other category.
        game.roll_dice(p(1), &mut rng).unwrap();
        let (_, second) = game.settle_dice(1).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_word_resolved_all_exhausted_ends_game() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        let mut last = Vec::new();
        for _ in 0..2 {
            game.roll_dice(p(1), &mut rng).unwrap();
            let (_, category) = game.settle_dice(1).unwrap();
            last = game.word_resolved(1, &category, None, &mut timer);
        }
        assert_eq!(events(&last), vec!["category_exhausted", "game_over"]);
        assert!(matches!(
            &last[1].1,
            ServerEvent::GameOver { reason: GameOverReason::WordsExhausted, winner_team_number: None, .. }
        ));
        assert!(game.is_finished());
        assert!(game.turn().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_guessed_by_non_guesser_leaves_score() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        draw(&mut game, &mut rng, &mut timer, 1);

        for wrong in [p(1), p(2), p(4)] {
            let err = game.mark_guessed(wrong, everyone, &mut timer).unwrap_err();
            assert!(matches!(err, RoomError::Unauthorized(_)));
        }
        assert_eq!(game.team(TeamNumber::One).score, 0);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_guessed_before_word_is_invalid_state() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        let err = game.mark_guessed(p(3), everyone, &mut timer).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));

        game.roll_dice(p(1), &mut rng).unwrap();
        let err = game.mark_guessed(p(3), everyone, &mut timer).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
        assert_eq!(game.team(TeamNumber::One).score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_guessed_scores_and_rotates() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        let category = draw(&mut game, &mut rng, &mut timer, 1);

        tokio::time::advance(Duration::from_secs(12)).await;
        let out = game.mark_guessed(p(3), everyone, &mut timer).unwrap();

        assert_eq!(events(&out), vec!["word_guessed", "turn_started"]);
        assert!(matches!(
            &out[0].1,
            ServerEvent::WordGuessed { new_score: 1, time_elapsed: 12, team_number: TeamNumber::One, .. }
        ));
        let one = game.team(TeamNumber::One);
        assert_eq!(one.score, 1);
        assert!(one.completed.contains(&category));

        let turn = game.turn().unwrap();
        assert_eq!((turn.round, turn.team), (2, TeamNumber::Two));
        assert_eq!((turn.drawer, turn.guesser), (p(2), p(4)));
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_swaps_roles_within_team() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(6);
        let mut game = started(VictoryCondition::FirstTo(5), &mut timer);

        let mut pairs = Vec::new();
        for word_id in 1..=4 {
            let turn = game.turn().unwrap();
            pairs.push((turn.team, turn.drawer, turn.guesser));
            draw(&mut game, &mut rng, &mut timer, word_id);
            let guesser = game.turn().unwrap().guesser;
            game.mark_guessed(guesser, everyone, &mut timer).unwrap();
        }

        assert_eq!(
            pairs,
            vec![
                (TeamNumber::One, p(1), p(3)),
                (TeamNumber::Two, p(2), p(4)),
                (TeamNumber::One, p(3), p(1)),
                (TeamNumber::Two, p(4), p(2)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_reveals_stored_word_and_keeps_scores() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        let category = draw(&mut game, &mut rng, &mut timer, 42);

        let out = game.on_timeout(everyone, &mut timer);

        assert_eq!(events(&out), vec!["turn_timeout", "turn_started"]);
        assert_eq!(
            out[0].1,
            ServerEvent::TurnTimeout {
                round_number: 1,
                word: "word-42".into(),
                category,
            }
        );
        assert_eq!(game.team(TeamNumber::One).score, 0);
        assert_eq!(game.team(TeamNumber::Two).score, 0);
        assert_eq!(game.round(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_to_three_ends_exactly_once() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(8);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        let mut all = Vec::new();
        let mut word_id = 0;
        while !game.is_finished() {
            word_id += 1;
            draw(&mut game, &mut rng, &mut timer, word_id);
            let turn = game.turn().unwrap().clone();
            if turn.team == TeamNumber::One {
                all.extend(game.mark_guessed(turn.guesser, everyone, &mut timer).unwrap());
            } else {
                all.extend(game.on_timeout(everyone, &mut timer));
            }
        }

        let overs: Vec<_> = all.iter().filter(|(_, e)| e.name() == "game_over").collect();
        assert_eq!(overs.len(), 1);
        assert!(matches!(
            &overs[0].1,
            ServerEvent::GameOver { winner_team_number: Some(TeamNumber::One), reason: GameOverReason::Victory, total_rounds: 5, .. }
        ));
        assert_eq!(all.last().map(|(_, e)| e.name()), Some("game_over"));
        assert_eq!(game.team(TeamNumber::One).score, 3);

        // Nothing more happens afterwards.
        assert!(game.roll_dice(p(1), &mut rng).is_err());
        assert!(game.on_timeout(everyone, &mut timer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_categories_victory() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(10);
        let mut game = started(VictoryCondition::AllCategories, &mut timer);

        let mut word_id = 0;
        while !game.is_finished() && word_id < 50 {
            word_id += 1;
            draw(&mut game, &mut rng, &mut timer, word_id);
            let guesser = game.turn().unwrap().guesser;
            game.mark_guessed(guesser, everyone, &mut timer).unwrap();
        }

        assert!(game.is_finished());
        let winner_done = [TeamNumber::One, TeamNumber::Two]
            .into_iter()
            .any(|n| game.team(n).completed.len() == categories().len());
        assert!(winner_done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_and_resume_continues() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        draw(&mut game, &mut rng, &mut timer, 1);
        tokio::time::advance(Duration::from_secs(20)).await;

        // Someone outside the turn leaving does nothing.
        assert!(game.pause_for(p(2), &mut timer).is_empty());

        let out = game.pause_for(p(1), &mut timer);
        assert_eq!(events(&out), vec!["game_paused"]);
        assert_eq!(game.status(), GameStatus::Paused);
        assert!(matches!(&out[0].1, ServerEvent::GamePaused { time_remaining: 40, .. }));

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(timer.remaining(), Duration::from_secs(40));

        // Guessing while paused is refused.
        assert!(game.mark_guessed(p(3), everyone, &mut timer).is_err());

        // Drawer still missing: stays paused.
        assert!(game.try_resume(|id| id != p(1), &mut timer).is_empty());

        let out = game.try_resume(everyone, &mut timer);
        assert_eq!(events(&out), vec!["game_resumed"]);
        assert_eq!(out[0].1, ServerEvent::GameResumed { time_remaining: 40 });
        assert_eq!(game.status(), GameStatus::Active);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_leader_wins_tie_has_no_winner() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(12);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);

        // Not paused: nothing to abandon.
        assert!(game.abandon(&mut timer).is_empty());

        game.pause_for(p(1), &mut timer);
        let out = game.abandon(&mut timer);
        assert!(matches!(
            &out[0].1,
            ServerEvent::GameOver { reason: GameOverReason::Abandoned, winner_team_number: None, .. }
        ));

        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        draw(&mut game, &mut rng, &mut timer, 1);
        game.mark_guessed(p(3), everyone, &mut timer).unwrap();
        // Round 2: team 2's drawer walks away.
        game.pause_for(p(2), &mut timer);
        let out = game.abandon(&mut timer);
        assert!(matches!(
            &out[0].1,
            ServerEvent::GameOver { winner_team_number: Some(TeamNumber::One), .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_with_absent_owner_starts_paused() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(13);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        draw(&mut game, &mut rng, &mut timer, 1);

        // Player 2 (next drawer) is gone when the turn changes hands.
        let out = game.mark_guessed(p(3), |id| id != p(2), &mut timer).unwrap();
        assert_eq!(events(&out), vec!["word_guessed", "turn_started", "game_paused"]);
        assert_eq!(game.status(), GameStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_hides_word_from_non_drawer() {
        let mut timer = TurnTimer::new();
        let mut rng = StdRng::seed_from_u64(14);
        let mut game = started(VictoryCondition::FirstTo(3), &mut timer);
        draw(&mut game, &mut rng, &mut timer, 5);

        let drawer_view = game.snapshot(p(1), &timer);
        let guesser_view = game.snapshot(p(3), &timer);
        assert_eq!(
            drawer_view.current_turn.as_ref().unwrap().word.as_deref(),
            Some("word-5")
        );
        assert!(guesser_view.current_turn.as_ref().unwrap().word.is_none());
        assert_eq!(guesser_view.status, GameStatus::Active);
        assert_eq!(guesser_view.teams.len(), 2);
        assert_eq!(guesser_view.current_turn.unwrap().time_remaining, 60);
    }
}
