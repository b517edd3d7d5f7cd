//! Collaborators the room layer consumes but does not own.
//!
//! Room metadata and the word list live in whatever persistence the
//! deployment uses. The room layer only sees two traits:
//!
//! - [`RoomLookup`]: resolve a room code to its id, host and capacity,
//!   and hear when a room has emptied.
//! - [`WordBank`]: hand out a word of a category that this game has not
//!   used yet, and forget the game once it ends.
//!
//! [`RoomDirectory`] and [`MemoryWordBank`] are in-memory versions for
//! tests and the demo server.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use dibujo_protocol::{Category, GameId, PlayerId, RoomCode, WordId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tokio::sync::Mutex;

use crate::RoomError;
use crate::config::DEFAULT_CATEGORIES;

/// What the persistence layer knows about a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    /// Storage id, echoed to clients as `roomId`.
    pub id: String,
    pub host_id: PlayerId,
    pub max_players: usize,
}

/// Resolves room codes against the persistence layer.
pub trait RoomLookup: Send + Sync + 'static {
    /// Returns `Ok(None)` if no room has this code.
    fn lookup(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<Option<RoomRecord>, RoomError>> + Send;

    /// Called when the last member leaves. The room is not destroyed here;
    /// cleaning it up is the collaborator's call.
    fn room_emptied(&self, code: &RoomCode) -> impl Future<Output = ()> + Send;
}

/// A word as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub id: WordId,
    pub category: Category,
    pub text: String,
    pub active: bool,
}

/// Hands out words for turns.
pub trait WordBank: Send + Sync + 'static {
    /// Picks an active word of `category` that `game` has not been given
    /// before and marks it used. `Ok(None)` means the category is
    /// exhausted for this game.
    fn pick_unused(
        &self,
        game: GameId,
        category: &Category,
    ) -> impl Future<Output = Result<Option<Word>, RoomError>> + Send;

    /// Called once when `game` ends. Bookkeeping about which words it was
    /// given can be dropped.
    fn game_finished(&self, game: GameId) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// RoomDirectory
// ---------------------------------------------------------------------------

/// An in-memory [`RoomLookup`].
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Mutex<HashMap<RoomCode, RoomRecord>>,
    emptied: Mutex<Vec<RoomCode>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a room the directory will resolve.
    pub fn with_room(mut self, code: impl Into<RoomCode>, record: RoomRecord) -> Self {
        self.rooms.get_mut().insert(code.into(), record);
        self
    }

    /// Codes reported through [`RoomLookup::room_emptied`], oldest first.
    pub async fn emptied(&self) -> Vec<RoomCode> {
        self.emptied.lock().await.clone()
    }
}

impl RoomLookup for RoomDirectory {
    async fn lookup(&self, code: &RoomCode) -> Result<Option<RoomRecord>, RoomError> {
        Ok(self.rooms.lock().await.get(code).cloned())
    }

    async fn room_emptied(&self, code: &RoomCode) {
        self.emptied.lock().await.push(code.clone());
    }
}

// ---------------------------------------------------------------------------
// MemoryWordBank
// ---------------------------------------------------------------------------

/// An in-memory [`WordBank`] that picks uniformly among the unused words.
#[derive(Debug)]
pub struct MemoryWordBank {
    words: Vec<Word>,
    state: Mutex<BankState>,
}

#[derive(Debug)]
struct BankState {
    used: HashMap<GameId, HashSet<WordId>>,
    rng: StdRng,
}

impl MemoryWordBank {
    pub fn new(words: Vec<Word>) -> Self {
        Self::with_rng(words, StdRng::from_os_rng())
    }

    /// Deterministic picks for tests.
    pub fn with_seed(words: Vec<Word>, seed: u64) -> Self {
        Self::with_rng(words, StdRng::seed_from_u64(seed))
    }

    fn with_rng(words: Vec<Word>, rng: StdRng) -> Self {
        Self {
            words,
            state: Mutex::new(BankState {
                used: HashMap::new(),
                rng,
            }),
        }
    }

    /// Builds a bank from `(category, text)` pairs, numbering ids from 1.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let words = pairs
            .into_iter()
            .zip(1..)
            .map(|((category, text), id)| Word {
                id: WordId(id),
                category: Category::new(category),
                text: text.to_owned(),
                active: true,
            })
            .collect();
        Self::new(words)
    }

    /// A small starter list covering every default category.
    pub fn with_defaults() -> Self {
        let [acciones, objetos, refranes, costumbres] = DEFAULT_CATEGORIES;
        Self::from_pairs([
            (acciones, "Bailar"),
            (acciones, "Nadar"),
            (acciones, "Cocinar"),
            (acciones, "Barrer"),
            (acciones, "Pescar"),
            (objetos, "Paraguas"),
            (objetos, "Bicicleta"),
            (objetos, "Tijeras"),
            (objetos, "Reloj"),
            (objetos, "Escalera"),
            (refranes, "Más vale tarde que nunca"),
            (refranes, "Perro que ladra no muerde"),
            (refranes, "En casa de herrero, cuchillo de palo"),
            (refranes, "No hay mal que por bien no venga"),
            (costumbres, "Tomar mate"),
            (costumbres, "Asado del domingo"),
            (costumbres, "Ñoquis del 29"),
            (costumbres, "Colectivo lleno"),
        ])
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Games that have been given words and have not finished yet.
    pub async fn tracked_games(&self) -> usize {
        self.state.lock().await.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordBank for MemoryWordBank {
    async fn pick_unused(
        &self,
        game: GameId,
        category: &Category,
    ) -> Result<Option<Word>, RoomError> {
        let mut state = self.state.lock().await;
        let BankState { used, rng } = &mut *state;
        let used = used.entry(game).or_default();

        let candidates: Vec<&Word> = self
            .words
            .iter()
            .filter(|w| w.active && w.category == *category && !used.contains(&w.id))
            .collect();
        let Some(word) = candidates.choose(rng).copied() else {
            return Ok(None);
        };

        used.insert(word.id);
        Ok(Some(word.clone()))
    }

    async fn game_finished(&self, game: GameId) {
        self.state.lock().await.used.remove(&game);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: u64) -> RoomRecord {
        RoomRecord {
            id: "room-1".into(),
            host_id: PlayerId(host),
            max_players: 4,
        }
    }

    #[tokio::test]
    async fn test_room_directory_lookup_normalizes_code() {
        let dir = RoomDirectory::new().with_room("abc123", record(1));
        let found = dir.lookup(&RoomCode::new("ABC123")).await.unwrap();
        assert_eq!(found, Some(record(1)));
        assert!(dir.lookup(&RoomCode::new("ZZZ999")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_room_directory_records_emptied_rooms() {
        let dir = RoomDirectory::new();
        dir.room_emptied(&RoomCode::new("A1")).await;
        dir.room_emptied(&RoomCode::new("B2")).await;
        assert_eq!(dir.emptied().await, vec![RoomCode::new("A1"), RoomCode::new("B2")]);
    }

    #[tokio::test]
    async fn test_pick_unused_never_repeats_within_game() {
        let bank = MemoryWordBank::from_pairs([("Objetos", "Silla"), ("Objetos", "Mesa")]);
        let objetos = Category::new("Objetos");

        let first = bank.pick_unused(GameId(1), &objetos).await.unwrap().unwrap();
        let second = bank.pick_unused(GameId(1), &objetos).await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert!(bank.pick_unused(GameId(1), &objetos).await.unwrap().is_none());

        // Another game starts with a fresh pool.
        assert!(bank.pick_unused(GameId(2), &objetos).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pick_unused_skips_inactive_and_other_categories() {
        let bank = MemoryWordBank::new(vec![
            Word {
                id: WordId(1),
                category: Category::new("Objetos"),
                text: "Silla".into(),
                active: false,
            },
            Word {
                id: WordId(2),
                category: Category::new("Acciones"),
                text: "Correr".into(),
                active: true,
            },
        ]);
        let picked = bank
            .pick_unused(GameId(1), &Category::new("Objetos"))
            .await
            .unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn test_game_finished_forgets_used_words() {
        let bank = MemoryWordBank::from_pairs([("Objetos", "Silla")]);
        let objetos = Category::new("Objetos");
        bank.pick_unused(GameId(1), &objetos).await.unwrap().unwrap();
        bank.pick_unused(GameId(2), &objetos).await.unwrap().unwrap();

        bank.game_finished(GameId(1)).await;

        let state = bank.state.lock().await;
        assert!(!state.used.contains_key(&GameId(1)));
        assert!(state.used.contains_key(&GameId(2)));
    }

    #[tokio::test]
    async fn test_with_seed_picks_are_reproducible() {
        let pairs = [("Objetos", "Silla"), ("Objetos", "Mesa"), ("Objetos", "Lámpara")];
        let words: Vec<Word> = MemoryWordBank::from_pairs(pairs).words;
        let objetos = Category::new("Objetos");

        let a = MemoryWordBank::with_seed(words.clone(), 42);
        let b = MemoryWordBank::with_seed(words, 42);
        for _ in 0..3 {
            let from_a = a.pick_unused(GameId(1), &objetos).await.unwrap().unwrap();
            let from_b = b.pick_unused(GameId(1), &objetos).await.unwrap().unwrap();
            assert_eq!(from_a.id, from_b.id);
        }
    }

    #[test]
    fn test_with_defaults_covers_every_default_category() {
        let bank = MemoryWordBank::with_defaults();
        assert!(!bank.is_empty());
        for category in DEFAULT_CATEGORIES {
            assert!(bank.words.iter().any(|w| w.category.as_str() == category));
        }
    }
}
