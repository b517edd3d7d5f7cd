//! Game settings shared by every room actor.

use std::time::Duration;

use dibujo_protocol::Category;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Categories the dice can land on unless configured otherwise.
pub const DEFAULT_CATEGORIES: [&str; 4] =
    ["Acciones", "Objetos", "Refranes", "Costumbres Argentinas"];

/// Smallest room capacity a lookup may report.
pub const MIN_ROOM_CAPACITY: usize = 4;

/// Largest room capacity a lookup may report.
pub const MAX_ROOM_CAPACITY: usize = 8;

/// Tunables for rooms and the games played in them.
///
/// One copy lives in the [`RoomRegistry`](crate::RoomRegistry) and each
/// room actor gets a clone when it is spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Wall-clock budget of one drawing turn.
    pub turn_duration: Duration,

    /// Time between `dice_rolling` and `dice_rolled`, long enough for the
    /// client animation.
    pub dice_delay: Duration,

    /// The categories a roll picks from. Also the full set for the
    /// `all_categories` victory condition.
    pub categories: Vec<Category>,

    /// How long a game stays paused waiting for a turn owner to come
    /// back before it is abandoned.
    pub reconnect_grace: Duration,

    /// How long an empty room actor lingers before it stops.
    pub idle_ttl: Duration,

    /// Capacity of each room actor's command channel.
    pub channel_size: usize,

    /// Seed for dice rolls and random team splits. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            turn_duration: Duration::from_secs(60),
            dice_delay: Duration::from_secs(2),
            categories: DEFAULT_CATEGORIES.iter().copied().map(Category::new).collect(),
            reconnect_grace: Duration::from_secs(120),
            idle_ttl: Duration::from_secs(300),
            channel_size: 64,
            rng_seed: None,
        }
    }
}

impl GameSettings {
    /// Fixes values the actor cannot work with.
    ///
    /// - An empty category list falls back to [`DEFAULT_CATEGORIES`].
    /// - Duplicate categories are dropped, keeping the first occurrence.
    /// - `channel_size` is at least 1.
    pub fn validated(mut self) -> Self {
        if self.categories.is_empty() {
            warn!("no categories configured, using defaults");
            self.categories = Self::default().categories;
        }
        let mut seen = std::collections::HashSet::new();
        self.categories.retain(|c| seen.insert(c.clone()));
        self.channel_size = self.channel_size.max(1);
        self
    }
}

/// Clamps a capacity reported by the room lookup to the supported range.
pub fn clamp_capacity(max_players: usize) -> usize {
    let clamped = max_players.clamp(MIN_ROOM_CAPACITY, MAX_ROOM_CAPACITY);
    if clamped != max_players {
        warn!(
            requested = max_players,
            clamped, "room capacity out of range, clamping"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_settings_default() {
        let settings = GameSettings::default();
        assert_eq!(settings.turn_duration, Duration::from_secs(60));
        assert_eq!(settings.dice_delay, Duration::from_secs(2));
        assert_eq!(settings.categories.len(), 4);
        assert_eq!(settings.categories[3].as_str(), "Costumbres Argentinas");
        assert_eq!(settings.reconnect_grace, Duration::from_secs(120));
        assert!(settings.rng_seed.is_none());
    }

    #[test]
    fn test_validated_restores_empty_categories() {
        let settings = GameSettings {
            categories: vec![],
            channel_size: 0,
            ..GameSettings::default()
        }
        .validated();
        assert_eq!(settings.categories.len(), 4);
        assert_eq!(settings.channel_size, 1);
    }

    #[test]
    fn test_validated_drops_duplicate_categories() {
        let settings = GameSettings {
            categories: vec![
                Category::new("Objetos"),
                Category::new("Acciones"),
                Category::new("Objetos"),
            ],
            ..GameSettings::default()
        }
        .validated();
        assert_eq!(
            settings.categories,
            vec![Category::new("Objetos"), Category::new("Acciones")]
        );
    }

    #[test]
    fn test_clamp_capacity() {
        assert_eq!(clamp_capacity(2), 4);
        assert_eq!(clamp_capacity(6), 6);
        assert_eq!(clamp_capacity(20), 8);
    }
}
