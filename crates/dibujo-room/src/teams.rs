//! Team assignment: split the connected players into two teams.
//!
//! Both functions are pure. Authority checks (host only, game not started)
//! happen in the room actor before they are called.

use std::collections::HashSet;

use dibujo_protocol::PlayerId;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::RoomError;

/// The result of an assignment. `unassigned` players are spectators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub team1: Vec<PlayerId>,
    pub team2: Vec<PlayerId>,
    pub unassigned: Vec<PlayerId>,
}

impl Roster {
    /// Every player on either team.
    pub fn assigned(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.team1.iter().chain(&self.team2).copied()
    }
}

/// Uses the host's lists as given.
///
/// Connected players missing from both lists are left unassigned.
///
/// # Errors
/// [`RoomError::InvalidState`] if an id appears twice (within a list or
/// across both) or is not a connected player.
pub fn assign_manually(
    connected: &[PlayerId],
    team1: Vec<PlayerId>,
    team2: Vec<PlayerId>,
) -> Result<Roster, RoomError> {
    let present: HashSet<PlayerId> = connected.iter().copied().collect();
    let mut seen = HashSet::new();
    for id in team1.iter().chain(&team2) {
        if !present.contains(id) {
            return Err(RoomError::InvalidState(format!("player {id} is not in the room")));
        }
        if !seen.insert(*id) {
            return Err(RoomError::InvalidState(format!("player {id} is listed twice")));
        }
    }

    let unassigned = connected
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    Ok(Roster {
        team1,
        team2,
        unassigned,
    })
}

/// Shuffles the connected players and cuts the deck in half.
///
/// Team 1 takes the first `n / 2`, team 2 the rest, so with an odd count
/// team 2 has the extra player.
pub fn assign_randomly<R: Rng + ?Sized>(connected: &[PlayerId], rng: &mut R) -> Roster {
    let mut shuffled = connected.to_vec();
    shuffled.shuffle(rng);
    let team2 = shuffled.split_off(shuffled.len() / 2);
    Roster {
        team1: shuffled,
        team2,
        unassigned: Vec::new(),
    }
}
