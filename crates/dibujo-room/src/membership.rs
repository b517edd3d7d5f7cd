//! Room membership: who is in a room right now, and through which
//! connection.

use dibujo_protocol::{PlayerId, PlayerInfo, RoomCode, RoomStatus};
use dibujo_transport::ConnectionId;

use crate::config::clamp_capacity;
use crate::{RoomError, RoomRecord};

/// A connected member of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub player: PlayerInfo,
    pub conn: ConnectionId,
}

/// What a successful [`RoomSession::join`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new member was added.
    Joined,
    /// The player was already a member. Their connection is now `conn`;
    /// `previous` is the connection they had before.
    Rejoined { previous: ConnectionId },
}

/// Per-room membership and lifecycle.
///
/// Members are kept in join order. A player occupies at most one slot no
/// matter how many times they join.
///
/// While a game runs, the seats of its team members are held: an absent
/// team member still counts against capacity, so nobody else can take
/// their place before they come back.
#[derive(Debug)]
pub struct RoomSession {
    code: RoomCode,
    id: String,
    host_id: PlayerId,
    max_players: usize,
    status: RoomStatus,
    members: Vec<Member>,
    held: Vec<PlayerId>,
}

impl RoomSession {
    pub fn new(code: RoomCode, record: RoomRecord) -> Self {
        Self {
            code,
            id: record.id,
            host_id: record.host_id,
            max_players: clamp_capacity(record.max_players),
            status: RoomStatus::Waiting,
            members: Vec::new(),
            held: Vec::new(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    pub fn is_host(&self, player: PlayerId) -> bool {
        self.host_id == player
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Adds `player` on `conn`.
    ///
    /// Joining a room one already occupies only rebinds the connection.
    ///
    /// # Errors
    /// [`RoomError::RoomFull`] if the room is at capacity. Held seats of
    /// absent team members count as taken for everyone but their owner.
    pub fn join(&mut self, player: PlayerInfo, conn: ConnectionId) -> Result<JoinOutcome, RoomError> {
        if let Some(member) = self.members.iter_mut().find(|m| m.player.user_id == player.user_id) {
            let previous = member.conn;
            member.conn = conn;
            member.player.username = player.username;
            return Ok(JoinOutcome::Rejoined { previous });
        }
        let owns_held_seat = self.held.contains(&player.user_id);
        if !owns_held_seat && self.members.len() + self.absent_held() >= self.max_players {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        self.members.push(Member { player, conn });
        Ok(JoinOutcome::Joined)
    }

    /// Removes `player`.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`] if they are not a member.
    pub fn leave(&mut self, player: PlayerId) -> Result<Member, RoomError> {
        let index = self
            .members
            .iter()
            .position(|m| m.player.user_id == player)
            .ok_or_else(|| RoomError::NotInRoom(player, self.code.clone()))?;
        Ok(self.members.remove(index))
    }

    /// Removes whichever member is attached to `conn`, if any.
    ///
    /// A player who already rejoined on a newer connection is left alone.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<Member> {
        let index = self.members.iter().position(|m| m.conn == conn)?;
        Some(self.members.remove(index))
    }

    /// Holds the seats of `players` until [`release_seats`](Self::release_seats).
    pub fn hold_seats(&mut self, players: impl IntoIterator<Item = PlayerId>) {
        self.held = players.into_iter().collect();
    }

    pub fn release_seats(&mut self) {
        self.held.clear();
    }

    /// Held seats whose owner is not connected.
    fn absent_held(&self) -> usize {
        self.held.iter().filter(|p| !self.contains(**p)).count()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.members.iter().any(|m| m.player.user_id == player)
    }

    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.members
            .iter()
            .find(|m| m.player.user_id == player)
            .map(|m| m.conn)
    }

    pub fn member(&self, player: PlayerId) -> Option<&Member> {
        self.members.iter().find(|m| m.player.user_id == player)
    }

    /// Join-ordered snapshot of the connected players.
    pub fn connected_players(&self) -> Vec<PlayerInfo> {
        self.members.iter().map(|m| m.player.clone()).collect()
    }

    /// Join-ordered ids of the connected players.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.player.user_id).collect()
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Moves the room forward.
    ///
    /// The lifecycle never goes backwards; a request to do so, or to stay
    /// put, returns `false` and changes nothing.
    pub fn advance_status(&mut self, to: RoomStatus) -> bool {
        if rank(to) <= rank(self.status) {
            return false;
        }
        tracing::debug!(room = %self.code, from = ?self.status, ?to, "room status changed");
        self.status = to;
        true
    }
}

fn rank(status: RoomStatus) -> u8 {
    match status {
        RoomStatus::Waiting => 0,
        RoomStatus::TeamSetup => 1,
        RoomStatus::InProgress => 2,
        RoomStatus::Finished => 3,
    }
}
