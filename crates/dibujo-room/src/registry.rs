//! Room registry: opens room actors on demand and routes to them by code.

use std::collections::HashMap;
use std::sync::Arc;

use dibujo_protocol::RoomCode;
use tokio::sync::Mutex;

use crate::room::spawn_room;
use crate::{GameSettings, RoomError, RoomHandle, RoomLookup, WordBank};

/// Tracks the live room actors, keyed by room code.
///
/// A room actor is spawned the first time someone joins a code the
/// [`RoomLookup`] knows about, and respawned if the previous actor has
/// stopped (for instance after sitting empty past its idle TTL).
pub struct RoomRegistry<L, W> {
    lookup: Arc<L>,
    words: Arc<W>,
    settings: GameSettings,
    rooms: Mutex<HashMap<RoomCode, RoomHandle>>,
}

impl<L: RoomLookup, W: WordBank> RoomRegistry<L, W> {
    pub fn new(lookup: Arc<L>, words: Arc<W>, settings: GameSettings) -> Self {
        Self {
            lookup,
            words,
            settings: settings.validated(),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// The live actor for `code`.
    ///
    /// # Errors
    /// [`RoomError::RoomNotFound`] if no actor is running for it.
    pub async fn get(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .lock()
            .await
            .get(code)
            .filter(|h| !h.is_closed())
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))
    }

    /// The live actor for `code`, spawning one if the lookup knows the
    /// room.
    ///
    /// The lookup runs without holding the registry lock; if two callers
    /// race, the first actor to be inserted wins.
    pub async fn get_or_open(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        if let Ok(handle) = self.get(code).await {
            return Ok(handle);
        }

        let record = self
            .lookup
            .lookup(code)
            .await?
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;

        let mut rooms = self.rooms.lock().await;
        if let Some(handle) = rooms.get(code).filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        let handle = spawn_room(
            code.clone(),
            record,
            self.settings.clone(),
            Arc::clone(&self.lookup),
            Arc::clone(&self.words),
        );
        rooms.insert(code.clone(), handle.clone());
        tracing::info!(room = %code, rooms = rooms.len(), "room opened");
        Ok(handle)
    }

    /// Shuts a room's actor down and forgets it.
    pub async fn close(&self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .lock()
            .await
            .remove(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;
        let _ = handle.shutdown().await;
        tracing::info!(room = %code, "room closed");
        Ok(())
    }

    /// Number of rooms with a live actor. Stopped actors are pruned.
    pub async fn room_count(&self) -> usize {
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, h| !h.is_closed());
        rooms.len()
    }
}
