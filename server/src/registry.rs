use std::collections::HashMap;
use tokio::time::Instant;

use plaza_shared::vec3::Vec3;

use crate::error::RegistryError;
use crate::player::{Player, PlayerId};
use crate::rate_limit::RateState;

/// One connection's slot: the player and its rate state are created and
/// dropped together.
#[derive(Debug, Clone)]
struct Entry {
    pub player: Player,
    pub rate: RateState,
}

/// Authoritative table of connected players. Owned by the world loop task,
/// which serializes every access.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    entries: HashMap<PlayerId, Entry>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player with fresh rate state. A second registration of the
    /// same id is an invariant violation: it is logged and overwritten.
    pub fn register(
        &mut self,
        id: PlayerId,
        nickname: String,
        character_type: u32,
        position: Vec3,
        rotation: f64,
        now: Instant,
    ) -> Player {
        let player = Player {
            id,
            nickname,
            character_type,
            position,
            rotation,
            last_update_at: now,
            last_moved_at: now,
        };
        let entry = Entry {
            player: player.clone(),
            rate: RateState::new(now),
        };
        if self.entries.insert(id, entry).is_some() {
            tracing::error!("{}; overwriting entry", RegistryError::DuplicateId(id));
        }
        player
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.entries.get(&id).map(|e| &e.player)
    }

    pub fn rate_state_mut(&mut self, id: PlayerId) -> Option<&mut RateState> {
        self.entries.get_mut(&id).map(|e| &mut e.rate)
    }

    /// Store an accepted transform and refresh liveness.
    pub fn update(
        &mut self,
        id: PlayerId,
        position: Vec3,
        rotation: f64,
        now: Instant,
    ) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownPlayer(id))?;
        entry.player.position = position;
        entry.player.rotation = rotation;
        entry.player.last_update_at = now;
        entry.player.last_moved_at = now;
        Ok(())
    }

    /// Refresh liveness without changing the transform.
    pub fn touch(&mut self, id: PlayerId, now: Instant) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownPlayer(id))?;
        entry.player.last_update_at = now;
        Ok(())
    }

    /// Remove a player and its rate state. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.entries.remove(&id).map(|e| e.player)
    }

    pub fn all(&self) -> impl Iterator<Item = &Player> {
        self.entries.values().map(|e| &e.player)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
