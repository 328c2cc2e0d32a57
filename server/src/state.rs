use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use plaza_shared::vec3::Vec3;

use crate::config::WorldConfig;
use crate::error::JoinError;
use crate::liveness::LivenessMonitor;
use crate::player::{normalize_nickname, validate_character_type, Player, PlayerId};
use crate::protocol::{
    snapshot_entry, CurrentPlayersMsg, JoinMsg, PlayerMoveMsg, PlayerMovedMsg, PlayerWire,
    StateSnapshotMsg, PROTOCOL_VERSION,
};
use crate::rate_limit::{Admission, DenyReason, RateLimiter};
use crate::registry::PlayerRegistry;
use crate::validator::MoveValidator;

/// A successful join: the new player and the full roster to hand to it.
#[derive(Debug, Clone)]
pub struct Joined {
    pub player: Player,
    pub current_players: CurrentPlayersMsg,
}

/// What happened to one reported move.
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    /// Accepted and worth broadcasting
    Moved(PlayerMovedMsg),
    /// Accepted but too small to broadcast (or position refused, rotation same)
    Unchanged,
    RateLimited(DenyReason),
    UnknownPlayer,
}

/// Central world state owned by the world loop task.
pub struct WorldState {
    pub registry: PlayerRegistry,
    pub config: WorldConfig,
    limiter: RateLimiter,
    liveness: LivenessMonitor,
    rng: ChaCha8Rng,
    next_player_id: PlayerId,
    clock_origin: Instant,
    unix_origin_ms: u64,
}

impl WorldState {
    pub fn new(config: WorldConfig, rng_seed: u64) -> Self {
        use rand::SeedableRng;
        let unix_origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            registry: PlayerRegistry::new(),
            limiter: RateLimiter::from_config(&config),
            liveness: LivenessMonitor::from_config(&config),
            config,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            next_player_id: 1,
            clock_origin: Instant::now(),
            unix_origin_ms,
        }
    }

    /// Validate a join request and, if it passes, register a freshly spawned
    /// player. Nothing is mutated on failure.
    pub fn join(&mut self, request: &JoinMsg, now: Instant) -> Result<Joined, JoinError> {
        let nickname =
            normalize_nickname(request.nickname.as_deref(), self.config.nickname_max_length)?;
        let character_type =
            validate_character_type(request.character_type, self.config.character_type_count)?;

        let id = self.next_player_id;
        self.next_player_id += 1;

        let (position, rotation) = self.spawn_point();
        let player = self
            .registry
            .register(id, nickname, character_type, position, rotation, now);

        Ok(Joined {
            current_players: self.current_players(id),
            player,
        })
    }

    /// Random point on the spawn disc at stand height, facing a random way.
    fn spawn_point(&mut self) -> (Vec3, f64) {
        let r = self.config.spawn_radius * self.rng.gen::<f64>().sqrt();
        let bearing = self.rng.gen_range(0.0..TAU);
        let yaw = self.rng.gen_range(0.0..TAU);
        let position = Vec3::new(
            r * bearing.cos(),
            self.config.default_stand_height,
            r * bearing.sin(),
        );
        (position, yaw)
    }

    /// Roster sent to a joining connection.
    pub fn current_players(&self, self_id: PlayerId) -> CurrentPlayersMsg {
        CurrentPlayersMsg {
            protocol_version: PROTOCOL_VERSION,
            self_id,
            players: self
                .registry
                .all()
                .map(|p| (p.id.to_string(), PlayerWire::from(p)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Rate limit, validate, and store one move.
    pub fn apply_move(&mut self, id: PlayerId, claim: &PlayerMoveMsg, now: Instant) -> MoveOutcome {
        let Some(rate) = self.registry.rate_state_mut(id) else {
            tracing::debug!("Dropping move for unknown player {}", id);
            return MoveOutcome::UnknownPlayer;
        };

        if let Admission::Deny(reason) = self.limiter.admit(rate, now) {
            tracing::trace!("Rate limited move from player {}: {:?}", id, reason);
            return MoveOutcome::RateLimited(reason);
        }

        let Some(previous) = self.registry.get(id) else {
            return MoveOutcome::UnknownPlayer;
        };
        let validated = MoveValidator::new(&self.config).validate(previous, claim, now);
        if validated.position_rejected {
            tracing::debug!("Refused implausible jump from player {}", id);
        }

        if let Err(e) = self
            .registry
            .update(id, validated.position, validated.rotation, now)
        {
            tracing::debug!("Dropping move: {}", e);
            return MoveOutcome::UnknownPlayer;
        }

        if !validated.significant {
            return MoveOutcome::Unchanged;
        }
        match self.registry.get(id) {
            Some(player) => MoveOutcome::Moved(PlayerMovedMsg::from(player)),
            None => MoveOutcome::UnknownPlayer,
        }
    }

    /// Keep an idle player alive. Returns false for unknown ids.
    pub fn heartbeat(&mut self, id: PlayerId, now: Instant) -> bool {
        match self.registry.touch(id, now) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Ignoring heartbeat: {}", e);
                false
            }
        }
    }

    /// Remove a player. Safe to call any number of times.
    pub fn leave(&mut self, id: PlayerId) -> Option<Player> {
        self.registry.remove(id)
    }

    /// Evict every player silent for longer than the heartbeat timeout.
    pub fn evict_stale(&mut self, now: Instant) -> Vec<Player> {
        self.liveness.sweep(&mut self.registry, now)
    }

    /// Full state of every player, or `None` when nobody is connected.
    pub fn snapshot(&self) -> Option<StateSnapshotMsg> {
        if self.registry.is_empty() {
            return None;
        }
        Some(StateSnapshotMsg {
            players: self
                .registry
                .all()
                .map(|p| snapshot_entry(p, self.unix_millis(p.last_update_at)))
                .collect(),
        })
    }

    pub fn is_joined(&self, id: PlayerId) -> bool {
        self.registry.get(id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    pub fn liveness_sweep_interval(&self) -> Duration {
        self.liveness.sweep_interval
    }

    /// `None` when periodic snapshots are disabled.
    pub fn snapshot_interval(&self) -> Option<Duration> {
        match self.config.state_sync_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    fn unix_millis(&self, at: Instant) -> u64 {
        self.unix_origin_ms + at.saturating_duration_since(self.clock_origin).as_millis() as u64
    }
}
