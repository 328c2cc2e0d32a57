//! Eviction of connections that stopped sending without closing.

use std::time::Duration;
use tokio::time::Instant;

use plaza_shared::config::WorldConfig;

use crate::player::{Player, PlayerId};
use crate::registry::PlayerRegistry;

#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    pub sweep_interval: Duration,
    pub timeout: Duration,
}

impl LivenessMonitor {
    pub fn from_config(config: &WorldConfig) -> Self {
        Self {
            sweep_interval: Duration::from_millis(config.liveness_sweep_interval_ms as u64),
            timeout: Duration::from_millis(config.heartbeat_timeout_ms as u64),
        }
    }

    /// Ids whose last update is older than the timeout.
    pub fn stale_ids(&self, registry: &PlayerRegistry, now: Instant) -> Vec<PlayerId> {
        registry
            .all()
            .filter(|p| now.saturating_duration_since(p.last_update_at) > self.timeout)
            .map(|p| p.id)
            .collect()
    }

    /// Remove every stale player and return them.
    pub fn sweep(&self, registry: &mut PlayerRegistry, now: Instant) -> Vec<Player> {
        self.stale_ids(registry, now)
            .into_iter()
            .filter_map(|id| registry.remove(id))
            .collect()
    }
}
