//! Sanity checks for client-reported transforms.
//!
//! Heuristic only: it bounds the damage a buggy or mildly hostile client can
//! do, it does not simulate movement. Shape and bounds problems are corrected
//! in place; only implausible mid-range jumps are refused, and even then the
//! rotation part of the update is kept.

use std::time::Duration;
use tokio::time::Instant;

use plaza_shared::config::WorldConfig;
use plaza_shared::protocol::PlayerMoveMsg;
use plaza_shared::vec3::{self, Vec3};

use crate::player::Player;

/// Floor for the elapsed time used in speed estimates.
const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Result of validating one reported move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedMove {
    pub position: Vec3,
    pub rotation: f64,
    /// The positional part was refused; `position` is the stored one
    pub position_rejected: bool,
    /// Differs enough from the stored state to be broadcast
    pub significant: bool,
}

pub struct MoveValidator<'a> {
    config: &'a WorldConfig,
}

impl<'a> MoveValidator<'a> {
    pub fn new(config: &'a WorldConfig) -> Self {
        Self { config }
    }

    /// Replace missing fields, lift y = 0 to stand height, and clamp onto the
    /// world disc. Never fails.
    pub fn normalize(&self, claim: &PlayerMoveMsg) -> (Vec3, f64) {
        let stand = self.config.default_stand_height;
        let x = claim.x.filter(|v| v.is_finite()).unwrap_or(0.0);
        let z = claim.z.filter(|v| v.is_finite()).unwrap_or(0.0);
        let ry = claim.ry.filter(|v| v.is_finite()).unwrap_or(0.0);
        let y = match claim.y.filter(|v| v.is_finite()) {
            // Clients report 0 before their avatar is grounded
            Some(y) if y == 0.0 => stand,
            Some(y) => y,
            None => stand,
        };

        let position = vec3::clamp_planar(Vec3::new(x, y, z), self.config.max_position_radius);
        (position, ry)
    }

    /// Validate a move for `previous`, arriving at `now`. Speed is measured
    /// from the previous accepted move, not from the last heartbeat.
    pub fn validate(&self, previous: &Player, claim: &PlayerMoveMsg, now: Instant) -> ValidatedMove {
        let (mut position, rotation) = self.normalize(claim);

        let dist = vec3::distance(position, previous.position);
        let elapsed = now
            .saturating_duration_since(previous.last_moved_at)
            .max(MIN_ELAPSED);
        let speed = dist / elapsed.as_secs_f64();

        let position_rejected = speed > self.config.max_velocity
            && dist > self.config.small_hop_distance
            && dist < self.config.teleport_distance;
        if position_rejected {
            position = previous.position;
        }

        let moved = vec3::distance(position, previous.position) > self.config.position_epsilon;
        let turned = vec3::angle_delta(rotation, previous.rotation) > self.config.rotation_epsilon;

        ValidatedMove {
            position,
            rotation,
            position_rejected,
            significant: moved || turned,
        }
    }
}
