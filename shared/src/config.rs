/// World rules shared by the server and clients.
///
/// Distances are in world units, durations in milliseconds. Every field has a
/// default so partial JSON config files are accepted.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase", default)]
pub struct WorldConfig {
    /// Accepted moves per one-second window, per connection
    pub max_update_rate_per_second: u32,
    /// Minimum gap between two accepted moves from one connection
    pub min_update_interval_ms: u32,
    /// Radius of the walkable disc around the origin
    pub max_position_radius: f64,
    /// Plausible locomotion speed (units per second)
    pub max_velocity: f64,
    /// Jumps up to this distance are never treated as speed hacks
    pub small_hop_distance: f64,
    /// Jumps of at least this distance are legitimate teleports/respawns
    pub teleport_distance: f64,
    pub heartbeat_timeout_ms: u32,
    pub liveness_sweep_interval_ms: u32,
    /// Full snapshot period; 0 disables snapshots
    pub state_sync_interval_ms: u32,
    /// Players spawn within this radius of the origin
    pub spawn_radius: f64,
    /// Height used when a client reports y = 0 or garbage
    pub default_stand_height: f64,
    pub nickname_max_length: u32,
    pub character_type_count: u32,
    /// Position change below this is not worth a broadcast
    pub position_epsilon: f64,
    /// Yaw change (radians) below this is not worth a broadcast
    pub rotation_epsilon: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_update_rate_per_second: 20,
            min_update_interval_ms: 50,
            max_position_radius: 150.0,
            max_velocity: 30.0,
            small_hop_distance: 5.0,
            teleport_distance: 20.0,
            heartbeat_timeout_ms: 10_000,
            liveness_sweep_interval_ms: 5_000,
            state_sync_interval_ms: 150,
            spawn_radius: 20.0,
            default_stand_height: 1.0,
            nickname_max_length: 12,
            character_type_count: 3,
            position_epsilon: 0.001,
            rotation_epsilon: 0.001,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_update_rate_per_second == 0 {
            return Err("max_update_rate_per_second must be > 0".to_string());
        }
        if !self.max_position_radius.is_finite() || self.max_position_radius <= 0.0 {
            return Err("max_position_radius must be finite and > 0".to_string());
        }
        if !self.max_velocity.is_finite() || self.max_velocity <= 0.0 {
            return Err("max_velocity must be finite and > 0".to_string());
        }
        if !self.small_hop_distance.is_finite() || self.small_hop_distance < 0.0 {
            return Err("small_hop_distance must be finite and >= 0".to_string());
        }
        if !self.teleport_distance.is_finite() || self.teleport_distance < self.small_hop_distance
        {
            return Err("teleport_distance must be finite and >= small_hop_distance".to_string());
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err("heartbeat_timeout_ms must be > 0".to_string());
        }
        if self.liveness_sweep_interval_ms == 0 {
            return Err("liveness_sweep_interval_ms must be > 0".to_string());
        }
        if !self.spawn_radius.is_finite()
            || self.spawn_radius < 0.0
            || self.spawn_radius > self.max_position_radius
        {
            return Err("spawn_radius must be within [0, max_position_radius]".to_string());
        }
        if !self.default_stand_height.is_finite() {
            return Err("default_stand_height must be finite".to_string());
        }
        if self.nickname_max_length == 0 {
            return Err("nickname_max_length must be > 0".to_string());
        }
        if self.character_type_count == 0 {
            return Err("character_type_count must be > 0".to_string());
        }
        if !self.position_epsilon.is_finite() || self.position_epsilon < 0.0 {
            return Err("position_epsilon must be finite and >= 0".to_string());
        }
        if !self.rotation_epsilon.is_finite() || self.rotation_epsilon < 0.0 {
            return Err("rotation_epsilon must be finite and >= 0".to_string());
        }
        Ok(())
    }
}
