use anyhow::{Context, Result};
use std::path::Path;

pub use plaza_shared::config::WorldConfig;

/// Environment variable naming a JSON config file
pub const CONFIG_PATH_ENV: &str = "PLAZA_CONFIG";
/// Environment variable overriding the listen address
pub const LISTEN_ADDR_ENV: &str = "PLAZA_LISTEN_ADDR";

/// Server configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Seed for spawn placement
    pub rng_seed: u64,
    /// Events buffered per connection before the oldest are dropped
    pub broadcast_capacity: usize,
    /// Text frames larger than this close the connection
    pub max_message_bytes: usize,
    /// Unparseable frames tolerated before the connection is closed
    pub max_parse_errors: u32,
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".to_string(),
            rng_seed: 42,
            broadcast_capacity: 256,
            max_message_bytes: 1024,
            max_parse_errors: 5,
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with the file named by `PLAZA_CONFIG` and then
    /// `PLAZA_LISTEN_ADDR`.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Ok(addr) = std::env::var(LISTEN_ADDR_ENV) {
            config.listen_addr = addr;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be > 0".to_string());
        }
        if self.max_message_bytes == 0 {
            return Err("max_message_bytes must be > 0".to_string());
        }
        self.world.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_broadcast_capacity_invalid() {
        let config = ServerConfig {
            broadcast_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_world_config_is_reported() {
        let mut config = ServerConfig::default();
        config.world.max_velocity = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn nested_world_options_parse() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"listenAddr":"127.0.0.1:7000","world":{"heartbeatTimeoutMs":2500}}"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.world.heartbeat_timeout_ms, 2500);
        assert_eq!(config.world.max_update_rate_per_second, 20);
        assert_eq!(config.max_parse_errors, 5);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/plaza.json")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
