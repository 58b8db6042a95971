//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Gameplay constants that operators may tune
#[derive(Clone, Debug, PartialEq)]
pub struct GameTuning {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Snapshots per second sent to each client
    pub snapshot_rate: u32,
    /// Seconds between interaction focus scans
    pub interaction_check_frequency: f32,
    /// Maximum ray length of a focus scan
    pub interaction_check_distance: f32,
    /// Seconds a corpse stays lootable after death
    pub corpse_lifespan: f32,
    /// Corpse lifespan once someone starts looting it
    pub loot_source_lifespan: f32,
    pub max_players: usize,
}

impl Default for GameTuning {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            snapshot_rate: 20,
            interaction_check_frequency: 0.5,
            interaction_check_distance: 1000.0,
            corpse_lifespan: 20.0,
            loot_source_lifespan: 120.0,
            max_players: 32,
        }
    }
}

impl GameTuning {
    /// Simulation ticks between two snapshots
    pub fn snapshot_interval(&self) -> u32 {
        (self.tick_rate / self.snapshot_rate.max(1)).max(1)
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated, `*` for any
    pub client_origin: String,
    /// Optional JSON catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
    /// Seed for loot rolls and spawn points
    pub world_seed: u64,
    pub tuning: GameTuning,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = GameTuning::default();
        let tuning = GameTuning {
            tick_rate: parse_var("TICK_RATE", defaults.tick_rate)?,
            snapshot_rate: parse_var("SNAPSHOT_RATE", defaults.snapshot_rate)?,
            max_players: parse_var("MAX_PLAYERS", defaults.max_players)?,
            ..defaults
        };
        if tuning.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                var: "TICK_RATE",
                value: "0".to_string(),
            });
        }
        if tuning.snapshot_rate == 0 || tuning.snapshot_rate > tuning.tick_rate {
            return Err(ConfigError::Invalid {
                var: "SNAPSHOT_RATE",
                value: tuning.snapshot_rate.to_string(),
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            catalog_path: env::var("CATALOG_PATH").ok().map(PathBuf::from),
            world_seed: parse_var("WORLD_SEED", rand::random::<u64>())?,
            tuning,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_interval_from_rates() {
        assert_eq!(GameTuning::default().snapshot_interval(), 1);
        let tuning = GameTuning {
            tick_rate: 60,
            snapshot_rate: 20,
            ..GameTuning::default()
        };
        assert_eq!(tuning.snapshot_interval(), 3);
    }

    #[test]
    fn unparsable_values_are_reported() {
        let err = parse_var::<u32>("SURVIVAL_TEST_UNSET_VAR", 7);
        assert_eq!(err.ok(), Some(7));
    }
}
