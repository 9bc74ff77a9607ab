//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::items::ItemSettings;
use crate::game::GameSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines (`LOG_FORMAT=json`)
    pub log_json: bool,
    /// Allowed client origins for CORS, comma-separated, `*` for any
    pub client_origin: String,

    /// Humans needed before the queue starts a match
    pub min_players: usize,
    /// Seconds the oldest queued player waits before bots fill the match
    pub queue_max_wait_secs: u64,

    /// Per-match simulation settings
    pub game: GameSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let game = GameSettings {
            grid_size: parse(&lookup, "GRID_SIZE", 32)?,
            capacity: parse(&lookup, "MATCH_CAPACITY", 10)?,
            zombie_ratio: parse(&lookup, "ZOMBIE_RATIO", 0.2)?,
            match_duration_ms: parse_secs_as_ms(&lookup, "MATCH_DURATION_SECS", 180)?,
            infection_bonus_ms: parse_secs_as_ms(&lookup, "INFECTION_BONUS_SECS", 5)?,
            tick_ms: parse(&lookup, "TICK_MS", 100)?,
            items: ItemSettings {
                spawn_interval_ms: parse(&lookup, "ITEM_SPAWN_INTERVAL_MS", 8_000)?,
                spawn_variance_ms: parse(&lookup, "ITEM_SPAWN_VARIANCE_MS", 3_000)?,
                max_items: parse(&lookup, "MAX_ITEMS", 6)?,
            },
        };

        if game.grid_size < 1 {
            return Err(ConfigError::Invalid("GRID_SIZE"));
        }
        if game.capacity < 1 {
            return Err(ConfigError::Invalid("MATCH_CAPACITY"));
        }
        if !(0.0..=1.0).contains(&game.zombie_ratio) {
            return Err(ConfigError::Invalid("ZOMBIE_RATIO"));
        }
        if game.tick_ms == 0 {
            return Err(ConfigError::Invalid("TICK_MS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),

            min_players: parse(&lookup, "MIN_PLAYERS", 2)?,
            queue_max_wait_secs: parse(&lookup, "QUEUE_MAX_WAIT_SECS", 20)?,

            game,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_secs_as_ms<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse::<u64, _>(lookup, key, default)?
        .checked_mul(1_000)
        .ok_or(ConfigError::Invalid(key))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).expect("defaults are valid");
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.client_origin, "*");
        assert_eq!(config.game.grid_size, 32);
        assert_eq!(config.game.capacity, 10);
        assert_eq!(config.game.match_duration_ms, 180_000);
        assert_eq!(config.game.infection_bonus_ms, 5_000);
        assert_eq!(config.game.items.max_items, 6);
        assert_eq!(config.min_players, 2);
        assert!(!config.log_json);
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:7000")]).expect("valid");
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn bad_values_name_the_variable() {
        assert!(matches!(
            load(&[("GRID_SIZE", "huge")]),
            Err(ConfigError::Invalid("GRID_SIZE"))
        ));
        assert!(matches!(
            load(&[("ZOMBIE_RATIO", "1.5")]),
            Err(ConfigError::Invalid("ZOMBIE_RATIO"))
        ));
        assert!(matches!(
            load(&[("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
        assert!(matches!(
            load(&[("MATCH_DURATION_SECS", "18446744073709552")]),
            Err(ConfigError::Invalid("MATCH_DURATION_SECS"))
        ));
        assert!(matches!(
            load(&[("INFECTION_BONUS_SECS", "18446744073709552")]),
            Err(ConfigError::Invalid("INFECTION_BONUS_SECS"))
        ));
    }
}
