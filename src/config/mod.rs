//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::game::room_props::MapId;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Seconds between the countdown being published and the match going live
    pub pre_game_length_secs: u32,
    /// Match length written into newly created rooms
    pub default_match_length_secs: u32,
    /// Humans required before the countdown starts
    pub min_players_to_start: usize,
    /// Capacity of matchmade rooms (1-20)
    pub room_capacity: u8,

    /// Matchmaking retry budget
    pub max_join_attempts: u32,
    /// Per-attempt join timeout
    pub join_timeout: Duration,

    pub bot_respawn_delay_secs: u32,
    pub player_respawn_delay_secs: u32,

    /// Scoreboard refresh interval
    pub leaderboard_refresh: Duration,
    /// Rows shown on the leaderboard
    pub leaderboard_slots: usize,

    /// Document database base URL; in-memory profiles when unset
    pub profile_db_url: Option<String>,
    pub profile_db_auth: Option<String>,

    /// Simulated peers started by the binary
    pub sim_peers: usize,
    pub sim_map: MapId,
    /// Fixed seed for reproducible simulations
    pub sim_seed: Option<u64>,
    /// Seconds between simulated eliminations
    pub sim_elimination_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let room_capacity: u8 = parse_or(&lookup, "ROOM_CAPACITY", 20)?;
        if !(1..=20).contains(&room_capacity) {
            return Err(ConfigError::Invalid {
                key: "ROOM_CAPACITY",
                value: room_capacity.to_string(),
            });
        }

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            pre_game_length_secs: parse_or(&lookup, "PRE_GAME_LENGTH_SECS", 10)?,
            default_match_length_secs: parse_or(&lookup, "DEFAULT_MATCH_LENGTH_SECS", 600)?,
            min_players_to_start: parse_or(&lookup, "MIN_PLAYERS_TO_START", 1)?,
            room_capacity,

            max_join_attempts: parse_or(&lookup, "MAX_JOIN_ATTEMPTS", 50)?,
            join_timeout: Duration::from_millis(parse_or(&lookup, "JOIN_TIMEOUT_MS", 2000)?),

            bot_respawn_delay_secs: parse_or(&lookup, "BOT_RESPAWN_DELAY_SECS", 5)?,
            player_respawn_delay_secs: parse_or(&lookup, "PLAYER_RESPAWN_DELAY_SECS", 3)?,

            leaderboard_refresh: Duration::from_millis(parse_or(
                &lookup,
                "LEADERBOARD_REFRESH_MS",
                500,
            )?),
            leaderboard_slots: parse_or(&lookup, "LEADERBOARD_SLOTS", 10)?,

            profile_db_url: lookup("PROFILE_DB_URL").filter(|v| !v.is_empty()),
            profile_db_auth: lookup("PROFILE_DB_AUTH").filter(|v| !v.is_empty()),

            sim_peers: parse_or(&lookup, "SIM_PEERS", 3)?,
            sim_map: parse_or(&lookup, "SIM_MAP", MapId::Map1)?,
            sim_seed: lookup("SIM_SEED")
                .map(|v| parse_value("SIM_SEED", &v))
                .transpose()?,
            sim_elimination_interval: Duration::from_secs(parse_or(
                &lookup,
                "SIM_ELIMINATION_INTERVAL_SECS",
                4,
            )?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
