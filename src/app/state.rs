//! Application state shared by every peer session

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::game::spawn::{FlatNavSurface, NavSurface, SpawnLayout};
use crate::game::{BotSettings, MatchSettings};
use crate::matchmaking::SearchSettings;
use crate::relay::LocalRelayHub;
use crate::store::ProfileStore;

/// Explicitly constructed services; one per process
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: LocalRelayHub,
    pub profile_store: ProfileStore,
    pub spawn_layout: Arc<SpawnLayout>,
    pub nav: Arc<dyn NavSurface>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let profile_store = ProfileStore::from_config(&config);
        Self::with_store(config, profile_store)
    }

    pub fn with_store(config: Config, profile_store: ProfileStore) -> Self {
        let nav: Arc<dyn NavSurface> = Arc::new(FlatNavSurface {
            min_x: -60.0,
            max_x: 60.0,
            min_z: -60.0,
            max_z: 60.0,
            ground_y: 0.0,
        });
        Self {
            config: Arc::new(config),
            hub: LocalRelayHub::new(),
            profile_store,
            spawn_layout: Arc::new(SpawnLayout::simulated()),
            nav,
        }
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            pre_game_length: self.config.pre_game_length_secs as f64,
            min_players: self.config.min_players_to_start,
            default_match_length: self.config.default_match_length_secs,
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            max_attempts: self.config.max_join_attempts,
            join_timeout: self.config.join_timeout,
            room_capacity: self.config.room_capacity,
            match_length: self.config.default_match_length_secs,
        }
    }

    pub fn bot_settings(&self) -> BotSettings {
        BotSettings {
            respawn_delay: self.config.bot_respawn_delay_secs as f64,
            ..BotSettings::default()
        }
    }

    pub fn player_respawn_delay(&self) -> Duration {
        Duration::from_secs(self.config.player_respawn_delay_secs as u64)
    }
}
