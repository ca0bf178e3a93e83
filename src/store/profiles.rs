//! Persistent player records

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::ownership::{purchase, ItemCategory, PurchaseOutcome};
use super::realtime_db::{DbError, RealtimeDbClient};

/// Coins earned per kill at match end
pub const COINS_PER_KILL: u32 = 2;

fn default_user_name() -> String {
    "Player".to_string()
}

fn default_owned() -> String {
    "1".to_string()
}

fn default_guns_owned() -> String {
    "11".to_string()
}

fn default_secondary_gun() -> i32 {
    1
}

/// The per-account document. Field names are the stored keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub coins: u32,
    #[serde(default)]
    pub matches_played: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub is_premium: bool,

    #[serde(rename = "headID", default)]
    pub head_id: i32,
    #[serde(rename = "helmetID", default)]
    pub helmet_id: i32,
    #[serde(rename = "vestID", default)]
    pub vest_id: i32,
    #[serde(default = "default_owned")]
    pub heads_owned: String,
    #[serde(default = "default_owned")]
    pub helmets_owned: String,
    #[serde(default = "default_owned")]
    pub vests_owned: String,

    #[serde(rename = "primaryGunID", default)]
    pub primary_gun_id: i32,
    #[serde(rename = "secondaryGunID", default = "default_secondary_gun")]
    pub secondary_gun_id: i32,
    #[serde(default = "default_guns_owned")]
    pub guns_owned: String,

    #[serde(rename = "ach_FirstBlood", default)]
    pub ach_first_blood: bool,
}

impl Default for PlayerRecord {
    /// Values a loaded record takes for missing fields
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            kills: 0,
            deaths: 0,
            coins: 0,
            matches_played: 0,
            wins: 0,
            is_premium: false,
            head_id: 0,
            helmet_id: 0,
            vest_id: 0,
            heads_owned: default_owned(),
            helmets_owned: default_owned(),
            vests_owned: default_owned(),
            primary_gun_id: 0,
            secondary_gun_id: default_secondary_gun(),
            guns_owned: default_guns_owned(),
            ach_first_blood: false,
        }
    }
}

impl PlayerRecord {
    /// A freshly registered account: no helmet or vest equipped
    pub fn new_account() -> Self {
        Self {
            helmet_id: -1,
            vest_id: -1,
            ..Self::default()
        }
    }

    /// Fold one finished match into the lifetime stats
    pub fn apply_match(&mut self, result: &MatchResult) {
        self.kills = self.kills.saturating_add(result.kills);
        self.deaths = self.deaths.saturating_add(result.deaths);
        self.coins = self
            .coins
            .saturating_add(result.kills.saturating_mul(COINS_PER_KILL));
        self.matches_played = self.matches_played.saturating_add(1);
        if result.won {
            self.wins = self.wins.saturating_add(1);
        }
    }
}

/// One human's stats from a finished match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub kills: u32,
    pub deaths: u32,
    /// Finished first with a positive score
    pub won: bool,
}

/// Display name for the local player: the profile name, or a random guest name
pub fn resolve_nickname<R: Rng>(record: Option<&PlayerRecord>, rng: &mut R) -> String {
    match record {
        Some(r) if !r.user_name.trim().is_empty() => r.user_name.clone(),
        _ => format!("Guest_{}", rng.gen_range(1000..10000)),
    }
}

/// Profile store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Clone)]
enum Backend {
    Remote(RealtimeDbClient),
    Memory(Arc<DashMap<String, PlayerRecord>>),
}

/// Profile store operations
#[derive(Clone)]
pub struct ProfileStore {
    backend: Backend,
}

impl ProfileStore {
    pub fn remote(client: RealtimeDbClient) -> Self {
        Self {
            backend: Backend::Remote(client),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    /// Remote store when a database URL is configured, otherwise in-memory
    pub fn from_config(config: &Config) -> Self {
        match &config.profile_db_url {
            Some(url) => {
                info!(url = %url, "Using remote profile store");
                Self::remote(RealtimeDbClient::new(url, config.profile_db_auth.clone()))
            }
            None => {
                info!("PROFILE_DB_URL not set, keeping profiles in memory");
                Self::in_memory()
            }
        }
    }

    fn document_path(account: &str) -> String {
        format!("users/{}", account)
    }

    /// Get a player record by account id
    pub async fn load(&self, account: &str) -> Result<Option<PlayerRecord>, StoreError> {
        match &self.backend {
            Backend::Remote(db) => Ok(db.get(&Self::document_path(account)).await?),
            Backend::Memory(map) => Ok(map.get(account).map(|r| r.value().clone())),
        }
    }

    /// Replace a player record
    pub async fn save(&self, account: &str, record: &PlayerRecord) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Remote(db) => db.put(&Self::document_path(account), record).await?,
            Backend::Memory(map) => {
                map.insert(account.to_string(), record.clone());
            }
        }
        debug!(account, "Player record saved");
        Ok(())
    }

    /// Get or create the record (ensures it exists)
    pub async fn load_or_create(&self, account: &str) -> Result<PlayerRecord, StoreError> {
        match self.load(account).await? {
            Some(record) => Ok(record),
            None => {
                let record = PlayerRecord::new_account();
                self.save(account, &record).await?;
                info!(account, "Created player record");
                Ok(record)
            }
        }
    }

    /// Add a finished match to the account. Not retried; the caller decides what a failure means.
    pub async fn record_match(
        &self,
        account: &str,
        result: &MatchResult,
    ) -> Result<PlayerRecord, StoreError> {
        let mut record = self.load_or_create(account).await?;
        record.apply_match(result);
        self.save(account, &record).await?;
        info!(
            account,
            kills = result.kills,
            deaths = result.deaths,
            won = result.won,
            coins = record.coins,
            "Match stats saved"
        );
        Ok(record)
    }

    /// Spend coins on a catalog item; the record is only written when the purchase goes through
    pub async fn purchase_item(
        &self,
        account: &str,
        category: ItemCategory,
        index: usize,
        price: u32,
        catalog_len: usize,
    ) -> Result<PurchaseOutcome, StoreError> {
        let mut record = self.load_or_create(account).await?;
        let outcome = purchase(&mut record, category, index, price, catalog_len);
        match &outcome {
            PurchaseOutcome::Purchased { .. } => self.save(account, &record).await?,
            other => warn!(account, ?category, index, outcome = ?other, "Purchase refused"),
        }
        Ok(outcome)
    }
}
