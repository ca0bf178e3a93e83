//! Player record persistence

pub mod ownership;
pub mod profiles;
pub mod realtime_db;

pub use ownership::{ItemCategory, OwnershipSet, PurchaseOutcome};
pub use profiles::{MatchResult, PlayerRecord, ProfileStore, StoreError};
pub use realtime_db::RealtimeDbClient;
