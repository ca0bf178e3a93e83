//! Match core: lifecycle, scoring and bots

pub mod bots;
pub mod combat;
pub mod r#match;
pub mod participants;
pub mod room_props;
pub mod scheduler;
pub mod snapshot;
pub mod spawn;

pub use bots::{BotError, BotLifecycleCoordinator, BotSettings};
pub use r#match::{MatchCoordinator, MatchEffect, MatchError, MatchPhase, MatchSettings};
pub use participants::ParticipantRegistry;
pub use room_props::{MapId, RoomProperties, RoomPropertyStore};
pub use snapshot::{GameOverSummary, ScoreboardSnapshot};
