//! Room discovery and creation

pub mod room_name;
pub mod service;

pub use room_name::{candidate_room_name, CustomRoomRequest};
pub use service::{MatchmakingError, MatchmakingSearch, SearchSettings};
