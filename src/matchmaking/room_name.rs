//! Room keys and creation options for matchmade and custom rooms

use crate::game::room_props::{MapId, RoomProperties, PROP_MATCH_LENGTH};
use crate::relay::RoomOptions;

use super::service::MatchmakingError;

/// Capacity used when the custom-room player count doesn't parse
pub const DEFAULT_CUSTOM_CAPACITY: u8 = 10;
/// Match minutes used when the custom-room duration doesn't parse
pub const DEFAULT_CUSTOM_MINUTES: u32 = 10;
/// Hard room capacity limit
pub const MAX_ROOM_CAPACITY: u8 = 20;

/// `<prefix>_Match` for attempt 0, `<prefix>_Match_<n>` afterwards
pub fn candidate_room_name(prefix: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{prefix}_Match")
    } else {
        format!("{prefix}_Match_{attempt}")
    }
}

/// Options for a room created through join-or-create
pub fn room_options(map: MapId, capacity: u8, match_length: u32) -> RoomOptions {
    RoomOptions {
        capacity: capacity.clamp(1, MAX_ROOM_CAPACITY),
        visible: true,
        open: true,
        initial_properties: RoomProperties::initial(map, match_length).to_wire(),
        lobby_properties: vec![PROP_MATCH_LENGTH.to_string()],
    }
}

/// A validated request for a user-named room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRoomRequest {
    pub name: String,
    pub capacity: u8,
    /// Seconds
    pub match_length: u32,
}

impl CustomRoomRequest {
    /// Parse the lobby form. Bad numbers fall back to defaults; only an empty name is an error.
    pub fn parse(name: &str, max_players: &str, minutes: &str) -> Result<Self, MatchmakingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MatchmakingError::InvalidRoomName);
        }
        let capacity = max_players
            .trim()
            .parse::<u8>()
            .unwrap_or(DEFAULT_CUSTOM_CAPACITY)
            .clamp(1, MAX_ROOM_CAPACITY);
        let minutes = minutes
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_CUSTOM_MINUTES);
        Ok(Self {
            name: name.to_string(),
            capacity,
            match_length: minutes.saturating_mul(60),
        })
    }

    pub fn options(&self, map: MapId) -> RoomOptions {
        room_options(map, self.capacity, self.match_length)
    }
}
