//! Typed views over the replicated room and participant property stores
//!
//! Wire keys and enum strings must match the peers we share rooms with exactly.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::relay::{AuthorityToken, PropertyMap, RelayError, RelayTransport};

pub const PROP_MAP: &str = "Map";
pub const PROP_MATCH_STATE: &str = "MatchState";
pub const PROP_PRE_END: &str = "PreGameEnd";
pub const PROP_MATCH_END: &str = "MatchEnd";
pub const PROP_MATCH_LENGTH: &str = "MatchLength";

pub const PROP_KILLS: &str = "kills";
pub const PROP_DEATHS: &str = "deaths";
pub const PROP_SCORE: &str = "score";
pub const PROP_ALIVE: &str = "alive";

/// Playable maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapId {
    Map1,
    Map2,
}

impl MapId {
    /// Matchmaking room-key prefix
    pub fn room_prefix(self) -> &'static str {
        match self {
            MapId::Map1 => "Global_Map1",
            MapId::Map2 => "Global_Map2",
        }
    }
}

impl std::str::FromStr for MapId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Map1" | "map1" | "1" => Ok(MapId::Map1),
            "Map2" | "map2" | "2" => Ok(MapId::Map2),
            other => Err(format!("unknown map {other}")),
        }
    }
}

/// Room-level match state; only ever moves Waiting -> Started
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomMatchState {
    Waiting,
    Started,
}

/// Replicated room properties; `None` means the key is absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomProperties {
    #[serde(rename = "Map", default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapId>,
    #[serde(rename = "MatchState", default, skip_serializing_if = "Option::is_none")]
    pub match_state: Option<RoomMatchState>,
    #[serde(rename = "PreGameEnd", default, skip_serializing_if = "Option::is_none")]
    pub pre_game_end: Option<f64>,
    #[serde(rename = "MatchEnd", default, skip_serializing_if = "Option::is_none")]
    pub match_end: Option<f64>,
    #[serde(rename = "MatchLength", default, skip_serializing_if = "Option::is_none")]
    pub match_length: Option<u32>,
}

impl RoomProperties {
    /// Initial properties of a freshly created room
    pub fn initial(map: MapId, match_length: u32) -> Self {
        Self {
            map: Some(map),
            match_state: Some(RoomMatchState::Waiting),
            match_length: Some(match_length),
            ..Self::default()
        }
    }

    /// Decode from the wire. Keys with malformed values are logged and treated as absent.
    pub fn from_wire(map: &PropertyMap) -> Self {
        Self {
            map: field(map, PROP_MAP),
            match_state: field(map, PROP_MATCH_STATE),
            pre_game_end: field(map, PROP_PRE_END),
            match_end: field(map, PROP_MATCH_END),
            match_length: field(map, PROP_MATCH_LENGTH),
        }
    }

    /// Encode only the present fields
    pub fn to_wire(&self) -> PropertyMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => PropertyMap::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.match_state == Some(RoomMatchState::Started)
    }
}

/// Per-participant scoring keys; absent keys read as zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    /// Absent reads as alive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
}

impl ParticipantProperties {
    pub fn from_wire(map: &PropertyMap) -> Self {
        Self {
            kills: field(map, PROP_KILLS),
            deaths: field(map, PROP_DEATHS),
            score: field(map, PROP_SCORE),
            alive: field(map, PROP_ALIVE),
        }
    }

    pub fn to_wire(&self) -> PropertyMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => PropertyMap::new(),
        }
    }

    pub fn kills(&self) -> u32 {
        self.kills.unwrap_or(0)
    }

    pub fn deaths(&self) -> u32 {
        self.deaths.unwrap_or(0)
    }

    pub fn score(&self) -> u32 {
        self.score.unwrap_or(0)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.unwrap_or(true)
    }
}

fn field<T: DeserializeOwned>(map: &PropertyMap, key: &str) -> Option<T> {
    let value = map.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %value, error = %e, "Ignoring malformed replicated property");
            None
        }
    }
}

/// Room property store errors
#[derive(Debug, thiserror::Error)]
pub enum RoomPropertyError {
    #[error("MatchState cannot move from Started back to Waiting")]
    Regression,

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Read/write access to the room's replicated properties
pub struct RoomPropertyStore;

impl RoomPropertyStore {
    /// Current room properties, or None outside a room
    pub fn read<T: RelayTransport>(relay: &T) -> Option<RoomProperties> {
        relay
            .current_room()
            .map(|room| RoomProperties::from_wire(&room.properties))
    }

    /// Publish a partial update. Authority-only; never lets MatchState regress.
    pub fn publish<T: RelayTransport>(
        relay: &T,
        token: &AuthorityToken,
        update: &RoomProperties,
    ) -> Result<(), RoomPropertyError> {
        if update.match_state == Some(RoomMatchState::Waiting) {
            let current = Self::read(relay).ok_or(RelayError::NotInRoom)?;
            if current.is_started() {
                return Err(RoomPropertyError::Regression);
            }
        }
        relay.set_room_properties(token, update.to_wire())?;
        Ok(())
    }

    /// Properties of the local participant
    pub fn local_participant<T: RelayTransport>(relay: &T) -> ParticipantProperties {
        relay
            .participants()
            .iter()
            .find(|p| p.is_local)
            .map(|p| ParticipantProperties::from_wire(&p.properties))
            .unwrap_or_default()
    }

    /// Write the local participant's own scoring keys
    pub fn publish_local<T: RelayTransport>(
        relay: &T,
        props: &ParticipantProperties,
    ) -> Result<(), RelayError> {
        relay.set_local_properties(props.to_wire())
    }
}
