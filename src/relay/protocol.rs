//! Relay wire types
//! Property maps, room options, replicated bot objects and broadcast messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Untyped key/value map as carried by the relay provider
pub type PropertyMap = serde_json::Map<String, Value>;

/// Relay-assigned participant number, unique per hub
pub type ActorId = u32;

/// Network view id of a replicated object (bots)
pub type ViewId = u32;

/// Options used when a join-or-create request has to create the room
#[derive(Debug, Clone)]
pub struct RoomOptions {
    /// Maximum members (1-20)
    pub capacity: u8,
    /// Listed in room discovery
    pub visible: bool,
    /// Accepts joins
    pub open: bool,
    /// Room properties written at creation
    pub initial_properties: PropertyMap,
    /// Property keys exposed to the lobby listing
    pub lobby_properties: Vec<String>,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            capacity: 20,
            visible: true,
            open: true,
            initial_properties: PropertyMap::new(),
            lobby_properties: Vec::new(),
        }
    }
}

/// Room as seen by a member
#[derive(Debug, Clone)]
pub struct RoomView {
    pub name: String,
    pub capacity: u8,
    pub open: bool,
    pub visible: bool,
    pub player_count: usize,
    pub properties: PropertyMap,
}

/// A human member of the current room
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub actor: ActorId,
    pub nickname: String,
    pub properties: PropertyMap,
    pub is_local: bool,
}

/// World-space position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: f32, dz: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y,
            z: self.z + dz,
        }
    }

    pub fn distance(self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Stats a bot carries across respawns
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BotStats {
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
}

/// Request to instantiate a replicated bot object
#[derive(Debug, Clone)]
pub struct BotSpawn {
    pub stats: BotStats,
    pub position: Position,
}

/// Replicated bot object state (authority-owned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    pub view_id: ViewId,
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub alive: bool,
    pub position: Position,
}

impl BotState {
    pub fn stats(&self) -> BotStats {
        BotStats {
            name: self.name.clone(),
            score: self.score,
            kills: self.kills,
            deaths: self.deaths,
        }
    }
}

/// Scored combatant reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParticipantId {
    Human(ActorId),
    Bot(ViewId),
}

/// Reliable broadcast messages between members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameMessage {
    /// A participant died; attacker is None for environmental deaths
    Eliminated {
        victim: ParticipantId,
        attacker: Option<ParticipantId>,
    },
}

/// Notifications drained by each peer once per frame
#[derive(Debug, Clone)]
pub enum RelayEvent {
    PlayerEntered {
        actor: ActorId,
    },
    PlayerLeft {
        actor: ActorId,
    },
    /// Only the keys that changed
    RoomPropertiesChanged(PropertyMap),
    ParticipantPropertiesChanged {
        actor: ActorId,
        changed: PropertyMap,
    },
    AuthorityChanged {
        actor: ActorId,
    },
    Message {
        from: ActorId,
        message: GameMessage,
    },
    Disconnected,
}
