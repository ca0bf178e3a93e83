//! Relay transport boundary
//!
//! The match core only talks to the networking provider through [`RelayTransport`].
//! [`local::LocalRelayHub`] is the in-process provider used by the simulator and tests.

pub mod local;
pub mod protocol;

use std::future::Future;

pub use local::{LocalPeer, LocalRelayHub};
pub use protocol::{
    ActorId, BotSpawn, BotState, BotStats, GameMessage, ParticipantId, ParticipantInfo, Position,
    PropertyMap, RelayEvent, RoomOptions, RoomView, ViewId,
};

/// Proof that the holder was the elected authority when the token was issued.
///
/// Tokens are only minted by transports. A token goes stale when authority migrates,
/// and every write that takes one re-validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityToken {
    actor: ActorId,
    term: u64,
}

impl AuthorityToken {
    pub(crate) fn issue(actor: ActorId, term: u64) -> Self {
        Self { actor, term }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn term(&self) -> u64 {
        self.term
    }
}

/// Capabilities the match core needs from the networking provider
pub trait RelayTransport: Send + Sync {
    /// Synchronized room clock in seconds
    fn server_time(&self) -> f64;

    fn local_actor(&self) -> ActorId;

    fn is_connected(&self) -> bool;

    fn set_nickname(&self, nickname: &str);

    fn join_or_create(
        &self,
        name: &str,
        options: &RoomOptions,
    ) -> impl Future<Output = Result<RoomView, RelayError>> + Send;

    fn leave_room(&self) -> impl Future<Output = Result<(), RelayError>> + Send;

    fn current_room(&self) -> Option<RoomView>;

    /// Some only while this peer is the elected authority of its room
    fn authority(&self) -> Option<AuthorityToken>;

    fn set_room_properties(
        &self,
        token: &AuthorityToken,
        properties: PropertyMap,
    ) -> Result<(), RelayError>;

    /// Close and hide the room so no further joins succeed
    fn lock_room(&self, token: &AuthorityToken) -> Result<(), RelayError>;

    /// Human members in join order
    fn participants(&self) -> Vec<ParticipantInfo>;

    /// Merge keys into the local participant's own property store
    fn set_local_properties(&self, properties: PropertyMap) -> Result<(), RelayError>;

    fn spawn_bot(&self, token: &AuthorityToken, spawn: BotSpawn) -> Result<ViewId, RelayError>;

    fn update_bot(&self, token: &AuthorityToken, state: &BotState) -> Result<(), RelayError>;

    fn destroy_bot(&self, token: &AuthorityToken, view_id: ViewId) -> Result<(), RelayError>;

    /// Replicated bot objects in spawn order
    fn bots(&self) -> Vec<BotState>;

    /// Reliable broadcast to every member, sender included
    fn broadcast(&self, message: GameMessage) -> Result<(), RelayError>;

    fn poll_event(&self) -> Option<RelayEvent>;
}

/// Relay errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Not connected to the relay")]
    Disconnected,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Already in room {0}")]
    AlreadyInRoom(String),

    #[error("Room {0} is full")]
    RoomFull(String),

    #[error("Room {0} is closed")]
    RoomClosed(String),

    #[error("Authority token is not valid for this room")]
    NotAuthority,

    #[error("Unknown network object {0}")]
    UnknownObject(ViewId),

    #[error("Network object spawn rejected")]
    SpawnRejected,
}
