//! In-process relay provider
//!
//! Rooms live in a shared hub; every peer handle gets its own event channel.
//! Authority is the earliest-joined remaining member and migrates when it leaves.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::protocol::{
    ActorId, BotSpawn, BotState, GameMessage, ParticipantInfo, PropertyMap, RelayEvent,
    RoomOptions, RoomView, ViewId,
};
use super::{AuthorityToken, RelayError, RelayTransport};

struct Member {
    actor: ActorId,
    nickname: String,
    properties: PropertyMap,
    events: mpsc::UnboundedSender<RelayEvent>,
}

struct RoomEntry {
    instance: Uuid,
    name: String,
    capacity: u8,
    open: bool,
    visible: bool,
    properties: PropertyMap,
    lobby_properties: Vec<String>,
    members: Vec<Member>,
    authority: ActorId,
    authority_term: u64,
    bots: Vec<BotState>,
    destroyed: bool,
}

impl RoomEntry {
    fn view(&self) -> RoomView {
        RoomView {
            name: self.name.clone(),
            capacity: self.capacity,
            open: self.open,
            visible: self.visible,
            player_count: self.members.len(),
            properties: self.properties.clone(),
        }
    }

    fn notify_all(&self, event: RelayEvent) {
        for member in &self.members {
            let _ = member.events.send(event.clone());
        }
    }

    fn notify_others(&self, except: ActorId, event: RelayEvent) {
        for member in self.members.iter().filter(|m| m.actor != except) {
            let _ = member.events.send(event.clone());
        }
    }

    fn check_token(&self, token: &AuthorityToken) -> Result<(), RelayError> {
        if token.actor() == self.authority && token.term() == self.authority_term {
            Ok(())
        } else {
            Err(RelayError::NotAuthority)
        }
    }

    /// Remove a member, migrating authority if needed
    fn remove_member(&mut self, actor: ActorId) -> bool {
        let Some(pos) = self.members.iter().position(|m| m.actor == actor) else {
            return false;
        };
        self.members.remove(pos);
        self.notify_all(RelayEvent::PlayerLeft { actor });

        if self.authority == actor {
            if let Some(next) = self.members.first() {
                self.authority = next.actor;
                self.authority_term += 1;
                info!(
                    room = %self.name,
                    actor = self.authority,
                    term = self.authority_term,
                    "Authority migrated"
                );
                self.notify_all(RelayEvent::AuthorityChanged {
                    actor: self.authority,
                });
            }
        }
        true
    }
}

type SharedRoom = Arc<Mutex<RoomEntry>>;

struct HubInner {
    rooms: DashMap<String, SharedRoom>,
    epoch: Instant,
    next_actor: AtomicU32,
    next_view: AtomicU32,
    stalled: DashMap<String, ()>,
    refuse_spawns: AtomicBool,
}

/// Shared in-process relay: room table plus the synchronized clock
#[derive(Clone)]
pub struct LocalRelayHub {
    inner: Arc<HubInner>,
}

impl LocalRelayHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: DashMap::new(),
                epoch: Instant::now(),
                next_actor: AtomicU32::new(1),
                next_view: AtomicU32::new(1001),
                stalled: DashMap::new(),
                refuse_spawns: AtomicBool::new(false),
            }),
        }
    }

    /// Connect a new peer to the hub
    pub fn connect(&self) -> LocalPeer {
        let actor = self.inner.next_actor.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        debug!(actor, "Peer connected to local relay");
        LocalPeer {
            hub: self.clone(),
            actor,
            events_tx,
            events_rx: Mutex::new(events_rx),
            state: Mutex::new(PeerState {
                room: None,
                nickname: String::new(),
                connected: true,
            }),
        }
    }

    pub fn now(&self) -> f64 {
        self.inner.epoch.elapsed().as_secs_f64()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    pub fn room(&self, name: &str) -> Option<RoomView> {
        self.inner.rooms.get(name).map(|r| r.value().lock().view())
    }

    /// Join requests for `name` never complete (used to exercise join timeouts)
    #[cfg(test)]
    pub fn stall_joins(&self, name: &str) {
        self.inner.stalled.insert(name.to_string(), ());
    }

    /// Reject every bot spawn while set
    #[cfg(test)]
    pub fn refuse_bot_spawns(&self, refuse: bool) {
        self.inner.refuse_spawns.store(refuse, Ordering::Relaxed);
    }

    fn is_stalled(&self, name: &str) -> bool {
        self.inner.stalled.contains_key(name)
    }

    fn alloc_view_id(&self) -> ViewId {
        self.inner.next_view.fetch_add(1, Ordering::Relaxed)
    }

    fn room_or_create(&self, name: &str, options: &RoomOptions) -> (SharedRoom, bool) {
        let mut created = false;
        let room = self
            .inner
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(RoomEntry {
                    instance: Uuid::new_v4(),
                    name: name.to_string(),
                    capacity: options.capacity.clamp(1, 20),
                    open: options.open,
                    visible: options.visible,
                    properties: options.initial_properties.clone(),
                    lobby_properties: options.lobby_properties.clone(),
                    members: Vec::new(),
                    authority: 0,
                    authority_term: 0,
                    bots: Vec::new(),
                    destroyed: false,
                }))
            })
            .value()
            .clone();
        (room, created)
    }

    fn remove_if_empty(&self, name: &str, room: &SharedRoom) {
        let removed = self.inner.rooms.remove_if(name, |_, r| {
            if !Arc::ptr_eq(r, room) {
                return false;
            }
            let mut entry = r.lock();
            if entry.members.is_empty() {
                entry.destroyed = true;
                entry.bots.clear();
                true
            } else {
                false
            }
        });
        if removed.is_some() {
            info!(room = %name, "Room destroyed after last member left");
        }
    }
}

impl Default for LocalRelayHub {
    fn default() -> Self {
        Self::new()
    }
}

struct PeerState {
    room: Option<(String, SharedRoom)>,
    nickname: String,
    connected: bool,
}

/// One client's connection to a [`LocalRelayHub`]
pub struct LocalPeer {
    hub: LocalRelayHub,
    actor: ActorId,
    events_tx: mpsc::UnboundedSender<RelayEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<RelayEvent>>,
    state: Mutex<PeerState>,
}

impl LocalPeer {
    pub fn hub(&self) -> &LocalRelayHub {
        &self.hub
    }

    /// Drop the connection: leave the room and report `Disconnected` locally
    pub fn disconnect(&self) {
        let room = {
            let mut state = self.state.lock();
            state.connected = false;
            state.room.take()
        };
        if let Some((name, room)) = room {
            room.lock().remove_member(self.actor);
            self.hub.remove_if_empty(&name, &room);
        }
        let _ = self.events_tx.send(RelayEvent::Disconnected);
        info!(actor = self.actor, "Peer disconnected from relay");
    }

    fn with_room<R>(
        &self,
        f: impl FnOnce(&mut RoomEntry) -> Result<R, RelayError>,
    ) -> Result<R, RelayError> {
        let room = {
            let state = self.state.lock();
            if !state.connected {
                return Err(RelayError::Disconnected);
            }
            state
                .room
                .as_ref()
                .map(|(_, r)| r.clone())
                .ok_or(RelayError::NotInRoom)?
        };
        let mut entry = room.lock();
        f(&mut entry)
    }

    fn drain_stale_events(&self) {
        let mut rx = self.events_rx.lock();
        while rx.try_recv().is_ok() {}
    }
}

impl RelayTransport for LocalPeer {
    fn server_time(&self) -> f64 {
        self.hub.now()
    }

    fn local_actor(&self) -> ActorId {
        self.actor
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn set_nickname(&self, nickname: &str) {
        self.state.lock().nickname = nickname.to_string();
        let _ = self.with_room(|room| {
            if let Some(member) = room.members.iter_mut().find(|m| m.actor == self.actor) {
                member.nickname = nickname.to_string();
            }
            Ok(())
        });
    }

    async fn join_or_create(
        &self,
        name: &str,
        options: &RoomOptions,
    ) -> Result<RoomView, RelayError> {
        let nickname = {
            let state = self.state.lock();
            if !state.connected {
                return Err(RelayError::Disconnected);
            }
            if let Some((current, _)) = &state.room {
                return Err(RelayError::AlreadyInRoom(current.clone()));
            }
            state.nickname.clone()
        };

        if self.hub.is_stalled(name) {
            debug!(room = %name, actor = self.actor, "Join request stalled");
            std::future::pending::<()>().await;
        }

        self.drain_stale_events();

        loop {
            let (room, created) = self.hub.room_or_create(name, options);
            let view = {
                let mut entry = room.lock();
                if entry.destroyed {
                    // Lost a race with the last member leaving; retry on a fresh room
                    continue;
                }
                if !created {
                    if !entry.open {
                        return Err(RelayError::RoomClosed(name.to_string()));
                    }
                    if entry.members.len() >= entry.capacity as usize {
                        return Err(RelayError::RoomFull(name.to_string()));
                    }
                }
                if entry.members.is_empty() {
                    entry.authority = self.actor;
                    entry.authority_term += 1;
                }
                entry.members.push(Member {
                    actor: self.actor,
                    nickname: nickname.clone(),
                    properties: PropertyMap::new(),
                    events: self.events_tx.clone(),
                });
                entry.notify_others(self.actor, RelayEvent::PlayerEntered { actor: self.actor });

                info!(
                    room = %entry.name,
                    room_instance = %entry.instance,
                    actor = self.actor,
                    created,
                    players = entry.members.len(),
                    lobby_keys = ?entry.lobby_properties,
                    "Joined room"
                );
                entry.view()
            };
            self.state.lock().room = Some((name.to_string(), room));
            return Ok(view);
        }
    }

    async fn leave_room(&self) -> Result<(), RelayError> {
        let Some((name, room)) = self.state.lock().room.take() else {
            return Err(RelayError::NotInRoom);
        };
        room.lock().remove_member(self.actor);
        self.hub.remove_if_empty(&name, &room);
        debug!(room = %name, actor = self.actor, "Left room");
        Ok(())
    }

    fn current_room(&self) -> Option<RoomView> {
        self.with_room(|room| Ok(room.view())).ok()
    }

    fn authority(&self) -> Option<AuthorityToken> {
        self.with_room(|room| {
            Ok((room.authority == self.actor)
                .then(|| AuthorityToken::issue(self.actor, room.authority_term)))
        })
        .ok()
        .flatten()
    }

    fn set_room_properties(
        &self,
        token: &AuthorityToken,
        properties: PropertyMap,
    ) -> Result<(), RelayError> {
        self.with_room(|room| {
            room.check_token(token)?;
            for (key, value) in &properties {
                room.properties.insert(key.clone(), value.clone());
            }
            room.notify_all(RelayEvent::RoomPropertiesChanged(properties));
            Ok(())
        })
    }

    fn lock_room(&self, token: &AuthorityToken) -> Result<(), RelayError> {
        self.with_room(|room| {
            room.check_token(token)?;
            room.open = false;
            room.visible = false;
            Ok(())
        })
    }

    fn participants(&self) -> Vec<ParticipantInfo> {
        self.with_room(|room| {
            Ok(room
                .members
                .iter()
                .map(|m| ParticipantInfo {
                    actor: m.actor,
                    nickname: m.nickname.clone(),
                    properties: m.properties.clone(),
                    is_local: m.actor == self.actor,
                })
                .collect())
        })
        .unwrap_or_default()
    }

    fn set_local_properties(&self, properties: PropertyMap) -> Result<(), RelayError> {
        self.with_room(|room| {
            let actor = self.actor;
            let member = room
                .members
                .iter_mut()
                .find(|m| m.actor == actor)
                .ok_or(RelayError::NotInRoom)?;
            for (key, value) in &properties {
                member.properties.insert(key.clone(), value.clone());
            }
            room.notify_all(RelayEvent::ParticipantPropertiesChanged {
                actor,
                changed: properties,
            });
            Ok(())
        })
    }

    fn spawn_bot(&self, token: &AuthorityToken, spawn: BotSpawn) -> Result<ViewId, RelayError> {
        if self.hub.inner.refuse_spawns.load(Ordering::Relaxed) {
            return Err(RelayError::SpawnRejected);
        }
        let view_id = self.hub.alloc_view_id();
        self.with_room(|room| {
            room.check_token(token)?;
            room.bots.push(BotState {
                view_id,
                name: spawn.stats.name,
                score: spawn.stats.score,
                kills: spawn.stats.kills,
                deaths: spawn.stats.deaths,
                alive: true,
                position: spawn.position,
            });
            Ok(view_id)
        })
    }

    fn update_bot(&self, token: &AuthorityToken, state: &BotState) -> Result<(), RelayError> {
        self.with_room(|room| {
            room.check_token(token)?;
            let slot = room
                .bots
                .iter_mut()
                .find(|b| b.view_id == state.view_id)
                .ok_or(RelayError::UnknownObject(state.view_id))?;
            *slot = state.clone();
            Ok(())
        })
    }

    fn destroy_bot(&self, token: &AuthorityToken, view_id: ViewId) -> Result<(), RelayError> {
        self.with_room(|room| {
            room.check_token(token)?;
            let before = room.bots.len();
            room.bots.retain(|b| b.view_id != view_id);
            if room.bots.len() == before {
                return Err(RelayError::UnknownObject(view_id));
            }
            Ok(())
        })
    }

    fn bots(&self) -> Vec<BotState> {
        self.with_room(|room| Ok(room.bots.clone()))
            .unwrap_or_default()
    }

    fn broadcast(&self, message: GameMessage) -> Result<(), RelayError> {
        self.with_room(|room| {
            room.notify_all(RelayEvent::Message {
                from: self.actor,
                message,
            });
            Ok(())
        })
    }

    fn poll_event(&self) -> Option<RelayEvent> {
        self.events_rx.lock().try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::protocol::{BotStats, Position};
    use serde_json::json;

    fn options() -> RoomOptions {
        let mut props = PropertyMap::new();
        props.insert("MatchState".into(), json!("Waiting"));
        RoomOptions {
            capacity: 2,
            initial_properties: props,
            ..RoomOptions::default()
        }
    }

    fn drain(peer: &LocalPeer) -> Vec<RelayEvent> {
        std::iter::from_fn(|| peer.poll_event()).collect()
    }

    #[tokio::test]
    async fn first_joiner_creates_and_holds_authority() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        let b = hub.connect();

        let room = a.join_or_create("Room", &options()).await.unwrap();
        assert_eq!(room.player_count, 1);
        assert_eq!(room.properties["MatchState"], "Waiting");

        let room = b.join_or_create("Room", &options()).await.unwrap();
        assert_eq!(room.player_count, 2);

        assert!(a.authority().is_some());
        assert!(b.authority().is_none());
        assert!(matches!(
            drain(&a).as_slice(),
            [RelayEvent::PlayerEntered { actor }] if *actor == b.local_actor()
        ));
    }

    #[tokio::test]
    async fn full_and_closed_rooms_reject_joins() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        let b = hub.connect();
        let c = hub.connect();

        a.join_or_create("Room", &options()).await.unwrap();
        b.join_or_create("Room", &options()).await.unwrap();
        assert_eq!(
            c.join_or_create("Room", &options()).await.unwrap_err(),
            RelayError::RoomFull("Room".into())
        );

        b.leave_room().await.unwrap();
        let token = a.authority().unwrap();
        a.lock_room(&token).unwrap();
        assert_eq!(
            c.join_or_create("Room", &options()).await.unwrap_err(),
            RelayError::RoomClosed("Room".into())
        );
        let view = hub.room("Room").unwrap();
        assert!(!view.open && !view.visible);
    }

    #[tokio::test]
    async fn authority_migrates_and_old_token_goes_stale() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        let b = hub.connect();
        a.join_or_create("Room", &options()).await.unwrap();
        b.join_or_create("Room", &options()).await.unwrap();
        drain(&b);

        let stale = a.authority().unwrap();
        a.leave_room().await.unwrap();

        let events = drain(&b);
        let new_authority = b.local_actor();
        assert!(events.iter().any(
            |e| matches!(e, RelayEvent::AuthorityChanged { actor } if *actor == new_authority)
        ));

        let token = b.authority().expect("b is authority now");
        assert_ne!(token, stale);
        assert_eq!(
            b.set_room_properties(&stale, PropertyMap::new()),
            Err(RelayError::NotAuthority)
        );
        assert!(b.set_room_properties(&token, PropertyMap::new()).is_ok());
    }

    #[tokio::test]
    async fn property_writes_reach_every_member_including_writer() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        let b = hub.connect();
        a.join_or_create("Room", &options()).await.unwrap();
        b.join_or_create("Room", &options()).await.unwrap();
        drain(&a);

        let mut props = PropertyMap::new();
        props.insert("PreGameEnd".into(), json!(10.0));
        a.set_room_properties(&a.authority().unwrap(), props).unwrap();

        for peer in [&a, &b] {
            let events = drain(peer);
            assert!(matches!(
                events.as_slice(),
                [RelayEvent::RoomPropertiesChanged(changed)] if changed["PreGameEnd"] == 10.0
            ));
        }
        assert_eq!(b.current_room().unwrap().properties["PreGameEnd"], 10.0);
    }

    #[tokio::test]
    async fn bots_are_authority_owned_and_die_with_the_room() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        let b = hub.connect();
        a.join_or_create("Room", &options()).await.unwrap();
        b.join_or_create("Room", &options()).await.unwrap();

        let token = a.authority().unwrap();
        let spawn = BotSpawn {
            stats: BotStats {
                name: "Bot 101".into(),
                ..BotStats::default()
            },
            position: Position::default(),
        };
        let view_id = a.spawn_bot(&token, spawn.clone()).unwrap();
        assert_eq!(b.bots().len(), 1);
        assert_eq!(b.bots()[0].view_id, view_id);

        let forged = AuthorityToken::issue(b.local_actor(), 1);
        assert_eq!(b.spawn_bot(&forged, spawn), Err(RelayError::NotAuthority));

        a.leave_room().await.unwrap();
        b.leave_room().await.unwrap();
        assert_eq!(hub.room_count(), 0);

        let c = hub.connect();
        c.join_or_create("Room", &options()).await.unwrap();
        assert!(c.bots().is_empty());
    }

    #[tokio::test]
    async fn disconnect_reports_locally_and_blocks_rejoin() {
        let hub = LocalRelayHub::new();
        let a = hub.connect();
        a.join_or_create("Room", &options()).await.unwrap();
        drain(&a);

        a.disconnect();
        assert!(!a.is_connected());
        assert!(matches!(drain(&a).as_slice(), [RelayEvent::Disconnected]));
        assert_eq!(
            a.join_or_create("Room", &options()).await.unwrap_err(),
            RelayError::Disconnected
        );
        assert_eq!(hub.room_count(), 0);
    }
}
