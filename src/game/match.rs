//! Match lifecycle state machine
//!
//! Phase is derived from the replicated room properties. Only the authority writes
//! phase-determining keys; every peer detects deadlines itself against the shared
//! room clock, so peers may disagree for up to one replication round-trip.

use tracing::{debug, info, warn};

use crate::relay::{
    ActorId, AuthorityToken, PropertyMap, RelayError, RelayEvent, RelayTransport, RoomView,
};
use crate::util::time::{format_clock, format_countdown, remaining};

use super::room_props::{RoomMatchState, RoomProperties, RoomPropertyError, RoomPropertyStore};

/// Local match phase; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchPhase {
    /// Waiting for players
    Waiting,
    /// Countdown deadline published, not yet reached
    PreGameCountdown,
    /// Match in progress
    Live,
    /// Match over (or abandoned after a disconnect)
    Ended,
}

/// Match timing rules
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Seconds between the countdown being published and the match going live
    pub pre_game_length: f64,
    /// Humans required before the authority starts the countdown
    pub min_players: usize,
    /// Used when the room carries no MatchLength
    pub default_match_length: u32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            pre_game_length: 10.0,
            min_players: 1,
            default_match_length: 600,
        }
    }
}

/// What the composition root should do in response to a phase change
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEffect {
    CountdownStarted { deadline: f64 },
    /// Emitted once, on entering Live by either signal
    SpawnLocalPlayer,
    MatchLive { match_end: f64 },
    /// Normal end: persist stats and show the game-over view
    MatchEnded,
    /// Forced end: leave without persisting anything
    ReturnToLobby { reason: String },
}

/// Match coordinator errors
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Properties(#[from] RoomPropertyError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Per-process match state machine
pub struct MatchCoordinator {
    settings: MatchSettings,
    phase: MatchPhase,
    props: RoomProperties,
    room_name: String,
    capacity: u8,
    player_count: usize,
    live_announced: bool,
    countdown_requested: bool,
    start_requested: bool,
    pending: Vec<MatchEffect>,
}

impl MatchCoordinator {
    pub fn new(settings: MatchSettings) -> Self {
        Self {
            settings,
            phase: MatchPhase::Waiting,
            props: RoomProperties::default(),
            room_name: String::new(),
            capacity: 0,
            player_count: 0,
            live_announced: false,
            countdown_requested: false,
            start_requested: false,
            pending: Vec::new(),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn properties(&self) -> &RoomProperties {
        &self.props
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    /// Adopt the state of a room we just joined. Late joiners go straight to
    /// the countdown, or to Live once the deadline at `now` has passed.
    pub fn on_joined_room(&mut self, room: &RoomView, now: f64) {
        self.room_name = room.name.clone();
        self.capacity = room.capacity;
        self.player_count = room.player_count;
        self.props = RoomProperties::from_wire(&room.properties);
        info!(
            room = %self.room_name,
            players = self.player_count,
            started = self.props.is_started(),
            "Match coordinator attached to room"
        );
        self.apply_properties(Some(now));
    }

    /// Merge a replicated property change and derive the phase from it
    pub fn on_room_properties_changed(&mut self, changed: &PropertyMap) {
        let update = RoomProperties::from_wire(changed);
        if let Some(map) = update.map {
            self.props.map = Some(map);
        }
        if let Some(state) = update.match_state {
            if self.props.match_state.is_some_and(|current| state < current) {
                warn!(room = %self.room_name, ?state, "Ignoring MatchState regression");
            } else {
                self.props.match_state = Some(state);
            }
        }
        if update.pre_game_end.is_some() {
            self.props.pre_game_end = update.pre_game_end;
        }
        if update.match_end.is_some() {
            self.props.match_end = update.match_end;
        }
        if update.match_length.is_some() {
            self.props.match_length = update.match_length;
        }
        self.apply_properties(None);
    }

    pub fn on_participant_count_changed(&mut self, count: usize) {
        self.player_count = count;
    }

    /// A new authority re-evaluates pending writes from the replicated state
    pub fn on_authority_changed(&mut self, actor: ActorId) {
        debug!(room = %self.room_name, actor, "Authority changed");
        self.countdown_requested = false;
        self.start_requested = false;
    }

    /// Forced end: no persistence, back to the lobby
    pub fn on_disconnected(&mut self) {
        if self.phase == MatchPhase::Ended {
            return;
        }
        warn!(
            room = %self.room_name,
            phase = ?self.phase,
            "Disconnected mid-match; abandoning without saving"
        );
        self.phase = MatchPhase::Ended;
        self.pending.push(MatchEffect::ReturnToLobby {
            reason: "disconnected".to_string(),
        });
    }

    /// Route a relay notification to the matching handler
    pub fn handle_event(&mut self, event: &RelayEvent) {
        match event {
            RelayEvent::PlayerEntered { .. } => {
                self.on_participant_count_changed(self.player_count + 1)
            }
            RelayEvent::PlayerLeft { .. } => {
                self.on_participant_count_changed(self.player_count.saturating_sub(1))
            }
            RelayEvent::RoomPropertiesChanged(changed) => self.on_room_properties_changed(changed),
            RelayEvent::AuthorityChanged { actor } => self.on_authority_changed(*actor),
            RelayEvent::Disconnected => self.on_disconnected(),
            RelayEvent::ParticipantPropertiesChanged { .. } | RelayEvent::Message { .. } => {}
        }
    }

    /// Per-frame step: deadline checks, authority writes, and the effects to apply
    pub fn tick<T: RelayTransport>(&mut self, relay: &T) -> Result<Vec<MatchEffect>, MatchError> {
        if !relay.is_connected() {
            self.on_disconnected();
            return Ok(self.take_effects());
        }
        let now = relay.server_time();
        self.check_deadlines(now);
        if let Some(token) = relay.authority() {
            self.drive_authority(relay, &token, now)?;
        }
        Ok(self.take_effects())
    }

    fn take_effects(&mut self) -> Vec<MatchEffect> {
        std::mem::take(&mut self.pending)
    }

    fn advance_to(&mut self, next: MatchPhase) -> bool {
        if next <= self.phase {
            if next < self.phase {
                debug!(
                    room = %self.room_name,
                    current = ?self.phase,
                    requested = ?next,
                    "Ignoring backward phase change"
                );
            }
            return false;
        }
        info!(room = %self.room_name, from = ?self.phase, to = ?next, "Match phase changed");
        self.phase = next;
        true
    }

    fn enter_countdown(&mut self, deadline: f64) {
        if self.advance_to(MatchPhase::PreGameCountdown) {
            self.pending.push(MatchEffect::CountdownStarted { deadline });
        }
    }

    fn enter_live(&mut self) {
        if self.advance_to(MatchPhase::Live) {
            self.pending.push(MatchEffect::SpawnLocalPlayer);
        }
    }

    /// `now` is only known on join; replicated updates carry fresh deadlines
    fn apply_properties(&mut self, now: Option<f64>) {
        if let Some(deadline) = self.props.pre_game_end {
            let expired = self.props.is_started() || now.is_some_and(|now| now >= deadline);
            if expired {
                self.enter_live();
            } else {
                self.enter_countdown(deadline);
            }
        }
        if self.props.is_started() {
            self.enter_live();
            if let (MatchPhase::Live, Some(match_end), false) =
                (self.phase, self.props.match_end, self.live_announced)
            {
                self.live_announced = true;
                self.pending.push(MatchEffect::MatchLive { match_end });
            }
        }
    }

    fn check_deadlines(&mut self, now: f64) {
        if self.phase == MatchPhase::PreGameCountdown
            && self.props.pre_game_end.is_some_and(|end| now >= end)
        {
            self.enter_live();
        }
        if self.phase == MatchPhase::Live
            && self.props.match_end.is_some_and(|end| now >= end)
            && self.advance_to(MatchPhase::Ended)
        {
            self.pending.push(MatchEffect::MatchEnded);
        }
    }

    fn drive_authority<T: RelayTransport>(
        &mut self,
        relay: &T,
        token: &AuthorityToken,
        now: f64,
    ) -> Result<(), MatchError> {
        match self.phase {
            MatchPhase::Waiting => {
                if self.props.pre_game_end.is_none()
                    && !self.countdown_requested
                    && self.player_count >= self.settings.min_players
                {
                    let deadline = now + self.settings.pre_game_length;
                    let update = RoomProperties {
                        pre_game_end: Some(deadline),
                        ..RoomProperties::default()
                    };
                    RoomPropertyStore::publish(relay, token, &update)?;
                    self.countdown_requested = true;
                    info!(
                        room = %self.room_name,
                        deadline,
                        players = self.player_count,
                        "Countdown published"
                    );
                }
            }
            MatchPhase::PreGameCountdown | MatchPhase::Live => {
                let due = self.props.pre_game_end.is_some_and(|end| now >= end);
                if due && !self.props.is_started() && !self.start_requested {
                    relay.lock_room(token)?;
                    let length = self
                        .props
                        .match_length
                        .unwrap_or(self.settings.default_match_length);
                    let match_end = now + length as f64;
                    let update = RoomProperties {
                        match_state: Some(RoomMatchState::Started),
                        match_end: Some(match_end),
                        ..RoomProperties::default()
                    };
                    RoomPropertyStore::publish(relay, token, &update)?;
                    self.start_requested = true;
                    info!(room = %self.room_name, match_end, "Room locked and match started");
                }
            }
            MatchPhase::Ended => {}
        }
        Ok(())
    }

    /// Seconds left in the match, clamped at zero
    pub fn remaining_match_time(&self, now: f64) -> Option<f64> {
        self.props.match_end.map(|end| remaining(end, now))
    }

    /// Lobby status text
    pub fn status_line(&self) -> String {
        match self.phase {
            MatchPhase::Waiting => format!("Waiting: {}/{}", self.player_count, self.capacity),
            MatchPhase::PreGameCountdown => "Get Ready!".to_string(),
            MatchPhase::Live => "Match Live".to_string(),
            MatchPhase::Ended => "GAME OVER".to_string(),
        }
    }

    /// "Match Starting in: 4.2s" while counting down
    pub fn countdown_text(&self, now: f64) -> Option<String> {
        if self.phase != MatchPhase::PreGameCountdown {
            return None;
        }
        self.props
            .pre_game_end
            .map(|end| format!("Match Starting in: {}", format_countdown(remaining(end, now))))
    }

    /// Match clock; frozen at "GAME OVER" once ended
    pub fn clock_text(&self, now: f64) -> String {
        let full = self
            .props
            .match_length
            .unwrap_or(self.settings.default_match_length) as f64;
        match self.phase {
            MatchPhase::Ended => "GAME OVER".to_string(),
            MatchPhase::Live => format_clock(self.remaining_match_time(now).unwrap_or(full)),
            _ => format_clock(full),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room_props::MapId;
    use crate::relay::{LocalPeer, LocalRelayHub, RoomOptions};
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::time::advance;

    const ROOM: &str = "Global_Map1_Match";

    fn options() -> RoomOptions {
        RoomOptions {
            initial_properties: RoomProperties::initial(MapId::Map1, 600).to_wire(),
            ..RoomOptions::default()
        }
    }

    fn frame(peer: &LocalPeer, coordinator: &mut MatchCoordinator) -> Vec<MatchEffect> {
        while let Some(event) = peer.poll_event() {
            coordinator.handle_event(&event);
        }
        coordinator.tick(peer).unwrap()
    }

    async fn join(peer: &LocalPeer, settings: MatchSettings) -> MatchCoordinator {
        let view = peer.join_or_create(ROOM, &options()).await.unwrap();
        let mut coordinator = MatchCoordinator::new(settings);
        coordinator.on_joined_room(&view, peer.server_time());
        coordinator
    }

    #[tokio::test(start_paused = true)]
    async fn phases_agree_across_peers_on_the_room_clock() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let guest = hub.connect();
        let mut a = join(&host, MatchSettings::default()).await;
        let mut b = join(&guest, MatchSettings::default()).await;
        assert_eq!(a.status_line(), "Waiting: 1/20");

        // t=0: authority publishes the deadline; everyone learns it from the property
        assert!(frame(&host, &mut a).is_empty());
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::CountdownStarted { deadline: 10.0 }]);
        assert_eq!(frame(&guest, &mut b), vec![MatchEffect::CountdownStarted { deadline: 10.0 }]);
        assert_eq!(b.countdown_text(hub.now()).as_deref(), Some("Match Starting in: 10.0s"));
        assert_eq!(a.status_line(), "Get Ready!");

        advance(Duration::from_secs(10)).await;
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::SpawnLocalPlayer]);
        assert_eq!(
            frame(&guest, &mut b),
            vec![
                MatchEffect::SpawnLocalPlayer,
                MatchEffect::MatchLive { match_end: 610.0 }
            ]
        );
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::MatchLive { match_end: 610.0 }]);

        let room = hub.room(ROOM).unwrap();
        assert!(!room.open && !room.visible);
        let props = RoomProperties::from_wire(&room.properties);
        assert_eq!(props.match_state, Some(RoomMatchState::Started));
        assert_eq!(props.match_end, Some(610.0));
        assert_eq!(a.clock_text(hub.now()), "10:00");

        advance(Duration::from_secs(599)).await;
        assert!(frame(&host, &mut a).is_empty());
        assert!(frame(&guest, &mut b).is_empty());
        assert_eq!(b.clock_text(hub.now()), "00:01");

        advance(Duration::from_secs(1)).await;
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::MatchEnded]);
        assert_eq!(frame(&guest, &mut b), vec![MatchEffect::MatchEnded]);
        assert_eq!(a.phase(), MatchPhase::Ended);
        assert_eq!(b.clock_text(hub.now()), "GAME OVER");
    }

    #[tokio::test(start_paused = true)]
    async fn non_authority_never_writes_phase_keys() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let guest = hub.connect();
        let _a = join(&host, MatchSettings::default()).await;
        let mut b = join(&guest, MatchSettings::default()).await;

        for _ in 0..20 {
            assert!(frame(&guest, &mut b).is_empty());
            advance(Duration::from_secs(1)).await;
        }
        let props = RoomPropertyStore::read(&guest).unwrap();
        assert_eq!(props.pre_game_end, None);
        assert_eq!(props.match_state, Some(RoomMatchState::Waiting));
        assert_eq!(b.phase(), MatchPhase::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_waits_for_minimum_players() {
        let settings = MatchSettings {
            min_players: 2,
            ..MatchSettings::default()
        };
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let mut a = join(&host, settings.clone()).await;

        advance(Duration::from_secs(3)).await;
        assert!(frame(&host, &mut a).is_empty());
        assert_eq!(RoomPropertyStore::read(&host).unwrap().pre_game_end, None);

        let guest = hub.connect();
        let _b = join(&guest, settings).await;
        frame(&host, &mut a);
        assert_eq!(RoomPropertyStore::read(&host).unwrap().pre_game_end, Some(13.0));
    }

    #[tokio::test(start_paused = true)]
    async fn new_authority_finishes_the_start() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let guest = hub.connect();
        let mut a = join(&host, MatchSettings::default()).await;
        let mut b = join(&guest, MatchSettings::default()).await;

        frame(&host, &mut a);
        host.leave_room().await.unwrap();
        assert_eq!(frame(&guest, &mut b), vec![MatchEffect::CountdownStarted { deadline: 10.0 }]);
        assert!(guest.authority().is_some());

        advance(Duration::from_secs(10)).await;
        assert_eq!(frame(&guest, &mut b), vec![MatchEffect::SpawnLocalPlayer]);
        assert_eq!(frame(&guest, &mut b), vec![MatchEffect::MatchLive { match_end: 610.0 }]);
        assert_eq!(b.player_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_enters_live_directly() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let mut a = join(&host, MatchSettings::default()).await;
        frame(&host, &mut a);
        advance(Duration::from_secs(10)).await;
        frame(&host, &mut a);

        let view = hub.room(ROOM).unwrap();
        let mut b = MatchCoordinator::new(MatchSettings::default());
        b.on_joined_room(&view, hub.now());
        assert_eq!(b.phase(), MatchPhase::Live);
        assert_eq!(
            b.take_effects(),
            vec![
                MatchEffect::SpawnLocalPlayer,
                MatchEffect::MatchLive { match_end: 610.0 }
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn joining_counts_down_only_to_a_future_deadline() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let mut a = join(&host, MatchSettings::default()).await;
        frame(&host, &mut a);
        frame(&host, &mut a);

        advance(Duration::from_secs(4)).await;
        let guest = hub.connect();
        let mut b = join(&guest, MatchSettings::default()).await;
        assert_eq!(b.phase(), MatchPhase::PreGameCountdown);
        assert_eq!(b.take_effects(), vec![MatchEffect::CountdownStarted { deadline: 10.0 }]);

        // Deadline passed but the authority has not written Started yet
        advance(Duration::from_secs(7)).await;
        let view = hub.room(ROOM).unwrap();
        let mut c = MatchCoordinator::new(MatchSettings::default());
        c.on_joined_room(&view, hub.now());
        assert_eq!(c.phase(), MatchPhase::Live);
        assert_eq!(c.take_effects(), vec![MatchEffect::SpawnLocalPlayer]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_forces_end_without_saving() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let mut a = join(&host, MatchSettings::default()).await;
        frame(&host, &mut a);
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::CountdownStarted { deadline: 10.0 }]);
        advance(Duration::from_secs(10)).await;
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::SpawnLocalPlayer]);
        assert_eq!(frame(&host, &mut a), vec![MatchEffect::MatchLive { match_end: 610.0 }]);
        assert_eq!(a.phase(), MatchPhase::Live);

        host.disconnect();
        assert_eq!(
            frame(&host, &mut a),
            vec![MatchEffect::ReturnToLobby {
                reason: "disconnected".to_string()
            }]
        );
        assert_eq!(a.phase(), MatchPhase::Ended);

        advance(Duration::from_secs(700)).await;
        assert!(frame(&host, &mut a).is_empty());
    }

    proptest! {
        #[test]
        fn phase_and_match_state_never_move_backwards(
            steps in proptest::collection::vec((0u8..4, 0.0f64..100.0), 1..40),
        ) {
            let mut coordinator = MatchCoordinator::new(MatchSettings::default());
            let mut last_phase = coordinator.phase();
            let mut last_state = coordinator.properties().match_state;
            for (kind, t) in steps {
                let update = match kind {
                    0 => Some(RoomProperties {
                        pre_game_end: Some(t),
                        ..RoomProperties::default()
                    }),
                    1 => Some(RoomProperties {
                        match_state: Some(RoomMatchState::Started),
                        match_end: Some(t + 10.0),
                        ..RoomProperties::default()
                    }),
                    2 => Some(RoomProperties {
                        match_state: Some(RoomMatchState::Waiting),
                        ..RoomProperties::default()
                    }),
                    _ => None,
                };
                match update {
                    Some(update) => coordinator.on_room_properties_changed(&update.to_wire()),
                    None => coordinator.check_deadlines(t),
                }
                prop_assert!(coordinator.phase() >= last_phase);
                prop_assert!(coordinator.properties().match_state >= last_state);
                last_phase = coordinator.phase();
                last_state = coordinator.properties().match_state;
            }
        }
    }
}
