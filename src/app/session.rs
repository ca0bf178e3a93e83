//! One client process: profile lookup, matchmaking, then the per-frame match loop

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::bots::BotLifecycleCoordinator;
use crate::game::combat::{
    credit_local_kill, plan_credit, record_local_death, record_local_respawn, CreditAction,
};
use crate::game::scheduler::DelayedActions;
use crate::game::snapshot::{GameOverSummary, RefreshTimer, ScoreboardSnapshot};
use crate::game::{MapId, MatchCoordinator, MatchEffect, MatchPhase, ParticipantRegistry};
use crate::matchmaking::service::cancelled;
use crate::matchmaking::{MatchmakingError, MatchmakingSearch};
use crate::relay::{GameMessage, RelayError, RelayEvent, RelayTransport, RoomView};
use crate::store::profiles::resolve_nickname;
use crate::store::MatchResult;
use crate::util::time::frame_interval;

use super::sim::SimulatedCombat;
use super::state::AppState;

/// How a session finished
#[derive(Debug)]
pub enum SessionOutcome {
    /// The match ran to its end; stats were handed to the profile store
    Completed { summary: GameOverSummary },
    /// Forced end (disconnect); nothing was saved
    ReturnedToLobby { reason: String },
    Cancelled,
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Per-match state owned by the frame loop
struct MatchRuntime {
    coordinator: MatchCoordinator,
    bots: BotLifecycleCoordinator,
    registry: ParticipantRegistry,
    refresh: RefreshTimer,
    respawns: DelayedActions<()>,
}

/// A single peer from lobby to game over
pub struct PeerSession<T: RelayTransport> {
    state: AppState,
    relay: Arc<T>,
    account: String,
    map: MapId,
    cancel: watch::Receiver<bool>,
    rng: ChaCha8Rng,
    combat: Option<SimulatedCombat>,
}

impl<T: RelayTransport> PeerSession<T> {
    pub fn new(
        state: AppState,
        relay: Arc<T>,
        account: impl Into<String>,
        map: MapId,
        cancel: watch::Receiver<bool>,
        seed: u64,
    ) -> Self {
        Self {
            state,
            relay,
            account: account.into(),
            map,
            cancel,
            rng: ChaCha8Rng::seed_from_u64(seed),
            combat: None,
        }
    }

    /// Let this peer drive random eliminations whenever it holds authority
    pub fn with_simulated_combat(mut self, combat: SimulatedCombat) -> Self {
        self.combat = Some(combat);
        self
    }

    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        let nickname = self.resolve_nickname().await;
        self.relay.set_nickname(&nickname);
        info!(account = %self.account, nickname = %nickname, map = ?self.map, "Session started");

        let mut search = MatchmakingSearch::new(self.state.search_settings(), self.cancel.clone());
        let room = match search.find_room(self.relay.as_ref(), self.map).await {
            Ok(room) => room,
            Err(MatchmakingError::Cancelled) => return Ok(SessionOutcome::Cancelled),
            Err(e) => {
                warn!(account = %self.account, error = %e, "Matchmaking failed");
                return Err(e.into());
            }
        };

        let outcome = self.play(room).await;

        if self.relay.current_room().is_some() {
            if let Err(e) = self.relay.leave_room().await {
                debug!(account = %self.account, error = %e, "Leaving room failed");
            }
        }
        outcome
    }

    async fn resolve_nickname(&mut self) -> String {
        let record = match self.state.profile_store.load(&self.account).await {
            Ok(record) => record,
            Err(e) => {
                warn!(account = %self.account, error = %e, "Profile load failed; playing as guest");
                None
            }
        };
        resolve_nickname(record.as_ref(), &mut self.rng)
    }

    async fn play(&mut self, room: RoomView) -> Result<SessionOutcome, SessionError> {
        let relay_handle = self.relay.clone();
        let relay = relay_handle.as_ref();
        let config = self.state.config.clone();

        let mut rt = MatchRuntime {
            coordinator: MatchCoordinator::new(self.state.match_settings()),
            bots: BotLifecycleCoordinator::new(
                self.state.bot_settings(),
                self.state.spawn_layout.anchors(self.map).to_vec(),
                self.state.nav.clone(),
                self.rng.gen(),
            ),
            registry: ParticipantRegistry::new(),
            refresh: RefreshTimer::new(config.leaderboard_refresh.as_secs_f64()),
            respawns: DelayedActions::new(),
        };
        rt.coordinator.on_joined_room(&room, relay.server_time());

        let mut ticker = interval(frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled(&mut self.cancel) => {
                    info!(room = %room.name, "Session cancelled");
                    return Ok(SessionOutcome::Cancelled);
                }
            }

            while let Some(event) = relay.poll_event() {
                match &event {
                    RelayEvent::Message { message, .. } => {
                        self.apply_message(relay, &mut rt, message)
                    }
                    RelayEvent::AuthorityChanged { actor } if *actor == relay.local_actor() => {
                        info!(room = %room.name, actor, "Became room authority");
                        rt.bots.adopt(relay);
                    }
                    _ => {}
                }
                rt.coordinator.handle_event(&event);
            }

            let effects = match rt.coordinator.tick(relay) {
                Ok(effects) => effects,
                Err(e) => {
                    warn!(room = %room.name, error = %e, "Match state write failed");
                    Vec::new()
                }
            };
            for effect in effects {
                if let Some(outcome) = self.apply_effect(relay, &mut rt, &room, effect).await {
                    return Ok(outcome);
                }
            }

            let phase = rt.coordinator.phase();
            let now = relay.server_time();
            if relay.authority().is_some() {
                if let Err(e) = rt.bots.tick(relay, phase) {
                    warn!(room = %room.name, error = %e, "Bot respawn failed");
                }
            }
            for _ in rt.respawns.drain_due(now) {
                if phase != MatchPhase::Live {
                    continue;
                }
                if let Err(e) = record_local_respawn(relay) {
                    warn!(room = %room.name, error = %e, "Respawn write failed");
                }
            }
            if let Some(combat) = self.combat.as_mut() {
                if let Some(message) = combat.poll(relay, phase) {
                    if let Err(e) = relay.broadcast(message) {
                        warn!(room = %room.name, error = %e, "Broadcast failed");
                    }
                }
            }
            if rt.refresh.should_refresh(now) {
                let snapshot = rt.registry.refresh(relay);
                debug!(
                    room = %room.name,
                    phase = ?phase,
                    status = %rt.coordinator.status_line(),
                    clock = %rt.coordinator.clock_text(now),
                    countdown = ?rt.coordinator.countdown_text(now),
                    hud = ?snapshot.local_hud(),
                    leaders = ?snapshot.rows(config.leaderboard_slots),
                    "Scoreboard refreshed"
                );
            }
        }
    }

    /// Apply the stat writes this process owns for a broadcast elimination
    fn apply_message(&self, relay: &T, rt: &mut MatchRuntime, message: &GameMessage) {
        if rt.coordinator.phase() != MatchPhase::Live {
            debug!(?message, "Ignoring elimination outside live phase");
            return;
        }
        let is_authority = relay.authority().is_some();
        for action in plan_credit(message, relay.local_actor(), is_authority) {
            match action {
                CreditAction::LocalKill => {
                    if let Err(e) = credit_local_kill(relay) {
                        warn!(error = %e, "Kill credit failed");
                    }
                }
                CreditAction::LocalDeath => match record_local_death(relay) {
                    Ok(_) => {
                        let due_at =
                            relay.server_time() + self.state.player_respawn_delay().as_secs_f64();
                        rt.respawns.schedule(due_at, ());
                    }
                    Err(e) => warn!(error = %e, "Recording death failed"),
                },
                CreditAction::BotKill(view_id) => {
                    if let Err(e) = rt.bots.credit_bot_kill(relay, view_id) {
                        warn!(view_id, error = %e, "Bot kill credit failed");
                    }
                }
                CreditAction::BotDeath(view_id) => {
                    if let Err(e) = rt.bots.on_bot_eliminated(relay, view_id) {
                        warn!(view_id, error = %e, "Bot elimination failed");
                    }
                }
            }
        }
        rt.refresh.force_next();
    }

    /// Returns the outcome when the effect ends the session
    async fn apply_effect(
        &mut self,
        relay: &T,
        rt: &mut MatchRuntime,
        room: &RoomView,
        effect: MatchEffect,
    ) -> Option<SessionOutcome> {
        match effect {
            MatchEffect::CountdownStarted { deadline } => {
                info!(room = %room.name, deadline, "Countdown started");
                None
            }
            MatchEffect::SpawnLocalPlayer => {
                let position = self.state.spawn_layout.player_spawn(self.map, &mut self.rng);
                info!(
                    room = %room.name,
                    actor = relay.local_actor(),
                    ?position,
                    "Local player spawned"
                );
                if relay.authority().is_some() {
                    if let Err(e) = rt.bots.spawn_initial_batch(relay) {
                        warn!(room = %room.name, error = %e, "Initial bot batch failed");
                    }
                }
                None
            }
            MatchEffect::MatchLive { match_end } => {
                info!(room = %room.name, match_end, "Match live");
                None
            }
            MatchEffect::MatchEnded => {
                // Bots are left in place; they are destroyed with the room
                rt.bots.cancel_pending();
                let snapshot = rt.registry.refresh(relay).clone();
                let summary = snapshot.game_over();
                self.persist(&snapshot, &summary).await;
                info!(
                    room = %room.name,
                    winner = ?summary.winner_banner(),
                    result = %summary.local_line(),
                    "GAME OVER"
                );
                Some(SessionOutcome::Completed { summary })
            }
            MatchEffect::ReturnToLobby { reason } => {
                warn!(room = %room.name, reason = %reason, "Returning to lobby");
                Some(SessionOutcome::ReturnedToLobby { reason })
            }
        }
    }

    /// Best effort: a failed write is logged and dropped
    async fn persist(&self, snapshot: &ScoreboardSnapshot, summary: &GameOverSummary) {
        let scored = snapshot.local_entry().is_some_and(|e| e.score > 0);
        let result = MatchResult {
            kills: summary.local_kills,
            deaths: summary.local_deaths,
            won: summary.local_won() && scored,
        };
        if let Err(e) = self
            .state
            .profile_store
            .record_match(&self.account, &result)
            .await
        {
            warn!(account = %self.account, error = %e, "Failed to save match stats");
        }
    }
}
