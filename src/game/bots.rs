//! Authority-side bot lifecycle: initial batch, elimination and respawn with carried stats

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::relay::{BotSpawn, BotState, BotStats, Position, RelayError, RelayTransport, ViewId};

use super::combat::KILL_SCORE;
use super::r#match::MatchPhase;
use super::scheduler::DelayedActions;
use super::spawn::{sample_spawn_point, NavSurface};

/// Bot tuning
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Network prefab instantiated per bot; None disables bots
    pub prefab: Option<String>,
    /// Seconds between a bot's death and its replacement
    pub respawn_delay: f64,
    /// Horizontal jitter around the chosen anchor
    pub jitter: f32,
    /// Max distance when snapping onto the walkable surface
    pub search_radius: f32,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefab: Some("Bot".to_string()),
            respawn_delay: 5.0,
            jitter: 3.0,
            search_radius: 10.0,
        }
    }
}

/// Bot lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Bot operations require the room authority")]
    NotAuthority,

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Owns bot spawning for the room. Only does anything while this process holds authority.
pub struct BotLifecycleCoordinator {
    settings: BotSettings,
    anchors: Vec<Position>,
    nav: Arc<dyn NavSurface>,
    rng: ChaCha8Rng,
    initial_batch_spawned: bool,
    respawns: DelayedActions<ViewId>,
}

impl BotLifecycleCoordinator {
    pub fn new(
        settings: BotSettings,
        anchors: Vec<Position>,
        nav: Arc<dyn NavSurface>,
        seed: u64,
    ) -> Self {
        Self {
            settings,
            anchors,
            nav,
            rng: ChaCha8Rng::seed_from_u64(seed),
            initial_batch_spawned: false,
            respawns: DelayedActions::new(),
        }
    }

    pub fn pending_respawns(&self) -> usize {
        self.respawns.len()
    }

    fn is_configured(&self) -> bool {
        self.settings.prefab.is_some() && !self.anchors.is_empty()
    }

    fn spawn_position(&mut self) -> Option<Position> {
        sample_spawn_point(
            &self.anchors,
            self.nav.as_ref(),
            self.settings.jitter,
            self.settings.search_radius,
            &mut self.rng,
        )
    }

    fn fresh_name(&mut self) -> String {
        format!("Bot {}", self.rng.gen_range(100..1000))
    }

    /// Fill the room up to capacity with fresh bots. Runs at most once per match.
    pub fn spawn_initial_batch<T: RelayTransport>(&mut self, relay: &T) -> Result<usize, BotError> {
        if self.initial_batch_spawned {
            return Ok(0);
        }
        if !self.is_configured() {
            warn!("No bot prefab or spawn anchors configured; skipping bots");
            self.initial_batch_spawned = true;
            return Ok(0);
        }
        let token = relay.authority().ok_or(BotError::NotAuthority)?;
        let room = relay.current_room().ok_or(RelayError::NotInRoom)?;
        if !relay.bots().is_empty() {
            // A previous authority already populated this room
            self.initial_batch_spawned = true;
            return Ok(0);
        }

        let humans = relay.participants().len();
        let needed = (room.capacity as usize).saturating_sub(humans);
        for _ in 0..needed {
            let stats = BotStats {
                name: self.fresh_name(),
                ..BotStats::default()
            };
            let Some(position) = self.spawn_position() else {
                break;
            };
            let view_id = relay.spawn_bot(&token, BotSpawn { stats, position })?;
            debug!(room = %room.name, view_id, "Bot spawned");
        }
        self.initial_batch_spawned = true;
        info!(room = %room.name, humans, bots = needed, "Initial bot batch spawned");
        Ok(needed)
    }

    /// Spawn a replacement bot that keeps a dead bot's identity and stats.
    /// Dropped without side effects unless the match is Live.
    pub fn respawn_with_carried_stats<T: RelayTransport>(
        &mut self,
        relay: &T,
        phase: MatchPhase,
        stats: BotStats,
    ) -> Result<Option<ViewId>, BotError> {
        if phase != MatchPhase::Live {
            debug!(bot = %stats.name, ?phase, "Dropping bot respawn outside live phase");
            return Ok(None);
        }
        if !self.is_configured() {
            warn!(bot = %stats.name, "No bot prefab or spawn anchors configured; skipping respawn");
            return Ok(None);
        }
        let token = relay.authority().ok_or(BotError::NotAuthority)?;
        let Some(position) = self.spawn_position() else {
            return Ok(None);
        };
        let name = stats.name.clone();
        let view_id = relay.spawn_bot(&token, BotSpawn { stats, position })?;
        info!(bot = %name, view_id, "Bot respawned with carried stats");
        Ok(Some(view_id))
    }

    /// Record a bot death and schedule its replacement
    pub fn on_bot_eliminated<T: RelayTransport>(
        &mut self,
        relay: &T,
        view_id: ViewId,
    ) -> Result<(), BotError> {
        let mut bot = self.bot_state(relay, view_id)?;
        if !bot.alive {
            return Ok(());
        }
        let token = relay.authority().ok_or(BotError::NotAuthority)?;
        bot.deaths = bot.deaths.saturating_add(1);
        bot.alive = false;
        relay.update_bot(&token, &bot)?;

        let due_at = relay.server_time() + self.settings.respawn_delay;
        self.respawns.schedule(due_at, view_id);
        debug!(view_id, bot = %bot.name, deaths = bot.deaths, due_at, "Bot eliminated");
        Ok(())
    }

    /// +1 kill and +KILL_SCORE for a bot attacker
    pub fn credit_bot_kill<T: RelayTransport>(
        &mut self,
        relay: &T,
        view_id: ViewId,
    ) -> Result<(), BotError> {
        let mut bot = self.bot_state(relay, view_id)?;
        let token = relay.authority().ok_or(BotError::NotAuthority)?;
        bot.kills = bot.kills.saturating_add(1);
        bot.score = bot.score.saturating_add(KILL_SCORE);
        relay.update_bot(&token, &bot)?;
        debug!(view_id, bot = %bot.name, kills = bot.kills, "Bot kill credited");
        Ok(())
    }

    /// Pick up bots left behind by a previous authority: dead ones get a replacement scheduled
    pub fn adopt<T: RelayTransport>(&mut self, relay: &T) {
        let bots = relay.bots();
        if bots.is_empty() {
            return;
        }
        self.initial_batch_spawned = true;
        let due_at = relay.server_time() + self.settings.respawn_delay;
        let mut orphaned = 0;
        for bot in bots.iter().filter(|b| !b.alive) {
            self.respawns.schedule(due_at, bot.view_id);
            orphaned += 1;
        }
        info!(bots = bots.len(), orphaned, "Adopted bots from previous authority");
    }

    /// Fire due respawns. Returns the view ids of the replacement bots.
    /// The corpse is only destroyed once its replacement exists; a failed spawn keeps
    /// the corpse and retries after another respawn delay.
    pub fn tick<T: RelayTransport>(
        &mut self,
        relay: &T,
        phase: MatchPhase,
    ) -> Result<Vec<ViewId>, BotError> {
        let token = relay.authority().ok_or(BotError::NotAuthority)?;
        let now = relay.server_time();
        let mut spawned = Vec::new();
        for view_id in self.respawns.drain_due(now) {
            if phase != MatchPhase::Live {
                debug!(view_id, ?phase, "Respawn timer fired outside live phase");
                continue;
            }
            let Ok(dead) = self.bot_state(relay, view_id) else {
                continue;
            };
            match self.respawn_with_carried_stats(relay, phase, dead.stats()) {
                Ok(replacement) => {
                    if let Err(e) = relay.destroy_bot(&token, view_id) {
                        warn!(view_id, error = %e, "Failed to destroy dead bot");
                    }
                    spawned.extend(replacement);
                }
                Err(e) => {
                    warn!(view_id, bot = %dead.name, error = %e, "Bot respawn failed; retrying");
                    self.respawns.schedule(now + self.settings.respawn_delay, view_id);
                }
            }
        }
        Ok(spawned)
    }

    /// Drop every pending respawn
    pub fn cancel_pending(&mut self) {
        self.respawns.clear();
    }

    fn bot_state<T: RelayTransport>(
        &self,
        relay: &T,
        view_id: ViewId,
    ) -> Result<BotState, BotError> {
        relay
            .bots()
            .into_iter()
            .find(|b| b.view_id == view_id)
            .ok_or(BotError::Relay(RelayError::UnknownObject(view_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spawn::FlatNavSurface;
    use crate::relay::{LocalRelayHub, RoomOptions};
    use std::time::Duration;

    fn coordinator(settings: BotSettings, anchors: Vec<Position>) -> BotLifecycleCoordinator {
        let floor = FlatNavSurface {
            min_x: -100.0,
            max_x: 100.0,
            min_z: -100.0,
            max_z: 100.0,
            ground_y: 0.0,
        };
        BotLifecycleCoordinator::new(settings, anchors, Arc::new(floor), 42)
    }

    fn anchors() -> Vec<Position> {
        vec![Position::new(0.0, 0.0, 0.0), Position::new(20.0, 0.0, 20.0)]
    }

    async fn room_with(capacity: u8) -> (LocalRelayHub, crate::relay::LocalPeer) {
        let hub = LocalRelayHub::new();
        let peer = hub.connect();
        let options = RoomOptions {
            capacity,
            ..RoomOptions::default()
        };
        peer.join_or_create("Bots", &options).await.unwrap();
        (hub, peer)
    }

    #[tokio::test]
    async fn initial_batch_fills_to_capacity_once() {
        let (hub, host) = room_with(5).await;
        let guest = hub.connect();
        guest.join_or_create("Bots", &RoomOptions::default()).await.unwrap();

        let mut bots = coordinator(BotSettings::default(), anchors());
        assert_eq!(bots.spawn_initial_batch(&host).unwrap(), 3);
        assert_eq!(bots.spawn_initial_batch(&host).unwrap(), 0);

        let spawned = guest.bots();
        assert_eq!(spawned.len(), 3);
        for bot in &spawned {
            let suffix: u32 = bot.name.trim_start_matches("Bot ").parse().unwrap();
            assert!((100..1000).contains(&suffix));
            assert_eq!((bot.score, bot.kills, bot.deaths), (0, 0, 0));
        }
    }

    #[tokio::test]
    async fn non_authority_cannot_spawn() {
        let (hub, _host) = room_with(4).await;
        let guest = hub.connect();
        guest.join_or_create("Bots", &RoomOptions::default()).await.unwrap();

        let mut bots = coordinator(BotSettings::default(), anchors());
        assert!(matches!(
            bots.spawn_initial_batch(&guest),
            Err(BotError::NotAuthority)
        ));
        assert!(guest.bots().is_empty());
    }

    #[tokio::test]
    async fn missing_prefab_or_anchors_is_a_no_op() {
        let (_hub, host) = room_with(4).await;

        let settings = BotSettings {
            prefab: None,
            ..BotSettings::default()
        };
        let mut bots = coordinator(settings, anchors());
        assert_eq!(bots.spawn_initial_batch(&host).unwrap(), 0);

        let mut bots = coordinator(BotSettings::default(), Vec::new());
        assert_eq!(bots.spawn_initial_batch(&host).unwrap(), 0);
        let carried = bots
            .respawn_with_carried_stats(&host, MatchPhase::Live, BotStats::default())
            .unwrap();
        assert!(carried.is_none());
        assert!(host.bots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_bot_returns_with_its_stats_after_delay() {
        let (_hub, host) = room_with(2).await;
        let token = host.authority().unwrap();
        let mut bots = coordinator(BotSettings::default(), anchors());

        let original = host
            .spawn_bot(
                &token,
                BotSpawn {
                    stats: BotStats {
                        name: "Bot 451".into(),
                        score: 300,
                        kills: 3,
                        deaths: 0,
                    },
                    position: Position::default(),
                },
            )
            .unwrap();

        bots.on_bot_eliminated(&host, original).unwrap();
        // A second report for the same corpse is ignored
        bots.on_bot_eliminated(&host, original).unwrap();
        assert_eq!(bots.pending_respawns(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(bots.tick(&host, MatchPhase::Live).unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let spawned = bots.tick(&host, MatchPhase::Live).unwrap();
        assert_eq!(spawned.len(), 1);

        let all = host.bots();
        assert_eq!(all.len(), 1);
        let replacement = &all[0];
        assert_ne!(replacement.view_id, original);
        assert_eq!(replacement.name, "Bot 451");
        assert_eq!(
            (replacement.score, replacement.kills, replacement.deaths),
            (300, 3, 1)
        );
        assert!(replacement.alive);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_respawn_keeps_the_corpse_and_the_rest_of_the_batch() {
        let (hub, host) = room_with(3).await;
        let mut bots = coordinator(BotSettings::default(), anchors());
        bots.spawn_initial_batch(&host).unwrap();
        let first = host.bots()[0].clone();
        let second = host.bots()[1].view_id;

        bots.on_bot_eliminated(&host, first.view_id).unwrap();
        bots.on_bot_eliminated(&host, second).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        hub.refuse_bot_spawns(true);
        assert!(bots.tick(&host, MatchPhase::Live).unwrap().is_empty());
        assert_eq!(bots.pending_respawns(), 2);
        let corpse = host
            .bots()
            .into_iter()
            .find(|b| b.view_id == first.view_id)
            .unwrap();
        assert!(!corpse.alive);
        assert_eq!(corpse.name, first.name);

        hub.refuse_bot_spawns(false);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(bots.tick(&host, MatchPhase::Live).unwrap().len(), 2);
        let all = host.bots();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|b| b.alive && b.deaths == 1));
        assert!(all.iter().any(|b| b.name == first.name));
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_after_match_end_spawns_nothing() {
        let (_hub, host) = room_with(2).await;
        let mut bots = coordinator(BotSettings::default(), anchors());
        bots.spawn_initial_batch(&host).unwrap();
        let victim = host.bots()[0].view_id;

        bots.on_bot_eliminated(&host, victim).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(bots.tick(&host, MatchPhase::Ended).unwrap().is_empty());

        let direct = bots
            .respawn_with_carried_stats(&host, MatchPhase::Ended, host.bots()[0].stats())
            .unwrap();
        assert!(direct.is_none());

        // The corpse stays on the scoreboard
        let all = host.bots();
        assert_eq!(all.len(), 1);
        assert!(!all[0].alive);
        assert_eq!(all[0].deaths, 1);
    }

    #[tokio::test]
    async fn bot_kill_credit_updates_replicated_state() {
        let (_hub, host) = room_with(2).await;
        let mut bots = coordinator(BotSettings::default(), anchors());
        bots.spawn_initial_batch(&host).unwrap();
        let shooter = host.bots()[0].view_id;

        bots.credit_bot_kill(&host, shooter).unwrap();
        bots.credit_bot_kill(&host, shooter).unwrap();
        let state = host.bots()[0].clone();
        assert_eq!((state.kills, state.score), (2, 200));

        assert!(matches!(
            bots.credit_bot_kill(&host, 9),
            Err(BotError::Relay(RelayError::UnknownObject(9)))
        ));
    }
}
