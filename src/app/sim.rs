//! Simulated combat: stands in for weapons and hit detection in the simulator binary

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::debug;

use crate::game::room_props::ParticipantProperties;
use crate::game::MatchPhase;
use crate::relay::{GameMessage, ParticipantId, RelayTransport};

/// Chance that a death has no attacker (fall damage and the like)
const ENVIRONMENT_DEATH_CHANCE: f64 = 0.1;

/// Picks a random elimination on a fixed interval while this process is the Live authority.
/// Only living humans and bots are eligible.
pub struct SimulatedCombat {
    interval: f64,
    next_at: Option<f64>,
    rng: ChaCha8Rng,
}

impl SimulatedCombat {
    pub fn new(interval: Duration, seed: u64) -> Self {
        Self {
            interval: interval.as_secs_f64(),
            next_at: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Next elimination to broadcast, if one is due
    pub fn poll<T: RelayTransport>(&mut self, relay: &T, phase: MatchPhase) -> Option<GameMessage> {
        if phase != MatchPhase::Live || relay.authority().is_none() {
            self.next_at = None;
            return None;
        }
        let now = relay.server_time();
        let due = *self.next_at.get_or_insert(now + self.interval);
        if now < due {
            return None;
        }
        self.next_at = Some(now + self.interval);

        let mut candidates: Vec<ParticipantId> = relay
            .participants()
            .iter()
            .filter(|p| ParticipantProperties::from_wire(&p.properties).is_alive())
            .map(|p| ParticipantId::Human(p.actor))
            .chain(
                relay
                    .bots()
                    .iter()
                    .filter(|b| b.alive)
                    .map(|b| ParticipantId::Bot(b.view_id)),
            )
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let victim = candidates.swap_remove(self.rng.gen_range(0..candidates.len()));
        let attacker = if candidates.is_empty() || self.rng.gen_bool(ENVIRONMENT_DEATH_CHANCE) {
            None
        } else {
            Some(candidates[self.rng.gen_range(0..candidates.len())])
        };
        debug!(?victim, ?attacker, "Simulated elimination");
        Some(GameMessage::Eliminated { victim, attacker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::record_local_death;
    use crate::relay::{LocalRelayHub, RoomOptions};
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn fires_on_interval_only_for_live_authority() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let guest = hub.connect();
        host.join_or_create("Sim", &RoomOptions::default()).await.unwrap();
        guest.join_or_create("Sim", &RoomOptions::default()).await.unwrap();

        let mut combat = SimulatedCombat::new(Duration::from_secs(4), 5);
        let mut guest_combat = SimulatedCombat::new(Duration::from_secs(4), 5);
        assert!(combat.poll(&host, MatchPhase::Waiting).is_none());
        assert!(combat.poll(&host, MatchPhase::Live).is_none());

        advance(Duration::from_secs(4)).await;
        assert!(guest_combat.poll(&guest, MatchPhase::Live).is_none());
        let Some(GameMessage::Eliminated { victim, attacker }) =
            combat.poll(&host, MatchPhase::Live)
        else {
            panic!("expected an elimination");
        };
        assert_ne!(Some(victim), attacker);
        assert!(combat.poll(&host, MatchPhase::Live).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_humans_are_not_picked() {
        let hub = LocalRelayHub::new();
        let host = hub.connect();
        let guest = hub.connect();
        host.join_or_create("Sim", &RoomOptions::default()).await.unwrap();
        guest.join_or_create("Sim", &RoomOptions::default()).await.unwrap();
        record_local_death(&guest).unwrap();

        let mut combat = SimulatedCombat::new(Duration::from_secs(1), 11);
        combat.poll(&host, MatchPhase::Live);
        for _ in 0..20 {
            advance(Duration::from_secs(1)).await;
            let Some(GameMessage::Eliminated { victim, attacker }) =
                combat.poll(&host, MatchPhase::Live)
            else {
                panic!("expected an elimination");
            };
            assert_eq!(victim, ParticipantId::Human(host.local_actor()));
            assert_eq!(attacker, None);
        }
    }
}
