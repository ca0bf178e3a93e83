//! Kill-credit rules
//!
//! Ownership is partitioned: a human's kills/deaths/score are written only by that
//! human's own process, bot stats only by the authority.

use tracing::{debug, info};

use crate::relay::{ActorId, GameMessage, ParticipantId, RelayError, RelayTransport, ViewId};

use super::room_props::{ParticipantProperties, RoomPropertyStore};

/// Score awarded per kill
pub const KILL_SCORE: u32 = 100;

/// Stat change this process is responsible for applying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditAction {
    LocalKill,
    LocalDeath,
    BotKill(ViewId),
    BotDeath(ViewId),
}

/// Decide which stat writes this process owns for a broadcast message
pub fn plan_credit(message: &GameMessage, local: ActorId, is_authority: bool) -> Vec<CreditAction> {
    let GameMessage::Eliminated { victim, attacker } = message;
    let mut actions = Vec::new();

    match attacker {
        Some(ParticipantId::Human(actor)) if *actor == local && Some(*victim) != *attacker => {
            actions.push(CreditAction::LocalKill)
        }
        Some(ParticipantId::Bot(view_id)) if is_authority && Some(*victim) != *attacker => {
            actions.push(CreditAction::BotKill(*view_id))
        }
        _ => {}
    }

    match victim {
        ParticipantId::Human(actor) if *actor == local => actions.push(CreditAction::LocalDeath),
        ParticipantId::Bot(view_id) if is_authority => {
            actions.push(CreditAction::BotDeath(*view_id))
        }
        _ => {}
    }

    actions
}

/// Credit a kill to the local human: +1 kill, +KILL_SCORE score
pub fn credit_local_kill<T: RelayTransport>(
    relay: &T,
) -> Result<ParticipantProperties, RelayError> {
    let current = RoomPropertyStore::local_participant(relay);
    let updated = ParticipantProperties {
        kills: Some(current.kills().saturating_add(1)),
        score: Some(current.score().saturating_add(KILL_SCORE)),
        ..current
    };
    RoomPropertyStore::publish_local(relay, &updated)?;
    info!(
        actor = relay.local_actor(),
        kills = updated.kills(),
        score = updated.score(),
        "Kill credited"
    );
    Ok(updated)
}

/// Record a death for the local human
pub fn record_local_death<T: RelayTransport>(
    relay: &T,
) -> Result<ParticipantProperties, RelayError> {
    let current = RoomPropertyStore::local_participant(relay);
    let updated = ParticipantProperties {
        deaths: Some(current.deaths().saturating_add(1)),
        alive: Some(false),
        ..current
    };
    RoomPropertyStore::publish_local(relay, &updated)?;
    debug!(actor = relay.local_actor(), deaths = updated.deaths(), "Death recorded");
    Ok(updated)
}

/// Mark the local human alive again after the respawn delay
pub fn record_local_respawn<T: RelayTransport>(relay: &T) -> Result<(), RelayError> {
    let update = ParticipantProperties {
        alive: Some(true),
        ..ParticipantProperties::default()
    };
    RoomPropertyStore::publish_local(relay, &update)?;
    debug!(actor = relay.local_actor(), "Local player respawned");
    Ok(())
}
