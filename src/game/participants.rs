//! Unified view of human and bot participants

use crate::relay::{ActorId, BotState, ParticipantId, ParticipantInfo, RelayTransport, ViewId};

use super::room_props::ParticipantProperties;
use super::snapshot::{ScoreEntry, ScoreboardSnapshot};

/// Name shown for humans who never set one
pub const UNNAMED: &str = "Unnamed";

/// Shared accessors for anything that appears on the scoreboard
pub trait Scored {
    fn display_name(&self) -> &str;
    fn score(&self) -> u32;
    fn kills(&self) -> u32;
    fn deaths(&self) -> u32;
}

/// A human member, stats read from its replicated participant properties
#[derive(Debug, Clone)]
pub struct HumanParticipant {
    pub actor: ActorId,
    pub name: String,
    pub stats: ParticipantProperties,
    pub is_local: bool,
}

impl From<&ParticipantInfo> for HumanParticipant {
    fn from(info: &ParticipantInfo) -> Self {
        let name = if info.nickname.is_empty() {
            UNNAMED.to_string()
        } else {
            info.nickname.clone()
        };
        Self {
            actor: info.actor,
            name,
            stats: ParticipantProperties::from_wire(&info.properties),
            is_local: info.is_local,
        }
    }
}

impl Scored for HumanParticipant {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn score(&self) -> u32 {
        self.stats.score()
    }

    fn kills(&self) -> u32 {
        self.stats.kills()
    }

    fn deaths(&self) -> u32 {
        self.stats.deaths()
    }
}

/// A bot, stats read straight from its replicated object state
#[derive(Debug, Clone)]
pub struct BotParticipant {
    pub view_id: ViewId,
    pub state: BotState,
}

impl Scored for BotParticipant {
    fn display_name(&self) -> &str {
        &self.state.name
    }

    fn score(&self) -> u32 {
        self.state.score
    }

    fn kills(&self) -> u32 {
        self.state.kills
    }

    fn deaths(&self) -> u32 {
        self.state.deaths
    }
}

/// Any scored combatant
#[derive(Debug, Clone)]
pub enum Participant {
    Human(HumanParticipant),
    Bot(BotParticipant),
}

impl Participant {
    pub fn id(&self) -> ParticipantId {
        match self {
            Participant::Human(h) => ParticipantId::Human(h.actor),
            Participant::Bot(b) => ParticipantId::Bot(b.view_id),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Participant::Human(h) if h.is_local)
    }

    fn as_scored(&self) -> &dyn Scored {
        match self {
            Participant::Human(h) => h,
            Participant::Bot(b) => b,
        }
    }
}

impl Scored for Participant {
    fn display_name(&self) -> &str {
        self.as_scored().display_name()
    }

    fn score(&self) -> u32 {
        self.as_scored().score()
    }

    fn kills(&self) -> u32 {
        self.as_scored().kills()
    }

    fn deaths(&self) -> u32 {
        self.as_scored().deaths()
    }
}

/// Builds scoreboard snapshots from the current participants
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    latest: ScoreboardSnapshot,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Humans in provider order, then bots in spawn order
    pub fn collect(humans: &[ParticipantInfo], bots: &[BotState]) -> Vec<Participant> {
        humans
            .iter()
            .map(|info| Participant::Human(HumanParticipant::from(info)))
            .chain(bots.iter().map(|state| {
                Participant::Bot(BotParticipant {
                    view_id: state.view_id,
                    state: state.clone(),
                })
            }))
            .collect()
    }

    /// Rebuild the snapshot from the relay's current view
    pub fn refresh<T: RelayTransport>(&mut self, relay: &T) -> &ScoreboardSnapshot {
        let participants = Self::collect(&relay.participants(), &relay.bots());
        self.latest = ScoreboardSnapshot::build(participants.iter().map(|p| ScoreEntry {
            id: p.id(),
            name: p.display_name().to_string(),
            score: p.score(),
            kills: p.kills(),
            deaths: p.deaths(),
            is_local: p.is_local(),
        }));
        &self.latest
    }

    /// Last snapshot built by [`refresh`](Self::refresh)
    pub fn latest(&self) -> &ScoreboardSnapshot {
        &self.latest
    }
}
