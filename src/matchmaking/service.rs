//! Matchmaking search - walks candidate room keys until it lands in a joinable room

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::game::room_props::{MapId, RoomProperties};
use crate::relay::{RelayError, RelayTransport, RoomOptions, RoomView};

use super::room_name::{candidate_room_name, room_options, CustomRoomRequest};

/// Search limits and the options for rooms we end up creating
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub max_attempts: u32,
    pub join_timeout: Duration,
    pub room_capacity: u8,
    pub match_length: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            join_timeout: Duration::from_secs(2),
            room_capacity: 20,
            match_length: 600,
        }
    }
}

/// Matchmaking errors
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("No joinable room found after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("Matchmaking cancelled")]
    Cancelled,

    #[error("Room name must not be empty")]
    InvalidRoomName,

    #[error("Joining room {room} timed out")]
    Timeout { room: String },

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Why a joined room was not accepted, if it wasn't
pub fn rejection_reason(props: &RoomProperties, now: f64) -> Option<&'static str> {
    if props.is_started() {
        return Some(match props.match_end {
            Some(end) if now >= end => "match already finished",
            _ => "match already running",
        });
    }
    match props.pre_game_end {
        Some(end) if now >= end => Some("countdown already elapsed"),
        _ => None,
    }
}

enum Attempt {
    Joined(RoomView),
    Failed(RelayError),
    TimedOut,
    Cancelled,
}

/// One matchmaking run, cancellable through a watch flag
pub struct MatchmakingSearch {
    settings: SearchSettings,
    cancel: watch::Receiver<bool>,
}

impl MatchmakingSearch {
    pub fn new(settings: SearchSettings, cancel: watch::Receiver<bool>) -> Self {
        Self { settings, cancel }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Join or create the first acceptable matchmade room for `map`
    pub async fn find_room<T: RelayTransport>(
        &mut self,
        relay: &T,
        map: MapId,
    ) -> Result<RoomView, MatchmakingError> {
        let options = room_options(map, self.settings.room_capacity, self.settings.match_length);
        let prefix = map.room_prefix();

        for attempt in 0..self.settings.max_attempts {
            if self.is_cancelled() {
                return Err(MatchmakingError::Cancelled);
            }
            let name = candidate_room_name(prefix, attempt);
            debug!(attempt, room = %name, "Trying matchmade room");

            match self.attempt(relay, &name, &options).await {
                Attempt::Joined(view) => {
                    let props = RoomProperties::from_wire(&view.properties);
                    match rejection_reason(&props, relay.server_time()) {
                        None => {
                            info!(
                                attempt,
                                room = %name,
                                players = view.player_count,
                                "Matchmaking found room"
                            );
                            return Ok(view);
                        }
                        Some(reason) => {
                            warn!(attempt, room = %name, reason, "Leaving stale room");
                            relay.leave_room().await?;
                        }
                    }
                }
                Attempt::Failed(e @ (RelayError::RoomFull(_) | RelayError::RoomClosed(_))) => {
                    debug!(attempt, room = %name, error = %e, "Room not joinable");
                }
                Attempt::Failed(e) => return Err(e.into()),
                Attempt::TimedOut => {
                    warn!(attempt, room = %name, "Join attempt timed out");
                    abandon(relay).await;
                }
                Attempt::Cancelled => {
                    abandon(relay).await;
                    return Err(MatchmakingError::Cancelled);
                }
            }
        }

        warn!(attempts = self.settings.max_attempts, "Matchmaking retry budget exhausted");
        Err(MatchmakingError::Exhausted {
            attempts: self.settings.max_attempts,
        })
    }

    /// Single join-or-create for a user-named room; no retry and no acceptance check
    pub async fn create_custom_room<T: RelayTransport>(
        &mut self,
        relay: &T,
        map: MapId,
        request: &CustomRoomRequest,
    ) -> Result<RoomView, MatchmakingError> {
        if self.is_cancelled() {
            return Err(MatchmakingError::Cancelled);
        }
        let options = request.options(map);
        match self.attempt(relay, &request.name, &options).await {
            Attempt::Joined(view) => {
                info!(
                    room = %view.name,
                    capacity = view.capacity,
                    match_length = request.match_length,
                    "Joined custom room"
                );
                Ok(view)
            }
            Attempt::Failed(e) => Err(e.into()),
            Attempt::TimedOut => {
                abandon(relay).await;
                Err(MatchmakingError::Timeout {
                    room: request.name.clone(),
                })
            }
            Attempt::Cancelled => {
                abandon(relay).await;
                Err(MatchmakingError::Cancelled)
            }
        }
    }

    async fn attempt<T: RelayTransport>(
        &mut self,
        relay: &T,
        name: &str,
        options: &RoomOptions,
    ) -> Attempt {
        let join = tokio::time::timeout(
            self.settings.join_timeout,
            relay.join_or_create(name, options),
        );
        tokio::select! {
            _ = cancelled(&mut self.cancel) => Attempt::Cancelled,
            outcome = join => match outcome {
                Ok(Ok(view)) => Attempt::Joined(view),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(_) => Attempt::TimedOut,
            },
        }
    }
}

/// Resolves once the flag reads true; never resolves if the sender is gone
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Leave whatever room a dropped join may have left us in
async fn abandon<T: RelayTransport>(relay: &T) {
    if relay.current_room().is_some() {
        if let Err(e) = relay.leave_room().await {
            debug!(error = %e, "Leaving abandoned room failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room_props::RoomMatchState;
    use crate::game::RoomPropertyStore;
    use crate::relay::LocalRelayHub;
    use tokio::time::{advance, Instant};

    fn new_search(settings: SearchSettings) -> (watch::Sender<bool>, MatchmakingSearch) {
        let (tx, rx) = watch::channel(false);
        (tx, MatchmakingSearch::new(settings, rx))
    }

    #[test]
    fn acceptance_rules() {
        let waiting = RoomProperties::initial(MapId::Map1, 600);
        assert_eq!(rejection_reason(&waiting, 50.0), None);

        let counting = RoomProperties {
            pre_game_end: Some(12.0),
            ..waiting.clone()
        };
        assert_eq!(rejection_reason(&counting, 11.0), None);
        assert!(rejection_reason(&counting, 12.0).is_some());

        let live = RoomProperties {
            match_state: Some(RoomMatchState::Started),
            match_end: Some(600.0),
            ..waiting.clone()
        };
        assert_eq!(rejection_reason(&live, 100.0), Some("match already running"));
        assert_eq!(rejection_reason(&live, 700.0), Some("match already finished"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_finished_room_is_left_and_next_suffix_tried() {
        let hub = LocalRelayHub::new();
        let occupant = hub.connect();
        occupant
            .join_or_create("Global_Map1_Match", &room_options(MapId::Map1, 20, 600))
            .await
            .unwrap();
        let token = occupant.authority().unwrap();
        let finished = RoomProperties {
            match_state: Some(RoomMatchState::Started),
            match_end: Some(5.0),
            ..RoomProperties::default()
        };
        RoomPropertyStore::publish(&occupant, &token, &finished).unwrap();
        advance(Duration::from_secs(10)).await;

        let peer = hub.connect();
        let (_tx, mut search) = new_search(SearchSettings::default());
        let view = search.find_room(&peer, MapId::Map1).await.unwrap();

        assert_eq!(view.name, "Global_Map1_Match_1");
        assert_eq!(peer.current_room().unwrap().name, "Global_Map1_Match_1");
        assert_eq!(hub.room("Global_Map1_Match").unwrap().player_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_join_times_out_and_moves_on() {
        let hub = LocalRelayHub::new();
        hub.stall_joins("Global_Map2_Match");
        let peer = hub.connect();
        let (_tx, mut search) = new_search(SearchSettings::default());

        let started = Instant::now();
        let view = search.find_room(&peer, MapId::Map2).await.unwrap();
        assert_eq!(view.name, "Global_Map2_Match_1");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn closed_rooms_exhaust_the_budget() {
        let hub = LocalRelayHub::new();
        let mut occupants = Vec::new();
        for attempt in 0..3 {
            let occupant = hub.connect();
            let closed = RoomOptions {
                open: false,
                ..room_options(MapId::Map1, 20, 600)
            };
            occupant
                .join_or_create(&candidate_room_name("Global_Map1", attempt), &closed)
                .await
                .unwrap();
            occupants.push(occupant);
        }

        let peer = hub.connect();
        let (_tx, mut search) = new_search(SearchSettings {
            max_attempts: 3,
            ..SearchSettings::default()
        });
        let err = search.find_room(&peer, MapId::Map1).await.unwrap_err();
        assert!(matches!(err, MatchmakingError::Exhausted { attempts: 3 }));
        assert!(peer.current_room().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_flag_stops_search() {
        let hub = LocalRelayHub::new();
        let peer = hub.connect();

        let (tx, mut pre_cancelled) = new_search(SearchSettings::default());
        tx.send(true).unwrap();
        assert!(matches!(
            pre_cancelled.find_room(&peer, MapId::Map1).await,
            Err(MatchmakingError::Cancelled)
        ));

        hub.stall_joins("Global_Map1_Match");
        let (tx, mut search) = new_search(SearchSettings::default());
        let (result, _) = tokio::join!(search.find_room(&peer, MapId::Map1), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(true).unwrap();
        });
        assert!(matches!(result, Err(MatchmakingError::Cancelled)));
        assert!(peer.current_room().is_none());
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn custom_room_uses_requested_capacity_and_length() {
        let hub = LocalRelayHub::new();
        let peer = hub.connect();
        let (_tx, mut search) = new_search(SearchSettings::default());
        let request = CustomRoomRequest::parse("Friends", "6", "3").unwrap();

        let view = search
            .create_custom_room(&peer, MapId::Map2, &request)
            .await
            .unwrap();
        assert_eq!(view.name, "Friends");
        assert_eq!(view.capacity, 6);
        let props = RoomProperties::from_wire(&view.properties);
        assert_eq!(props.match_length, Some(180));
        assert_eq!(props.map, Some(MapId::Map2));
    }
}
