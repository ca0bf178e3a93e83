//! Lone Wolf match simulator
//!
//! Runs several client peers against an in-process relay. Each peer:
//! - resolves its nickname from the profile store
//! - matchmakes into a shared room for the configured map
//! - plays the room-synchronized match lifecycle with bots filling empty slots
//! - persists its kills, deaths, and coins at game over

mod app;
mod config;
mod game;
mod matchmaking;
mod relay;
mod store;
mod util;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::sim::SimulatedCombat;
use crate::app::{AppState, PeerSession, SessionOutcome};
use crate::config::Config;

/// Gap between peer launches so the first one creates the room
const PEER_STAGGER: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    let seed = config.sim_seed.unwrap_or_else(rand::random);
    info!("Starting Lone Wolf match simulator");
    info!(
        peers = config.sim_peers,
        map = ?config.sim_map,
        seed,
        remote_profiles = config.profile_db_url.is_some(),
        "Simulation configured"
    );

    let state = AppState::new(config.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(config.sim_peers);
    for i in 0..config.sim_peers {
        let peer = Arc::new(state.hub.connect());
        let account = format!("sim-{i}");
        let peer_seed = seed.wrapping_add(i as u64);
        let session = PeerSession::new(
            state.clone(),
            peer,
            account.clone(),
            config.sim_map,
            cancel_rx.clone(),
            peer_seed,
        )
        .with_simulated_combat(SimulatedCombat::new(
            config.sim_elimination_interval,
            peer_seed,
        ));
        let delay = PEER_STAGGER * i as u32;
        handles.push((
            account,
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                session.run().await
            }),
        ));
    }

    let mut sessions = Box::pin(async {
        for (account, handle) in handles {
            match handle.await {
                Ok(Ok(SessionOutcome::Completed { summary })) => info!(
                    account = %account,
                    winner = ?summary.winner,
                    result = %summary.local_line(),
                    "Session completed"
                ),
                Ok(Ok(SessionOutcome::ReturnedToLobby { reason })) => {
                    warn!(account = %account, reason = %reason, "Session returned to lobby")
                }
                Ok(Ok(SessionOutcome::Cancelled)) => info!(account = %account, "Session cancelled"),
                Ok(Err(e)) => error!(account = %account, error = %e, "Session failed"),
                Err(e) => error!(account = %account, error = %e, "Session task panicked"),
            }
        }
    });

    let interrupted = tokio::select! {
        _ = &mut sessions => false,
        _ = shutdown_signal() => true,
    };
    if interrupted {
        cancel_tx.send(true).ok();
        sessions.await;
    }

    info!("Simulation complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling sessions");
        }
        _ = terminate => {
            info!("Received terminate signal, cancelling sessions");
        }
    }
}
