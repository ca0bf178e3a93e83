//! Application wiring: shared state, peer sessions, and simulated combat

pub mod session;
pub mod sim;
pub mod state;

pub use session::{PeerSession, SessionOutcome};
pub use state::AppState;
