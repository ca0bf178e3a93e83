//! Frame timing and clock formatting

use std::time::Duration;

/// Frame rate of the per-peer loop
pub const FRAME_TPS: u32 = 30;

/// Duration of one frame
pub fn frame_interval() -> Duration {
    Duration::from_micros(1_000_000 / FRAME_TPS as u64)
}

/// Seconds until `deadline`, clamped at zero
pub fn remaining(deadline: f64, now: f64) -> f64 {
    (deadline - now).max(0.0)
}

/// `MM:SS` for a non-negative number of seconds (fraction rounds down)
pub fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// One decimal place with a trailing `s`, e.g. `4.2s`
pub fn format_countdown(secs: f64) -> String {
    format!("{:.1}s", secs.max(0.0))
}
