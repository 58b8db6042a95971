//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Seconds simulated by one tick at `tick_rate` ticks per second
pub fn tick_delta(tick_rate: u32) -> f32 {
    1.0 / tick_rate.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_guards_zero_rate() {
        assert!((tick_delta(30) - 1.0 / 30.0).abs() < f32::EPSILON);
        assert_eq!(tick_delta(0), 1.0);
    }
}
