//! Time utilities for the fixed-rate simulation

use std::time::{Duration, Instant};

/// Authoritative ticks per second
pub const TICK_RATE: u32 = 60;

/// Frame time in microseconds (~16.667 ms)
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / TICK_RATE as u64;

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

/// Simulation delta for one frame (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / TICK_RATE as f32
}

/// Wall-clock length of one tick at the given rate
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / tick_rate.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_hz_frame_is_about_sixteen_ms() {
        assert_eq!(TICK_DURATION_MICROS, 16_666);
        assert_eq!(tick_duration(TICK_RATE), Duration::from_micros(16_666));
        assert!((tick_delta() - 1.0 / 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn zero_tick_rate_does_not_divide_by_zero() {
        assert_eq!(tick_duration(0), Duration::from_secs(1));
    }
}
