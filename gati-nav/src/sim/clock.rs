//! Virtual clock for running the stack faster than real time

use std::thread;
use std::time::{Duration, Instant};

use crate::hal::Clock;

/// Clock whose milliseconds pass `speed_factor` times faster than wall time
#[derive(Debug, Clone)]
pub struct ScaledClock {
    start: Instant,
    speed_factor: f64,
}

impl ScaledClock {
    /// A factor of 1.0 behaves like [`crate::hal::SystemClock`]
    pub fn new(speed_factor: f64) -> Self {
        Self {
            start: Instant::now(),
            speed_factor: speed_factor.max(f64::MIN_POSITIVE),
        }
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }
}

impl Clock for ScaledClock {
    fn now_ms(&self) -> u64 {
        (self.start.elapsed().as_secs_f64() * 1000.0 * self.speed_factor) as u64
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_secs_f64(ms as f64 / 1000.0 / self.speed_factor));
    }
}
