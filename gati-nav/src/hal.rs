//! Hardware capability traits.
//!
//! The control stack never touches GPIO, SPI or PWM registers directly. It is
//! handed implementations of these traits, already configured:
//!
//! | Trait | Capability |
//! |-------|------------|
//! | [`Clock`] | monotonic milliseconds, best-effort sleep |
//! | [`AnalogInput`] | raw ADC sample per channel |
//! | [`PwmOutput`] | duty register write per wheel servo |
//!
//! [`crate::sim::SimulatedRobot`] implements the last two for hardware-free runs.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::types::Side;

/// Millisecond clock shared by the sensor task and the control loop
pub trait Clock: Send + Sync {
    /// Monotonic time in milliseconds
    fn now_ms(&self) -> u64;

    /// Sleep for `ms` milliseconds. May overshoot.
    fn sleep_ms(&self, ms: u64);
}

/// Analog-to-digital converter
pub trait AnalogInput: Send + Sync {
    /// Read a raw sample. Channels the converter does not have read as 0.
    fn read_channel(&self, channel: u8) -> i32;
}

/// Servo pulse output, one duty register per wheel
pub trait PwmOutput: Send {
    /// Write a duty cycle expressed in PWM ticks
    fn write_duty(&mut self, side: Side, ticks: u32) -> Result<()>;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
