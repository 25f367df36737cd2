//! Shared state between the sensor task and the control loop.
//!
//! The sensor task is the only writer of pulse counters and obstacle
//! distances; the control loop only reads them (and empties the counters).
//! Everything is a plain atomic so neither side can ever block the other.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::types::Side;

/// Sentinel distance reported while an object is near (mm)
pub const OBSTACLE_NEAR_MM: i32 = 0;

/// Sentinel distance reported while nothing is near (mm)
pub const OBSTACLE_FAR_MM: i32 = 100_000;

/// Distance reported before the first valid proximity sample
pub const OBSTACLE_UNKNOWN_MM: i32 = 1_000_000;

/// Lock-free sensor state shared by reference between threads.
#[derive(Debug)]
pub struct SharedSensorState {
    /// Debounced slot transitions per wheel since the last take
    pulses: [AtomicI32; 2],

    /// Pseudo-distance per proximity sensor (one of the sentinels above)
    obstacle_mm: [AtomicI32; 2],

    /// Stop request for the sensor task
    stop: AtomicBool,

    /// Set while a sensor task owns this state
    task_running: AtomicBool,
}

impl SharedSensorState {
    pub fn new() -> Self {
        Self {
            pulses: [AtomicI32::new(0), AtomicI32::new(0)],
            obstacle_mm: [
                AtomicI32::new(OBSTACLE_UNKNOWN_MM),
                AtomicI32::new(OBSTACLE_UNKNOWN_MM),
            ],
            stop: AtomicBool::new(false),
            task_running: AtomicBool::new(false),
        }
    }

    /// Count one debounced transition (sensor task only).
    #[inline]
    pub fn record_pulse(&self, side: Side) {
        self.pulses[side.index()].fetch_add(1, Ordering::AcqRel);
    }

    /// Pulses accumulated since the last take, without resetting.
    #[inline]
    pub fn peek_pulse_count(&self, side: Side) -> i32 {
        self.pulses[side.index()].load(Ordering::Acquire)
    }

    /// Read and zero the counter in one atomic exchange, so a pulse recorded
    /// concurrently is either returned now or kept for the next take.
    #[inline]
    pub fn take_pulse_count(&self, side: Side) -> i32 {
        self.pulses[side.index()].swap(0, Ordering::AcqRel)
    }

    /// Overwrite a counter
    #[cfg(test)]
    pub(crate) fn force_pulse_count(&self, side: Side, count: i32) {
        self.pulses[side.index()].store(count, Ordering::Release);
    }

    /// Publish the latest near/far decision for one proximity sensor.
    #[inline]
    pub fn set_obstacle(&self, side: Side, near: bool) {
        let mm = if near {
            OBSTACLE_NEAR_MM
        } else {
            OBSTACLE_FAR_MM
        };
        self.obstacle_mm[side.index()].store(mm, Ordering::Release);
    }

    /// Pseudo-distance for one side: 0 when near, 100000 when far.
    #[inline]
    pub fn obstacle_distance_mm(&self, side: Side) -> i32 {
        self.obstacle_mm[side.index()].load(Ordering::Acquire)
    }

    /// True if either side reports something closer than `threshold_mm`.
    pub fn has_obstacle(&self, threshold_mm: f64) -> bool {
        Side::BOTH
            .iter()
            .any(|&side| (self.obstacle_distance_mm(side) as f64) < threshold_mm)
    }

    /// Ask the sensor task to exit after its current sample.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Claim the state for a sensor task. Returns false if one already runs.
    pub(crate) fn claim_task(&self) -> bool {
        let claimed = self
            .task_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.stop.store(false, Ordering::Release);
        }
        claimed
    }

    pub(crate) fn release_task(&self) {
        self.task_running.store(false, Ordering::Release);
    }
}

impl Default for SharedSensorState {
    fn default() -> Self {
        Self::new()
    }
}
