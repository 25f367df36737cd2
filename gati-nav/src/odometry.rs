//! Wheel pulse-based odometry calculator
//!
//! Integrates pulse counts from the two slot sensors into a pose using
//! fixed-step Euler integration over the differential drive model.

use crate::config::RobotConfig;
use crate::error::{GatiError, Result};
use crate::shared::SharedSensorState;
use crate::types::{Pose, Side};

/// Odometry calculator for the differential drive robot
#[derive(Debug, Clone)]
pub struct Odometry {
    /// Wheel travel per counted pulse (mm)
    mm_per_pulse: f64,
    /// Distance between wheel contact points (mm)
    track_width_mm: f64,
    /// Euler substeps per integration
    steps: u32,
}

impl Odometry {
    /// Create a new odometry calculator
    ///
    /// # Arguments
    /// * `wheel_circumference_mm` - Wheel circumference (stock build: π·66mm)
    /// * `pulses_per_revolution` - Level changes counted per wheel turn (20)
    /// * `track_width_mm` - Distance between the wheels (115mm)
    /// * `steps` - Euler substeps per integration (1000)
    pub fn new(
        wheel_circumference_mm: f64,
        pulses_per_revolution: u32,
        track_width_mm: f64,
        steps: u32,
    ) -> Self {
        Self {
            mm_per_pulse: wheel_circumference_mm / pulses_per_revolution as f64,
            track_width_mm,
            steps: steps.max(1),
        }
    }

    pub fn from_config(config: &RobotConfig) -> Self {
        Self::new(
            config.wheel_circumference_mm(),
            config.pulses_per_revolution,
            config.track_width_mm,
            config.integration_steps,
        )
    }

    pub fn mm_per_pulse(&self) -> f64 {
        self.mm_per_pulse
    }

    /// Signed wheel travel for a pulse count
    pub fn pulses_to_mm(&self, pulses: i32, sign: f64) -> f64 {
        sign * self.mm_per_pulse * pulses as f64
    }

    /// Integrate wheel travel `dl`, `dr` (mm) starting from `pose`.
    ///
    /// The heading of the result is not normalized.
    pub fn integrate(&self, pose: Pose, dl: f64, dr: f64) -> Pose {
        // Skip if no movement
        if dl == 0.0 && dr == 0.0 {
            return pose;
        }

        let n = self.steps as f64;
        let dl = dl / n;
        let dr = dr / n;
        let d = (dl + dr) / 2.0;
        let dtheta = (dr - dl) / self.track_width_mm;

        let mut x = pose.x;
        let mut y = pose.y;
        let mut theta = pose.theta.to_radians();
        for _ in 0..self.steps {
            x += d * theta.cos();
            y += d * theta.sin();
            theta += dtheta;
        }

        Pose::new(x, y, theta.to_degrees())
    }

    /// Pose after the travel counted so far.
    ///
    /// # Arguments
    /// * `counter` - Reads a wheel's pulse count (peek or take)
    /// * `signs` - Travel sign per wheel, `[left, right]`
    /// * `pose` - Pose the counts are relative to
    ///
    /// # Errors
    /// `SensorFault` if either count is negative; no partial pose is produced.
    pub fn displacement(
        &self,
        mut counter: impl FnMut(Side) -> i32,
        signs: [f64; 2],
        pose: Pose,
    ) -> Result<Pose> {
        let left = counter(Side::Left);
        let right = counter(Side::Right);

        for (side, count) in [(Side::Left, left), (Side::Right, right)] {
            if count < 0 {
                tracing::error!("Broken sensor reads: L={}, R={}", left, right);
                return Err(GatiError::SensorFault { side, count });
            }
        }

        let dl = self.pulses_to_mm(left, signs[0]);
        let dr = self.pulses_to_mm(right, signs[1]);
        Ok(self.integrate(pose, dl, dr))
    }

    /// Live pose during a motion; counters are left untouched
    pub fn peek_update_point(
        &self,
        shared: &SharedSensorState,
        signs: [f64; 2],
        pose: Pose,
    ) -> Result<Pose> {
        self.displacement(|side| shared.peek_pulse_count(side), signs, pose)
    }

    /// Final pose of a motion; resets the counters. Call once per motion.
    pub fn atomic_update_point(
        &self,
        shared: &SharedSensorState,
        signs: [f64; 2],
        pose: Pose,
    ) -> Result<Pose> {
        self.displacement(
            |side| {
                let count = shared.take_pulse_count(side);
                let sign = signs[side.index()];
                tracing::debug!(
                    "Atomic count [{}]: {}, d={:.1}mm, sign={}",
                    side,
                    count,
                    self.pulses_to_mm(count, 1.0),
                    sign
                );
                count
            },
            signs,
            pose,
        )
    }
}
