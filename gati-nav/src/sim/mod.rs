//! Simulated robot for hardware-free runs and tests
//!
//! Stands in for the ADC and the servo PWM outputs:
//!
//! | Channel | Simulation |
//! |---------|------------|
//! | servo PWM | pulse width decoded back into a signed wheel speed (mirror mount, deadband, 0 ticks = stopped) |
//! | wheel slot sensors | square wave, one level change per `circumference / pulses_per_revolution` of travel |
//! | proximity sensors | high sample while an obstacle is active, floor sample otherwise |
//!
//! Every sample gets seeded Gaussian noise. Physics is advanced lazily: each
//! read or write first integrates the true pose up to the current clock time
//! with the wheel speeds in effect since the previous call.
//!
//! Obstacles come from scripted time windows (ms since the robot was built)
//! or a manual override. PWM writes can be made to fail for fault tests.

mod clock;
mod noise;

pub use clock::ScaledClock;
pub use noise::NoiseGenerator;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::{GatiConfig, MotorConfig, SimulationConfig};
use crate::error::{GatiError, Result};
use crate::hal::{AnalogInput, Clock, PwmOutput};
use crate::types::{Pose, Side};

struct SimState {
    /// Ground truth; theta in radians, unnormalized
    x: f64,
    y: f64,
    theta: f64,
    /// Signed drivetrain-forward speed per wheel (mm/s)
    wheel_speed: [f64; 2],
    /// Distance rolled per wheel regardless of direction (mm)
    travel: [f64; 2],
    last_ms: u64,
    noise: NoiseGenerator,
    obstacle_override: Option<bool>,
}

/// Simulated differential drive robot with slot encoders and IR proximity sensors
pub struct SimulatedRobot {
    config: SimulationConfig,
    motor: MotorConfig,
    channels: [u8; 4],
    mm_per_pulse: f64,
    track_width_mm: f64,
    clock: Arc<dyn Clock>,
    started_ms: u64,
    pwm_fault: AtomicBool,
    state: Mutex<SimState>,
}

impl SimulatedRobot {
    pub fn new(config: &GatiConfig, start: Pose, clock: Arc<dyn Clock>) -> Self {
        let ch = &config.sensors.channels;
        let started_ms = clock.now_ms();
        tracing::info!(
            "Simulated robot at {} (speed factor {}, seed {})",
            start,
            config.simulation.speed_factor,
            config.simulation.random_seed
        );

        Self {
            config: config.simulation.clone(),
            motor: config.motor.clone(),
            channels: [ch.proximity_left, ch.proximity_right, ch.wheel_left, ch.wheel_right],
            mm_per_pulse: config.robot.mm_per_pulse(),
            track_width_mm: config.robot.track_width_mm,
            clock,
            started_ms,
            pwm_fault: AtomicBool::new(false),
            state: Mutex::new(SimState {
                x: start.x,
                y: start.y,
                theta: start.theta.to_radians(),
                wheel_speed: [0.0, 0.0],
                travel: [0.0, 0.0],
                last_ms: started_ms,
                noise: NoiseGenerator::new(config.simulation.random_seed),
                obstacle_override: None,
            }),
        }
    }

    /// Ground-truth pose, heading in degrees
    pub fn true_pose(&self) -> Pose {
        let mut state = self.state.lock();
        self.advance(&mut state);
        Pose::new(state.x, state.y, state.theta.to_degrees())
    }

    /// Total distance rolled by a wheel (mm)
    pub fn wheel_travel(&self, side: Side) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.travel[side.index()]
    }

    pub fn wheel_speed(&self, side: Side) -> f64 {
        self.state.lock().wheel_speed[side.index()]
    }

    /// Force obstacles on or off; `None` returns to the scripted windows
    pub fn set_obstacle_override(&self, obstacle: Option<bool>) {
        self.state.lock().obstacle_override = obstacle;
    }

    /// Make every PWM write fail while set
    pub fn set_pwm_fault(&self, fault: bool) {
        self.pwm_fault.store(fault, Ordering::Relaxed);
    }

    fn obstacle_active(&self, state: &SimState) -> bool {
        if let Some(forced) = state.obstacle_override {
            return forced;
        }
        let t = state.last_ms.saturating_sub(self.started_ms);
        self.config
            .obstacles
            .iter()
            .any(|w| t >= w.from_ms && t < w.until_ms)
    }

    /// Integrate the true pose up to now
    fn advance(&self, state: &mut SimState) {
        let now = self.clock.now_ms();
        let dt = now.saturating_sub(state.last_ms) as f64 / 1000.0;
        state.last_ms = now.max(state.last_ms);
        if dt <= 0.0 {
            return;
        }

        let [vl, vr] = state.wheel_speed;
        state.travel[0] += vl.abs() * dt;
        state.travel[1] += vr.abs() * dt;

        let linear = (vl + vr) / 2.0;
        let angular = (vr - vl) / self.track_width_mm;
        if angular.abs() < 1e-9 {
            state.x += linear * state.theta.cos() * dt;
            state.y += linear * state.theta.sin() * dt;
        } else {
            let r = linear / angular;
            let theta = state.theta + angular * dt;
            state.x += r * (theta.sin() - state.theta.sin());
            state.y += r * (state.theta.cos() - theta.cos());
            state.theta = theta;
        }
    }

    /// Drivetrain-forward wheel speed a servo pulse produces (mm/s)
    fn decode_speed(&self, side: Side, ticks: u32) -> f64 {
        if ticks == 0 {
            return 0.0;
        }
        let pulse_us = ticks as i32 * self.motor.tick_us;
        let ccw_offset = pulse_us - self.motor.neutral_us;
        if ccw_offset.abs() <= self.config.deadband_us {
            return 0.0;
        }
        let ccw_speed = ccw_offset as f64 * self.config.mm_per_s_per_us;
        match side {
            Side::Left => ccw_speed,
            Side::Right => -ccw_speed,
        }
    }

    fn apply_pwm(&self, side: Side, ticks: u32) -> Result<()> {
        if self.pwm_fault.load(Ordering::Relaxed) {
            return Err(GatiError::Pwm(format!("simulated {} servo fault", side)));
        }
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.wheel_speed[side.index()] = self.decode_speed(side, ticks);
        Ok(())
    }

    fn slot_level(&self, travel_mm: f64) -> i32 {
        let slot = (travel_mm / self.mm_per_pulse).floor() as u64;
        if slot % 2 == 0 {
            self.config.slot_low
        } else {
            self.config.slot_high
        }
    }
}

impl AnalogInput for SimulatedRobot {
    fn read_channel(&self, channel: u8) -> i32 {
        let Some(index) = self.channels.iter().position(|&c| c == channel) else {
            return 0;
        };

        let mut state = self.state.lock();
        self.advance(&mut state);
        let clean = match index {
            0 | 1 => {
                if self.obstacle_active(&state) {
                    self.config.proximity_near
                } else {
                    self.config.proximity_far
                }
            }
            2 => self.slot_level(state.travel[0]),
            _ => self.slot_level(state.travel[1]),
        };
        state.noise.adc_sample(clean, self.config.sample_noise_stddev)
    }
}

impl PwmOutput for Arc<SimulatedRobot> {
    fn write_duty(&mut self, side: Side, ticks: u32) -> Result<()> {
        self.apply_pwm(side, ticks)
    }
}
