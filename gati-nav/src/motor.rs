//! Motor command layer for the two continuous-rotation servos
//!
//! A signed wheel speed (-200..200, arbitrary calibration units) maps
//! linearly to a pulse width around the servo's neutral point:
//!
//! ```text
//! pulse_us = neutral_us + ccw_speed        (ccw_speed clamped to ±max_speed)
//! ticks    = pulse_us / tick_us            (clamped to the safety envelope)
//! ```
//!
//! The wheels are mirror-mounted: drivetrain-forward is counter-clockwise
//! for the left servo and clockwise for the right one.

use crate::config::MotorConfig;
use crate::error::{GatiError, Result};
use crate::hal::PwmOutput;
use crate::types::{Direction, Side};

/// Call-site codes reported when a PWM write fails
pub const ERR_MOVING_LEFT: i32 = -128;
pub const ERR_MOVING_RIGHT: i32 = -127;
pub const ERR_TURNING_LEFT: i32 = -120;
pub const ERR_TURNING_RIGHT: i32 = -119;
pub const ERR_STOP: i32 = -110;

/// Drives both wheel servos and remembers the last commanded speeds
pub struct MotorController {
    pwm: Box<dyn PwmOutput>,
    config: MotorConfig,
    /// Last drivetrain-forward speed per wheel (direction already applied)
    commanded: [i32; 2],
}

impl MotorController {
    /// Create new motor controller over a PWM output
    pub fn new(pwm: Box<dyn PwmOutput>, config: MotorConfig) -> Self {
        tracing::debug!(
            "MotorController: neutral={}us, tick={}us, envelope=[{}, {}]us",
            config.neutral_us,
            config.tick_us,
            config.safety_min_us,
            config.safety_max_us
        );
        Self {
            pwm,
            config,
            commanded: [0, 0],
        }
    }

    /// Convert a pulse width to PWM ticks, clamped into the safety envelope
    pub fn duty_cycle(&self, target_us: i32) -> u32 {
        duty_cycle(&self.config, target_us)
    }

    /// Write a raw pulse width to one servo
    pub fn set_pulse_width(&mut self, side: Side, target_us: i32) -> Result<()> {
        let ticks = self.duty_cycle(target_us);
        tracing::trace!("{} servo: {}us ({} ticks)", side, target_us, ticks);
        self.pwm.write_duty(side, ticks)
    }

    /// Command one wheel. `speed` is clamped, never rejected; 0 writes the idle pulse.
    pub fn set_speed(&mut self, side: Side, speed: i32, direction: Direction) -> Result<()> {
        let max = self.config.max_speed;
        let forward_speed = direction.sign() * speed.clamp(-max, max);
        self.commanded[side.index()] = forward_speed;

        let ccw_speed = match side {
            Side::Left => forward_speed,
            Side::Right => -forward_speed,
        };

        if ccw_speed == 0 {
            return self.set_pulse_width(side, self.config.idle_us);
        }

        let output = self.config.neutral_us + ccw_speed;
        self.set_pulse_width(side, output)
    }

    /// Both wheels drivetrain-forward at `speed` (negative reverses)
    pub fn set_wheel_moving(&mut self, speed: i32) -> Result<()> {
        self.set_speed(Side::Left, speed, Direction::Forward)
            .map_err(|e| actuator(ERR_MOVING_LEFT, e))?;
        self.set_speed(Side::Right, speed, Direction::Forward)
            .map_err(|e| actuator(ERR_MOVING_RIGHT, e))
    }

    /// Spin in place; positive `speed` turns counter-clockwise (left)
    pub fn set_wheel_turning(&mut self, speed: i32) -> Result<()> {
        self.set_speed(Side::Left, speed, Direction::Backward)
            .map_err(|e| actuator(ERR_TURNING_LEFT, e))?;
        self.set_speed(Side::Right, speed, Direction::Forward)
            .map_err(|e| actuator(ERR_TURNING_RIGHT, e))
    }

    /// Command both wheels to zero speed
    pub fn stop(&mut self) -> Result<()> {
        for side in Side::BOTH {
            self.set_speed(side, 0, Direction::Forward)
                .map_err(|e| actuator(ERR_STOP, e))?;
        }
        Ok(())
    }

    /// Last drivetrain-forward speed commanded for a wheel
    pub fn commanded_speed(&self, side: Side) -> i32 {
        self.commanded[side.index()]
    }

    /// Travel sign assumed for a wheel's pulses. The slot sensors cannot
    /// sense direction, so this follows the last command.
    pub fn direction_sign(&self, side: Side) -> f64 {
        if self.commanded_speed(side) >= 0 {
            1.0
        } else {
            -1.0
        }
    }

    pub fn direction_signs(&self) -> [f64; 2] {
        [
            self.direction_sign(Side::Left),
            self.direction_sign(Side::Right),
        ]
    }

    /// Stop the servos and hand the PWM output back
    pub fn release(mut self) -> Result<Box<dyn PwmOutput>> {
        self.stop()?;
        Ok(self.pwm)
    }
}

fn actuator(code: i32, source: GatiError) -> GatiError {
    GatiError::Actuator {
        code,
        reason: source.to_string(),
    }
}

/// Pulse width to tick conversion shared by the controller and calibration tools
pub fn duty_cycle(config: &MotorConfig, target_us: i32) -> u32 {
    let mut target_us = target_us;
    if target_us > config.safety_max_us || target_us < config.safety_min_us {
        tracing::warn!(
            "PWM target {}us outside safety range [{}, {}]",
            target_us,
            config.safety_min_us,
            config.safety_max_us
        );
        target_us = target_us.clamp(config.safety_min_us, config.safety_max_us);
    }

    if target_us % config.tick_us != 0 {
        tracing::warn!(
            "PWM target {}us not a multiple of the {}us tick, rounding",
            target_us,
            config.tick_us
        );
        return (target_us as f64 / config.tick_us as f64).round() as u32;
    }
    (target_us / config.tick_us) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every write; optionally fails on the nth one
    #[derive(Clone, Default)]
    struct RecordingPwm {
        writes: Arc<Mutex<Vec<(Side, u32)>>>,
        fail_on: Option<usize>,
    }

    impl PwmOutput for RecordingPwm {
        fn write_duty(&mut self, side: Side, ticks: u32) -> Result<()> {
            let mut writes = self.writes.lock();
            if self.fail_on == Some(writes.len()) {
                return Err(GatiError::Pwm("bus error".to_string()));
            }
            writes.push((side, ticks));
            Ok(())
        }
    }

    fn controller() -> (MotorController, Arc<Mutex<Vec<(Side, u32)>>>) {
        let pwm = RecordingPwm::default();
        let writes = Arc::clone(&pwm.writes);
        (MotorController::new(Box::new(pwm), MotorConfig::default()), writes)
    }

    #[test]
    fn test_duty_cycle_exact_multiple() {
        let config = MotorConfig::default();
        assert_eq!(duty_cycle(&config, 1500), 150);
        assert_eq!(duty_cycle(&config, 0), 0);
    }

    #[test]
    fn test_duty_cycle_clamps_to_envelope() {
        let config = MotorConfig {
            safety_min_us: 500,
            safety_max_us: 2500,
            ..MotorConfig::default()
        };
        assert_eq!(duty_cycle(&config, 9000), 250);
        assert_eq!(duty_cycle(&config, i32::MAX), 250);
        assert_eq!(duty_cycle(&config, 100), 50);
        assert_eq!(duty_cycle(&config, -40), 50);
    }

    #[test]
    fn test_duty_cycle_rounds_to_nearest_tick() {
        let config = MotorConfig::default();
        assert_eq!(duty_cycle(&config, 1504), 150);
        assert_eq!(duty_cycle(&config, 1505), 151);
        assert_eq!(duty_cycle(&config, 1536), 154);
    }

    #[test]
    fn test_forward_is_mirrored() {
        let (mut motor, writes) = controller();
        motor.set_wheel_moving(50).unwrap();
        assert_eq!(*writes.lock(), vec![(Side::Left, 155), (Side::Right, 145)]);
        assert_eq!(motor.commanded_speed(Side::Left), 50);
        assert_eq!(motor.commanded_speed(Side::Right), 50);
        assert_eq!(motor.direction_signs(), [1.0, 1.0]);
    }

    #[test]
    fn test_turning_spins_wheels_opposite() {
        let (mut motor, writes) = controller();
        motor.set_wheel_turning(30).unwrap();
        // Left backward (cw), right forward (cw): both below neutral
        assert_eq!(*writes.lock(), vec![(Side::Left, 147), (Side::Right, 147)]);
        assert_eq!(motor.direction_signs(), [-1.0, 1.0]);

        writes.lock().clear();
        motor.set_wheel_turning(-30).unwrap();
        assert_eq!(*writes.lock(), vec![(Side::Left, 153), (Side::Right, 153)]);
        assert_eq!(motor.direction_signs(), [1.0, -1.0]);
    }

    #[test]
    fn test_speed_is_clamped() {
        let (mut motor, writes) = controller();
        motor.set_speed(Side::Left, 1000, Direction::Forward).unwrap();
        motor.set_speed(Side::Right, 1000, Direction::Forward).unwrap();
        assert_eq!(*writes.lock(), vec![(Side::Left, 170), (Side::Right, 130)]);
        assert_eq!(motor.commanded_speed(Side::Left), 200);
    }

    #[test]
    fn test_extreme_speeds_saturate() {
        let (mut motor, writes) = controller();
        motor.set_wheel_turning(i32::MIN).unwrap();
        assert_eq!(*writes.lock(), vec![(Side::Left, 170), (Side::Right, 170)]);
        assert_eq!(motor.commanded_speed(Side::Left), 200);
        assert_eq!(motor.commanded_speed(Side::Right), -200);

        writes.lock().clear();
        motor.set_speed(Side::Left, i32::MIN, Direction::Backward).unwrap();
        motor.set_speed(Side::Right, i32::MAX, Direction::Backward).unwrap();
        assert_eq!(*writes.lock(), vec![(Side::Left, 170), (Side::Right, 170)]);
        assert_eq!(motor.direction_signs(), [1.0, -1.0]);
    }

    #[test]
    fn test_zero_speed_writes_idle_pulse() {
        let (mut motor, writes) = controller();
        motor.set_wheel_moving(-40).unwrap();
        motor.stop().unwrap();
        let writes = writes.lock();
        assert_eq!(writes[2..], [(Side::Left, 0), (Side::Right, 0)]);
        assert_eq!(motor.commanded_speed(Side::Left), 0);
        assert_eq!(motor.direction_sign(Side::Right), 1.0);
    }

    #[test]
    fn test_write_failures_carry_call_site_code() {
        let pwm = RecordingPwm {
            fail_on: Some(1),
            ..RecordingPwm::default()
        };
        let mut motor = MotorController::new(Box::new(pwm.clone()), MotorConfig::default());
        let err = motor.set_wheel_moving(20).unwrap_err();
        assert!(matches!(err, GatiError::Actuator { code: ERR_MOVING_RIGHT, .. }));

        let pwm = RecordingPwm {
            fail_on: Some(0),
            ..RecordingPwm::default()
        };
        let mut motor = MotorController::new(Box::new(pwm), MotorConfig::default());
        let err = motor.set_wheel_turning(20).unwrap_err();
        assert!(matches!(err, GatiError::Actuator { code: ERR_TURNING_LEFT, .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_release_stops_servos() {
        let (mut motor, writes) = controller();
        motor.set_wheel_moving(100).unwrap();
        let _pwm = motor.release().unwrap();
        assert_eq!(writes.lock().len(), 4);
        assert_eq!(writes.lock()[3], (Side::Right, 0));
    }
}
