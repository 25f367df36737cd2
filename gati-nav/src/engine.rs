//! Action engine: runs sequences of primitive motions.
//!
//! Each action issues one motor command and then polls odometry (peek,
//! non-destructive) every `poll_ms` until its target is reached or its
//! interrupt check fires. Between actions the counted travel is taken
//! (destructive read), folded into the running pose, and both wheels are
//! stopped.
//!
//! Outcome handling per action:
//!
//! | Outcome | Effect |
//! |---------|--------|
//! | `Ok` | next action |
//! | `Retry` | same action again, pose not folded |
//! | `Interrupt` | run the nested handler once if present (its outcome replaces this one), else stop the sequence |
//! | `Err(_)` | abort the sequence |
//!
//! Nested handlers are one level deep: a handler's own `on_interrupt` is
//! never consulted.

use std::sync::Arc;

use crate::config::ControlConfig;
use crate::error::{GatiError, Result};
use crate::hal::Clock;
use crate::motor::MotorController;
use crate::odometry::Odometry;
use crate::shared::SharedSensorState;
use crate::types::{Outcome, Pose, Side};
use crate::utils::{simplify_angle, wait_delay};

/// Condition that can cut an action short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCheck {
    None,
    /// Obstacle within `ControlConfig::obstacle_distance_mm`
    Obstacle,
}

/// Primitive motion operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOp {
    /// Drive straight `param` mm
    MoveForward,
    /// Spin in place by `param` degrees (sign of speed gives the direction)
    TurnInPlace,
    /// Stop and wait for the path to clear; `param` is the detection distance (mm)
    WaitForClearance,
}

/// One step of an action sequence
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub op: MotionOp,
    pub param: f64,
    pub speed: i32,
    pub interrupt: InterruptCheck,
    pub on_interrupt: Option<Box<ActionNode>>,
}

impl ActionNode {
    /// Straight move that stops for obstacles and waits for clearance
    pub fn move_forward(distance_mm: f64, speed: i32, clearance_distance_mm: f64) -> Self {
        Self {
            op: MotionOp::MoveForward,
            param: distance_mm,
            speed,
            interrupt: InterruptCheck::Obstacle,
            on_interrupt: Some(Box::new(Self::wait_for_clearance(clearance_distance_mm))),
        }
    }

    /// Turn by a signed angle: positive is left (counter-clockwise)
    pub fn turn(degrees: f64, speed: i32) -> Self {
        if degrees < 0.0 {
            Self::turn_in_place(degrees, speed.saturating_neg())
        } else {
            Self::turn_in_place(degrees, speed)
        }
    }

    pub fn turn_left(degrees: f64, speed: i32) -> Result<Self> {
        if degrees < 0.0 {
            return Err(GatiError::InvalidAction(format!(
                "turn left needs a positive angle, got {}",
                degrees
            )));
        }
        Ok(Self::turn_in_place(degrees, speed))
    }

    pub fn turn_right(degrees: f64, speed: i32) -> Result<Self> {
        if degrees < 0.0 {
            return Err(GatiError::InvalidAction(format!(
                "turn right needs a positive angle, got {}",
                degrees
            )));
        }
        Ok(Self::turn_in_place(-degrees, speed.saturating_neg()))
    }

    pub fn wait_for_clearance(distance_mm: f64) -> Self {
        Self {
            op: MotionOp::WaitForClearance,
            param: distance_mm,
            speed: 0,
            interrupt: InterruptCheck::None,
            on_interrupt: None,
        }
    }

    fn turn_in_place(degrees: f64, speed: i32) -> Self {
        Self {
            op: MotionOp::TurnInPlace,
            param: degrees,
            speed,
            interrupt: InterruptCheck::None,
            on_interrupt: None,
        }
    }
}

/// Completion condition polled while an action runs
#[derive(Debug, Clone, Copy)]
enum Target {
    Displacement(f64),
    Heading(f64),
}

impl Target {
    fn reached(self, start: &Pose, now: &Pose) -> bool {
        match self {
            Target::Displacement(d) => now.distance(start) >= d,
            Target::Heading(angle) => {
                let turned = now.theta - start.theta;
                if angle < 0.0 {
                    turned < angle
                } else {
                    turned > angle
                }
            }
        }
    }
}

/// Final outcome and pose of a sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceResult {
    pub outcome: Outcome,
    pub pose: Pose,
}

/// Runs action sequences against the motors and the shared sensor state
pub struct ActionEngine {
    motor: MotorController,
    odometry: Odometry,
    sensors: Arc<SharedSensorState>,
    clock: Arc<dyn Clock>,
    config: ControlConfig,
}

impl ActionEngine {
    pub fn new(
        motor: MotorController,
        odometry: Odometry,
        sensors: Arc<SharedSensorState>,
        clock: Arc<dyn Clock>,
        config: ControlConfig,
    ) -> Self {
        Self {
            motor,
            odometry,
            sensors,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn motor_mut(&mut self) -> &mut MotorController {
        &mut self.motor
    }

    pub fn into_motor(self) -> MotorController {
        self.motor
    }

    /// Run `actions` in order starting from `start`.
    ///
    /// An `Err` aborts the sequence; the motors are stopped on a best-effort
    /// basis before it is returned.
    pub fn run_actions(&mut self, actions: &[ActionNode], start: Pose) -> Result<SequenceResult> {
        tracing::debug!("Running {} actions from {}", actions.len(), start);
        let result = self.run_sequence(actions, start);
        if let Err(ref e) = result {
            tracing::error!("Action sequence aborted: {}", e);
            if let Err(stop_err) = self.motor.stop() {
                tracing::warn!("Could not stop motors after abort: {}", stop_err);
            }
        }
        result
    }

    fn run_sequence(&mut self, actions: &[ActionNode], start: Pose) -> Result<SequenceResult> {
        let mut pose = start;
        let mut outcome = Outcome::Ok;
        let mut i = 0;

        while i < actions.len() {
            let action = &actions[i];
            tracing::debug!(
                "Action {}: {:?} param={:.1} speed={}",
                i,
                action.op,
                action.param,
                action.speed
            );

            outcome = self.execute(action, pose)?;
            tracing::debug!("Action {} returned {}", i, outcome);

            if outcome == Outcome::Interrupt {
                if let Some(handler) = &action.on_interrupt {
                    tracing::debug!("Action {} interrupted, running {:?}", i, handler.op);
                    outcome = self.execute(handler, start)?;
                    tracing::debug!("Interrupt handler returned {}", outcome);
                }
            }

            if outcome == Outcome::Retry {
                continue;
            }

            pose = self.take_pose(pose)?;
            pose.theta = simplify_angle(pose.theta);
            self.reset_motion()?;
            tracing::debug!("Pose after action {}: {}", i, pose);

            if outcome == Outcome::Interrupt {
                break;
            }
            i += 1;
        }

        tracing::debug!("Sequence finished ({}) at {}", outcome, pose);
        Ok(SequenceResult { outcome, pose })
    }

    /// Execute a single action from `pose`
    pub fn execute(&mut self, action: &ActionNode, pose: Pose) -> Result<Outcome> {
        // A NaN target is never reached, so the poll loop would never end
        if !action.param.is_finite() {
            return Err(GatiError::InvalidAction(format!(
                "{:?} needs a finite parameter, got {}",
                action.op, action.param
            )));
        }
        match action.op {
            MotionOp::MoveForward => {
                if action.param == 0.0 {
                    return Ok(Outcome::Ok);
                }
                self.motor.set_wheel_moving(action.speed)?;
                self.wait_target(pose, Target::Displacement(action.param), action.interrupt)
            }
            MotionOp::TurnInPlace => {
                if action.param == 0.0 {
                    return Ok(Outcome::Ok);
                }
                if action.param.abs() >= self.config.ignore_angle_deg {
                    tracing::warn!("Turn of {}° is too big, ignoring", action.param);
                    return Ok(Outcome::Ok);
                }
                self.motor.set_wheel_turning(action.speed)?;
                self.wait_target(pose, Target::Heading(action.param), action.interrupt)
            }
            MotionOp::WaitForClearance => {
                self.motor.set_wheel_moving(0)?;
                Ok(self.wait_clearance(action.param))
            }
        }
    }

    fn wait_target(&self, start: Pose, target: Target, interrupt: InterruptCheck) -> Result<Outcome> {
        loop {
            let last_time = self.clock.now_ms();

            let now = self.peek_pose(start)?;
            if target.reached(&start, &now) {
                return Ok(Outcome::Ok);
            }
            if self.interrupted(interrupt) {
                return Ok(Outcome::Interrupt);
            }

            wait_delay(self.clock.as_ref(), self.config.poll_ms, last_time);
        }
    }

    fn interrupted(&self, check: InterruptCheck) -> bool {
        match check {
            InterruptCheck::None => false,
            InterruptCheck::Obstacle => self.sensors.has_obstacle(self.config.obstacle_distance_mm),
        }
    }

    /// `Retry` as soon as the path is clear, `Interrupt` once the obstacle
    /// has been seen continuously for `clearance_wait_ms`.
    fn wait_clearance(&self, distance_mm: f64) -> Outcome {
        let started = self.clock.now_ms();
        let mut last_seen = started;
        while last_seen - started < self.config.clearance_wait_ms {
            if !self.sensors.has_obstacle(distance_mm) {
                return Outcome::Retry;
            }
            last_seen = self.clock.now_ms();
            self.clock.sleep_ms(self.config.poll_ms);
        }
        tracing::info!(
            "Obstacle still present after {}ms, giving up",
            last_seen - started
        );
        Outcome::Interrupt
    }

    /// Stop both wheels and drop any pulses counted since the last take
    pub fn reset_motion(&mut self) -> Result<()> {
        self.motor.stop()?;
        for side in Side::BOTH {
            self.sensors.take_pulse_count(side);
        }
        Ok(())
    }

    /// Live pose relative to `start`, counters untouched
    pub fn peek_pose(&self, start: Pose) -> Result<Pose> {
        self.odometry
            .peek_update_point(&self.sensors, self.motor.direction_signs(), start)
    }

    /// Fold the counted travel into `start`, resetting the counters
    pub fn take_pose(&self, start: Pose) -> Result<Pose> {
        self.odometry
            .atomic_update_point(&self.sensors, self.motor.direction_signs(), start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MotorConfig, RobotConfig};
    use crate::hal::{PwmOutput, SystemClock};
    use crate::motor::ERR_MOVING_LEFT;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[derive(Clone, Default)]
    struct TestPwm {
        writes: Arc<Mutex<Vec<(Side, u32)>>>,
        fail: Arc<AtomicBool>,
    }

    impl PwmOutput for TestPwm {
        fn write_duty(&mut self, side: Side, ticks: u32) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(GatiError::Pwm("injected".to_string()));
            }
            self.writes.lock().push((side, ticks));
            Ok(())
        }
    }

    fn engine() -> (ActionEngine, Arc<SharedSensorState>, TestPwm) {
        let pwm = TestPwm::default();
        let sensors = Arc::new(SharedSensorState::new());
        let config = ControlConfig {
            poll_ms: 2,
            clearance_wait_ms: 100,
            ..ControlConfig::default()
        };
        let engine = ActionEngine::new(
            MotorController::new(Box::new(pwm.clone()), MotorConfig::default()),
            Odometry::from_config(&RobotConfig::default()),
            Arc::clone(&sensors),
            Arc::new(SystemClock::new()),
            config,
        );
        (engine, sensors, pwm)
    }

    fn load_pulses(sensors: &SharedSensorState, left: i32, right: i32) {
        sensors.force_pulse_count(Side::Left, left);
        sensors.force_pulse_count(Side::Right, right);
    }

    #[test]
    fn test_zero_length_actions_are_noops() {
        let (mut engine, _, pwm) = engine();
        let pose = Pose::new(12.0, 34.0, 56.0);
        assert_eq!(
            engine.execute(&ActionNode::move_forward(0.0, 30, 1500.0), pose).unwrap(),
            Outcome::Ok
        );
        assert_eq!(engine.execute(&ActionNode::turn(0.0, 30), pose).unwrap(), Outcome::Ok);
        assert!(pwm.writes.lock().is_empty());

        let result = engine
            .run_actions(&[ActionNode::turn(0.0, 30), ActionNode::move_forward(0.0, 30, 1500.0)], pose)
            .unwrap();
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(result.pose, pose);
    }

    #[test]
    fn test_move_completes_on_displacement() {
        let (mut engine, sensors, _) = engine();
        // 49 pulses ≈ 508mm
        load_pulses(&sensors, 49, 49);
        let result = engine
            .run_actions(&[ActionNode::move_forward(500.0, 30, 1500.0)], Pose::ORIGIN)
            .unwrap();

        assert_eq!(result.outcome, Outcome::Ok);
        assert_relative_eq!(result.pose.x, 49.0 * engine.odometry.mm_per_pulse(), epsilon = 1e-6);
        assert_relative_eq!(result.pose.y, 0.0, epsilon = 1e-9);
        assert_eq!(sensors.peek_pulse_count(Side::Left), 0);
        assert_eq!(engine.motor.commanded_speed(Side::Left), 0);
    }

    #[test]
    fn test_turn_direction_and_normalization() {
        let (mut engine, sensors, _) = engine();
        // 9 pulses per wheel in opposite directions ≈ 93°
        load_pulses(&sensors, 9, 9);
        let result = engine
            .run_actions(&[ActionNode::turn(90.0, 30)], Pose::new(0.0, 0.0, 170.0))
            .unwrap();
        assert_eq!(result.outcome, Outcome::Ok);
        let turned = (18.0 * engine.odometry.mm_per_pulse() / 115.0).to_degrees();
        assert_relative_eq!(result.pose.theta, 170.0 + turned - 360.0, epsilon = 1e-6);

        load_pulses(&sensors, 9, 9);
        let result = engine
            .run_actions(&[ActionNode::turn(-90.0, 30)], Pose::ORIGIN)
            .unwrap();
        assert_relative_eq!(result.pose.theta, -turned, epsilon = 1e-6);
    }

    #[test]
    fn test_sentinel_turn_is_ignored() {
        let (mut engine, _, pwm) = engine();
        let outcome = engine
            .execute(&ActionNode::turn(100_000.0, 30), Pose::ORIGIN)
            .unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert!(pwm.writes.lock().is_empty());
    }

    #[test]
    fn test_turn_helpers_reject_negative_angles() {
        assert!(matches!(
            ActionNode::turn_left(-10.0, 30),
            Err(GatiError::InvalidAction(_))
        ));
        assert!(ActionNode::turn_right(-1.0, 30).is_err());

        let right = ActionNode::turn_right(45.0, 30).unwrap();
        assert_eq!(right, ActionNode::turn(-45.0, 30));
        assert_eq!(right.param, -45.0);
        assert_eq!(right.speed, -30);
    }

    #[test]
    fn test_non_finite_targets_are_rejected() {
        let (mut engine, _, pwm) = engine();
        for action in [
            ActionNode::move_forward(f64::NAN, 30, 1500.0),
            ActionNode::move_forward(f64::INFINITY, 30, 1500.0),
            ActionNode::turn(f64::NAN, 30),
        ] {
            let err = engine.run_actions(&[action], Pose::ORIGIN).unwrap_err();
            assert!(matches!(err, GatiError::InvalidAction(_)));
        }
        // Only the best-effort stops were written
        assert!(pwm.writes.lock().iter().all(|&(_, ticks)| ticks == 0));
    }

    #[test]
    fn test_turn_speed_negation_saturates() {
        assert_eq!(ActionNode::turn(-90.0, i32::MIN).speed, i32::MAX);
        assert_eq!(ActionNode::turn_right(90.0, i32::MIN).unwrap().speed, i32::MAX);
    }

    #[test]
    fn test_interrupt_without_handler_stops_sequence() {
        let (mut engine, sensors, _) = engine();
        sensors.set_obstacle(Side::Left, true);
        let mut blocked = ActionNode::move_forward(500.0, 30, 1500.0);
        blocked.on_interrupt = None;

        let result = engine
            .run_actions(&[blocked, ActionNode::turn(90.0, 30)], Pose::ORIGIN)
            .unwrap();
        assert_eq!(result.outcome, Outcome::Interrupt);
        assert_eq!(result.pose, Pose::ORIGIN);
    }

    #[test]
    fn test_persistent_obstacle_interrupts_after_clearance_wait() {
        let (mut engine, sensors, _) = engine();
        sensors.set_obstacle(Side::Right, true);

        let started = engine.clock.now_ms();
        let result = engine
            .run_actions(
                &[ActionNode::move_forward(500.0, 30, 1500.0), ActionNode::turn(90.0, 30)],
                Pose::ORIGIN,
            )
            .unwrap();
        assert_eq!(result.outcome, Outcome::Interrupt);
        assert!(engine.clock.now_ms() - started >= 100);
        assert_eq!(engine.motor.commanded_speed(Side::Left), 0);
    }

    #[test]
    fn test_clearance_retries_the_interrupted_move() {
        let (mut engine, sensors, _) = engine();
        sensors.set_obstacle(Side::Left, true);

        let feeder_state = Arc::clone(&sensors);
        let feeder = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(30));
            feeder_state.set_obstacle(Side::Left, false);
            thread::sleep(std::time::Duration::from_millis(30));
            feeder_state.force_pulse_count(Side::Left, 30);
            feeder_state.force_pulse_count(Side::Right, 30);
        });

        let result = engine
            .run_actions(&[ActionNode::move_forward(300.0, 30, 1500.0)], Pose::ORIGIN)
            .unwrap();
        feeder.join().unwrap();

        assert_eq!(result.outcome, Outcome::Ok);
        assert_relative_eq!(result.pose.x, 30.0 * engine.odometry.mm_per_pulse(), epsilon = 1e-6);
    }

    #[test]
    fn test_sensor_fault_aborts_sequence() {
        let (mut engine, sensors, _) = engine();
        sensors.force_pulse_count(Side::Right, -1);
        let err = engine
            .run_actions(&[ActionNode::move_forward(100.0, 30, 1500.0)], Pose::ORIGIN)
            .unwrap_err();
        assert!(matches!(err, GatiError::SensorFault { side: Side::Right, .. }));
        assert_eq!(engine.motor.commanded_speed(Side::Right), 0);
    }

    #[test]
    fn test_pwm_failure_is_fatal() {
        let (mut engine, _, pwm) = engine();
        pwm.fail.store(true, Ordering::Relaxed);
        let err = engine
            .run_actions(&[ActionNode::move_forward(100.0, 30, 1500.0)], Pose::ORIGIN)
            .unwrap_err();
        assert!(matches!(err, GatiError::Actuator { code: ERR_MOVING_LEFT, .. }));
    }
}
