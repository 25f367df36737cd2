//! Robot stack orchestration
//!
//! Wires the sensor task, motor controller, action engine and navigator
//! together, and tears them down in order: motors released first, then the
//! sensor task stopped (stop flag + join).

use std::sync::Arc;

use crate::config::GatiConfig;
use crate::engine::ActionEngine;
use crate::error::Result;
use crate::hal::{AnalogInput, Clock, PwmOutput};
use crate::mission::Waypoint;
use crate::motor::MotorController;
use crate::navigation::{MissionReport, Navigator};
use crate::odometry::Odometry;
use crate::sensors::SensorTask;
use crate::shared::SharedSensorState;
use crate::sim::{ScaledClock, SimulatedRobot};
use crate::types::Pose;
use crate::utils::wait_delay;

/// Manual drive primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum JogCommand {
    Forward,
    Backward,
    Left,
    Right,
}

/// Running robot: sensor task plus navigator
pub struct RobotStack {
    config: GatiConfig,
    sensors: Arc<SharedSensorState>,
    clock: Arc<dyn Clock>,
    sensor_task: Option<SensorTask>,
    navigator: Navigator,
}

impl RobotStack {
    /// Start the stack on the given hardware capabilities
    pub fn start(
        config: GatiConfig,
        adc: Arc<dyn AnalogInput>,
        pwm: Box<dyn PwmOutput>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        tracing::info!("Starting robot stack");
        let sensors = Arc::new(SharedSensorState::new());

        let mut motor = MotorController::new(pwm, config.motor.clone());
        motor.stop()?;

        let sensor_task = SensorTask::spawn(
            config.sensors.clone(),
            Arc::clone(&sensors),
            adc,
            Arc::clone(&clock),
        )?;

        let engine = ActionEngine::new(
            motor,
            Odometry::from_config(&config.robot),
            Arc::clone(&sensors),
            Arc::clone(&clock),
            config.control.clone(),
        );
        let navigator = Navigator::new(engine, config.navigation.clone(), config.escape.clone());

        Ok(Self {
            config,
            sensors,
            clock,
            sensor_task: Some(sensor_task),
            navigator,
        })
    }

    /// Start the stack against a [`SimulatedRobot`] placed at the configured initial pose
    pub fn simulated(config: GatiConfig) -> Result<(Self, Arc<SimulatedRobot>)> {
        let clock: Arc<dyn Clock> = Arc::new(ScaledClock::new(config.simulation.speed_factor));
        let robot = Arc::new(SimulatedRobot::new(
            &config,
            config.navigation.initial_pose,
            Arc::clone(&clock),
        ));
        let stack = Self::start(
            config,
            robot.clone(),
            Box::new(Arc::clone(&robot)),
            clock,
        )?;
        Ok((stack, robot))
    }

    pub fn config(&self) -> &GatiConfig {
        &self.config
    }

    pub fn sensors(&self) -> &Arc<SharedSensorState> {
        &self.sensors
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    /// Run `waypoints` starting from `initial`
    pub fn run_mission(&mut self, initial: Pose, waypoints: &[Waypoint]) -> Result<MissionReport> {
        self.navigator.run_mission(initial, waypoints)
    }

    /// Drive one primitive for `duration_ms`, logging the live pose every
    /// 100 ms. Returns the pose from the destructive read at the end,
    /// relative to the origin.
    pub fn jog(&mut self, command: JogCommand, speed: i32, duration_ms: u64) -> Result<Pose> {
        let engine = self.navigator.engine_mut();
        engine.reset_motion()?;

        let motor = engine.motor_mut();
        match command {
            JogCommand::Forward => motor.set_wheel_moving(speed)?,
            JogCommand::Backward => motor.set_wheel_moving(-speed)?,
            JogCommand::Left => motor.set_wheel_turning(speed)?,
            JogCommand::Right => motor.set_wheel_turning(-speed)?,
        }

        let started = self.clock.now_ms();
        while self.clock.now_ms() - started < duration_ms {
            let last_time = self.clock.now_ms();
            let pose = engine.peek_pose(Pose::ORIGIN)?;
            tracing::info!("Jog {:?}: {}", command, pose);
            wait_delay(self.clock.as_ref(), 100, last_time);
        }

        let pose = engine.take_pose(Pose::ORIGIN)?;
        engine.reset_motion()?;
        tracing::info!("Jog {:?} done: {}", command, pose);
        Ok(pose)
    }

    /// Release the motors and stop the sensor task
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_all()
    }

    fn shutdown_all(&mut self) -> Result<()> {
        let released = self.navigator.engine_mut().motor_mut().stop();
        if let Some(task) = self.sensor_task.take() {
            task.stop()?;
        }
        released
    }
}

impl Drop for RobotStack {
    fn drop(&mut self) {
        if self.sensor_task.is_some() {
            if let Err(e) = self.shutdown_all() {
                tracing::error!("Robot stack shutdown failed: {}", e);
            }
        }
    }
}
