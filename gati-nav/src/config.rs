//! Configuration loading for GatiNav
//!
//! Every field has a default matching the stock build (66 mm wheels with
//! 20-slot encoders, 115 mm track, continuous servos centered at 1500 µs on a
//! 50 Hz PWM with 10 µs ticks), so an empty TOML file is a valid configuration.

use crate::error::{GatiError, Result};
use crate::mission::Waypoint;
use crate::types::Pose;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GatiConfig {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub escape: EscapeConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Robot physical parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Wheel diameter in mm (default: 66.0, measured)
    #[serde(default = "default_wheel_diameter")]
    pub wheel_diameter_mm: f64,

    /// Counted slot transitions per wheel revolution (default: 20)
    #[serde(default = "default_pulses_per_revolution")]
    pub pulses_per_revolution: u32,

    /// Distance between the wheel contact points in mm (default: 115.0)
    #[serde(default = "default_track_width")]
    pub track_width_mm: f64,

    /// Euler substeps per odometry update (default: 1000)
    #[serde(default = "default_integration_steps")]
    pub integration_steps: u32,
}

impl RobotConfig {
    pub fn wheel_circumference_mm(&self) -> f64 {
        std::f64::consts::PI * self.wheel_diameter_mm
    }

    /// Wheel travel per counted pulse
    pub fn mm_per_pulse(&self) -> f64 {
        self.wheel_circumference_mm() / self.pulses_per_revolution as f64
    }
}

/// Servo pulse mapping
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MotorConfig {
    /// Pulse width at which the servos stand still (µs)
    #[serde(default = "default_neutral_us")]
    pub neutral_us: i32,

    /// Pulse width written for speed 0 (µs). 0 disables the pulse entirely.
    #[serde(default)]
    pub idle_us: i32,

    /// Lowest pulse width ever written (µs)
    #[serde(default)]
    pub safety_min_us: i32,

    /// Highest pulse width ever written (µs)
    #[serde(default = "default_safety_max_us")]
    pub safety_max_us: i32,

    /// Smallest addressable pulse increment (µs): 1e6 / (19.2 MHz / 192)
    #[serde(default = "default_tick_us")]
    pub tick_us: i32,

    /// Speed magnitude clamp
    #[serde(default = "default_max_speed")]
    pub max_speed: i32,
}

/// ADC channels and signal-processing constants
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Sampling period of the background task (ms)
    #[serde(default = "default_sample_period")]
    pub sample_period_ms: u64,

    /// EMA weight for wheel slot signals
    #[serde(default = "default_wheel_ema_weight")]
    pub wheel_ema_weight: f64,

    #[serde(default = "default_switch_point")]
    pub switch_point_left: f64,

    #[serde(default = "default_switch_point")]
    pub switch_point_right: f64,

    /// EMA weight for proximity signals
    #[serde(default = "default_proximity_ema_weight")]
    pub proximity_ema_weight: f64,

    /// Smoothed proximity value above which an object is near (~15 cm)
    #[serde(default = "default_obstacle_proximity")]
    pub obstacle_proximity_left: f64,

    #[serde(default = "default_obstacle_proximity")]
    pub obstacle_proximity_right: f64,

    /// Raw proximity samples below this are noise and skipped
    #[serde(default = "default_ignore_floor")]
    pub ignore_floor_left: i32,

    #[serde(default = "default_ignore_floor")]
    pub ignore_floor_right: i32,

    #[serde(default)]
    pub channels: ChannelConfig,
}

/// ADC channel assignment
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_proximity_left_channel")]
    pub proximity_left: u8,
    #[serde(default = "default_proximity_right_channel")]
    pub proximity_right: u8,
    #[serde(default = "default_wheel_left_channel")]
    pub wheel_left: u8,
    #[serde(default = "default_wheel_right_channel")]
    pub wheel_right: u8,
}

/// Action engine timing and thresholds
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ControlConfig {
    /// Completion polling period while an action runs (ms)
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Obstacle distance that interrupts a forward move (mm)
    #[serde(default = "default_obstacle_distance")]
    pub obstacle_distance_mm: f64,

    /// How long an obstacle must persist before giving up on waiting (ms)
    #[serde(default = "default_clearance_wait")]
    pub clearance_wait_ms: u64,

    /// Turns at or above this magnitude are ignored with a warning (degrees)
    #[serde(default = "default_ignore_angle")]
    pub ignore_angle_deg: f64,
}

/// Waypoint run settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NavigationConfig {
    /// Servo speed used for every action (-200..200)
    #[serde(default = "default_speed")]
    pub speed: i32,

    /// Attempts per waypoint before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub initial_pose: Pose,

    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// Fixed obstacle bypass: turn, side-step, turn back, advance
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EscapeConfig {
    #[serde(default = "default_first_turn")]
    pub first_turn_deg: f64,
    #[serde(default = "default_side_step")]
    pub side_step_mm: f64,
    #[serde(default = "default_second_turn")]
    pub second_turn_deg: f64,
    #[serde(default = "default_advance")]
    pub advance_mm: f64,
}

/// A time window (ms since simulation start) during which an obstacle is in view
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ObstacleWindow {
    pub from_ms: u64,
    pub until_ms: u64,
}

/// Simulated robot parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Virtual time runs this many times faster than wall time
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,

    /// Noise seed (0 = random each run)
    #[serde(default = "default_seed")]
    pub random_seed: u64,

    /// Wheel surface speed per µs of pulse offset from neutral
    #[serde(default = "default_mm_per_s_per_us")]
    pub mm_per_s_per_us: f64,

    /// Offsets up to this many µs from neutral do not turn the servo
    #[serde(default = "default_deadband")]
    pub deadband_us: i32,

    /// Raw sample while the slot sensor sees a slot
    #[serde(default = "default_slot_high")]
    pub slot_high: i32,

    /// Raw sample while the slot sensor is blocked
    #[serde(default = "default_slot_low")]
    pub slot_low: i32,

    /// Proximity sample with an obstacle in view
    #[serde(default = "default_proximity_near")]
    pub proximity_near: i32,

    /// Proximity sample with nothing in view
    #[serde(default = "default_proximity_far")]
    pub proximity_far: i32,

    /// Gaussian noise added to every raw sample (ADC units)
    #[serde(default = "default_sample_noise")]
    pub sample_noise_stddev: f64,

    #[serde(default)]
    pub obstacles: Vec<ObstacleWindow>,
}

// Default value functions
fn default_wheel_diameter() -> f64 {
    66.0
}
fn default_pulses_per_revolution() -> u32 {
    20
}
fn default_track_width() -> f64 {
    115.0
}
fn default_integration_steps() -> u32 {
    1000
}
fn default_neutral_us() -> i32 {
    1500
}
fn default_safety_max_us() -> i32 {
    10_000
}
fn default_tick_us() -> i32 {
    10
}
fn default_max_speed() -> i32 {
    200
}
fn default_sample_period() -> u64 {
    10
}
fn default_wheel_ema_weight() -> f64 {
    3.0
}
fn default_switch_point() -> f64 {
    380.0
}
fn default_proximity_ema_weight() -> f64 {
    10.0
}
fn default_obstacle_proximity() -> f64 {
    600.0
}
fn default_ignore_floor() -> i32 {
    200
}
fn default_proximity_left_channel() -> u8 {
    0
}
fn default_proximity_right_channel() -> u8 {
    1
}
fn default_wheel_left_channel() -> u8 {
    2
}
fn default_wheel_right_channel() -> u8 {
    3
}
fn default_poll_ms() -> u64 {
    40
}
fn default_obstacle_distance() -> f64 {
    1500.0
}
fn default_clearance_wait() -> u64 {
    1000
}
fn default_ignore_angle() -> f64 {
    10_000.0
}
fn default_speed() -> i32 {
    30
}
fn default_max_attempts() -> u32 {
    1
}
fn default_first_turn() -> f64 {
    90.0
}
fn default_side_step() -> f64 {
    400.0
}
fn default_second_turn() -> f64 {
    -90.0
}
fn default_advance() -> f64 {
    500.0
}
fn default_speed_factor() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}
fn default_mm_per_s_per_us() -> f64 {
    5.0
}
fn default_deadband() -> i32 {
    5
}
fn default_slot_high() -> i32 {
    650
}
fn default_slot_low() -> i32 {
    150
}
fn default_proximity_near() -> i32 {
    870
}
fn default_proximity_far() -> i32 {
    300
}
fn default_sample_noise() -> f64 {
    12.0
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_diameter_mm: default_wheel_diameter(),
            pulses_per_revolution: default_pulses_per_revolution(),
            track_width_mm: default_track_width(),
            integration_steps: default_integration_steps(),
        }
    }
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            neutral_us: default_neutral_us(),
            idle_us: 0,
            safety_min_us: 0,
            safety_max_us: default_safety_max_us(),
            tick_us: default_tick_us(),
            max_speed: default_max_speed(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: default_sample_period(),
            wheel_ema_weight: default_wheel_ema_weight(),
            switch_point_left: default_switch_point(),
            switch_point_right: default_switch_point(),
            proximity_ema_weight: default_proximity_ema_weight(),
            obstacle_proximity_left: default_obstacle_proximity(),
            obstacle_proximity_right: default_obstacle_proximity(),
            ignore_floor_left: default_ignore_floor(),
            ignore_floor_right: default_ignore_floor(),
            channels: ChannelConfig::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            proximity_left: default_proximity_left_channel(),
            proximity_right: default_proximity_right_channel(),
            wheel_left: default_wheel_left_channel(),
            wheel_right: default_wheel_right_channel(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            obstacle_distance_mm: default_obstacle_distance(),
            clearance_wait_ms: default_clearance_wait(),
            ignore_angle_deg: default_ignore_angle(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            max_attempts: default_max_attempts(),
            initial_pose: Pose::ORIGIN,
            waypoints: Vec::new(),
        }
    }
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self {
            first_turn_deg: default_first_turn(),
            side_step_mm: default_side_step(),
            second_turn_deg: default_second_turn(),
            advance_mm: default_advance(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_factor: default_speed_factor(),
            random_seed: default_seed(),
            mm_per_s_per_us: default_mm_per_s_per_us(),
            deadband_us: default_deadband(),
            slot_high: default_slot_high(),
            slot_low: default_slot_low(),
            proximity_near: default_proximity_near(),
            proximity_far: default_proximity_far(),
            sample_noise_stddev: default_sample_noise(),
            obstacles: Vec::new(),
        }
    }
}

impl GatiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatiError::Config(format!("Failed to read config file: {}", e)))?;
        let config: GatiConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the control stack cannot work with
    pub fn validate(&self) -> Result<()> {
        let robot = &self.robot;
        positive("robot.wheel_diameter_mm", robot.wheel_diameter_mm)?;
        positive("robot.track_width_mm", robot.track_width_mm)?;
        if robot.pulses_per_revolution == 0 || robot.integration_steps == 0 {
            return Err(GatiError::Config(
                "pulses_per_revolution and integration_steps must be non-zero".to_string(),
            ));
        }

        let motor = &self.motor;
        if motor.tick_us <= 0 {
            return Err(GatiError::Config("tick_us must be positive".to_string()));
        }
        if motor.safety_min_us < 0 || motor.safety_min_us > motor.safety_max_us {
            return Err(GatiError::Config(format!(
                "invalid safety envelope [{}, {}] us",
                motor.safety_min_us, motor.safety_max_us
            )));
        }
        if motor.max_speed <= 0 {
            return Err(GatiError::Config("max_speed must be positive".to_string()));
        }

        let sensors = &self.sensors;
        for (name, weight) in [
            ("sensors.wheel_ema_weight", sensors.wheel_ema_weight),
            ("sensors.proximity_ema_weight", sensors.proximity_ema_weight),
        ] {
            if !weight.is_finite() || weight < 1.0 {
                return Err(GatiError::Config(format!(
                    "{} must be at least 1.0, got {}",
                    name, weight
                )));
            }
        }
        for (name, value) in [
            ("sensors.switch_point_left", sensors.switch_point_left),
            ("sensors.switch_point_right", sensors.switch_point_right),
            ("sensors.obstacle_proximity_left", sensors.obstacle_proximity_left),
            ("sensors.obstacle_proximity_right", sensors.obstacle_proximity_right),
        ] {
            finite(name, value)?;
        }
        if sensors.sample_period_ms == 0 || self.control.poll_ms == 0 {
            return Err(GatiError::Config(
                "sample_period_ms and poll_ms must be non-zero".to_string(),
            ));
        }

        let control = &self.control;
        finite("control.obstacle_distance_mm", control.obstacle_distance_mm)?;
        positive("control.ignore_angle_deg", control.ignore_angle_deg)?;
        if control.clearance_wait_ms == 0 {
            return Err(GatiError::Config("clearance_wait_ms must be non-zero".to_string()));
        }

        let navigation = &self.navigation;
        if navigation.speed <= 0 || navigation.speed > motor.max_speed {
            return Err(GatiError::Config(format!(
                "navigation speed {} outside 1..={}",
                navigation.speed, motor.max_speed
            )));
        }
        if navigation.max_attempts == 0 {
            return Err(GatiError::Config("max_attempts must be at least 1".to_string()));
        }
        let start = navigation.initial_pose;
        if !(start.x.is_finite() && start.y.is_finite() && start.theta.is_finite()) {
            return Err(GatiError::Config(format!("initial pose {} is not finite", start)));
        }
        if let Some(waypoint) = navigation.waypoints.iter().find(|w| !w.is_finite()) {
            return Err(GatiError::Config(format!("waypoint {:?} is not finite", waypoint)));
        }

        let escape = &self.escape;
        for (name, value) in [
            ("escape.first_turn_deg", escape.first_turn_deg),
            ("escape.side_step_mm", escape.side_step_mm),
            ("escape.second_turn_deg", escape.second_turn_deg),
            ("escape.advance_mm", escape.advance_mm),
        ] {
            finite(name, value)?;
        }

        positive("simulation.speed_factor", self.simulation.speed_factor)?;
        Ok(())
    }
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(GatiError::Config(format!("{} must be finite, got {}", name, value)))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    finite(name, value)?;
    if value <= 0.0 {
        return Err(GatiError::Config(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}
