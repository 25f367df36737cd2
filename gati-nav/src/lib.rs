//! GatiNav - closed-loop motion control for a two-wheeled servo robot
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │         navigation (waypoints, escape, retry)       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │      engine (action sequences, interrupts)          │
//! └─────────────────────────────────────────────────────┘
//!              │                         │
//! ┌────────────────────────┐  ┌────────────────────────┐
//! │ odometry (Euler, 1000) │  │ motor (speed → PWM)    │
//! └────────────────────────┘  └────────────────────────┘
//!              │                         │
//! ┌────────────────────────┐  ┌────────────────────────┐
//! │ sensors (10ms task)    │  │ hal::PwmOutput         │
//! │ → shared (atomics)     │  └────────────────────────┘
//! └────────────────────────┘
//!              │
//! ┌────────────────────────┐
//! │ hal::AnalogInput       │
//! └────────────────────────┘
//! ```
//!
//! Two threads run: the sensor task sampling every 10 ms, and the caller's
//! thread driving the navigator. They share only [`SharedSensorState`],
//! which is lock-free.
//!
//! The [`sim`] module provides a simulated robot behind the same hardware
//! traits, with a clock that can run faster than real time.

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod hal;
pub mod mission;
pub mod motor;
pub mod navigation;
pub mod odometry;
pub mod sensors;
pub mod shared;
pub mod sim;
pub mod types;
pub mod utils;

pub use app::{JogCommand, RobotStack};
pub use config::GatiConfig;
pub use engine::{ActionEngine, ActionNode, InterruptCheck, MotionOp, SequenceResult};
pub use error::{GatiError, Result};
pub use hal::{AnalogInput, Clock, PwmOutput, SystemClock};
pub use mission::{Waypoint, parse_waypoints};
pub use motor::MotorController;
pub use navigation::{MissionReport, Navigator, WaypointReport};
pub use odometry::Odometry;
pub use sensors::SensorTask;
pub use shared::SharedSensorState;
pub use types::{Direction, Outcome, Pose, Side};
pub use utils::simplify_angle;
