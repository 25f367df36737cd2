//! Value types exchanged between the sensor, odometry, motion and navigation layers.
//!
//! Everything here is `Copy`: poses are handed from stage to stage by value and
//! replaced wholesale after each completed action.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Robot pose in the world frame.
///
/// `x` and `y` are millimeters, `theta` is degrees counter-clockwise from +X.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub const ORIGIN: Pose = Pose {
        x: 0.0,
        y: 0.0,
        theta: 0.0,
    };

    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Euclidean distance between the two positions (mm), heading ignored
    pub fn distance(&self, other: &Pose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Bearing from this position to `other`, in degrees
    pub fn bearing_to(&self, other: &Pose) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1}°)", self.x, self.y, self.theta)
    }
}

/// Left or right side of the robot.
///
/// Addresses a wheel (servo + slot sensor) or a proximity sensor. Exactly two
/// values, each bound to one physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Index into per-side arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Wheel spin direction relative to the drivetrain's forward motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Result of a motion action or action sequence.
///
/// Unrecoverable failures are not an `Outcome`: they travel as `Err(GatiError)`
/// and abort the enclosing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Target reached; move on
    Ok,
    /// Stopped early; the caller should try an alternate strategy
    Interrupt,
    /// Redo the same step from scratch
    Retry,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => f.write_str("ok"),
            Outcome::Interrupt => f.write_str("interrupt"),
            Outcome::Retry => f.write_str("retry"),
        }
    }
}
