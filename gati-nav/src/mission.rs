//! Waypoint lists and the command words that build them

use serde::{Deserialize, Serialize};

use crate::error::{GatiError, Result};
use crate::types::Pose;

/// Default target when no command is given: 500mm straight ahead
pub const DEFAULT_TARGET: Pose = Pose {
    x: 500.0,
    y: 0.0,
    theta: 0.0,
};

/// An absolute target in the world frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waypoint {
    /// Reach the position, then face `theta`
    Pose { x: f64, y: f64, theta: f64 },
    /// Reach the position and keep the approach heading
    Reckless { x: f64, y: f64 },
}

impl Waypoint {
    pub fn pose(x: f64, y: f64, theta: f64) -> Self {
        Waypoint::Pose { x, y, theta }
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            Waypoint::Pose { x, y, theta } => x.is_finite() && y.is_finite() && theta.is_finite(),
            Waypoint::Reckless { x, y } => x.is_finite() && y.is_finite(),
        }
    }

    /// Target pose handed to the navigator.
    ///
    /// A reckless target gets a heading far past `ignore_angle_deg`, so the
    /// final turn is skipped.
    pub fn target(&self, ignore_angle_deg: f64) -> Pose {
        match *self {
            Waypoint::Pose { x, y, theta } => Pose::new(x, y, theta),
            Waypoint::Reckless { x, y } => Pose::new(x, y, 10.0 * ignore_angle_deg),
        }
    }
}

impl From<Pose> for Waypoint {
    fn from(p: Pose) -> Self {
        Waypoint::pose(p.x, p.y, p.theta)
    }
}

/// Parse a command stream into waypoints.
///
/// ```text
/// turnleft [deg]         (0, 0, deg)      default 90
/// turnright [deg]        (0, 0, -deg)     default 90
/// move [x y theta]       (x, y, theta)    default (100, 100, 90)
/// movereckless [x y]     (x, y, -)        default (100, 100)
/// <number>               (number, 0, 0)
/// ```
///
/// Optional arguments are only consumed when all of them are numbers.
/// An empty stream yields [`DEFAULT_TARGET`].
pub fn parse_waypoints<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Waypoint>> {
    if tokens.is_empty() {
        return Ok(vec![DEFAULT_TARGET.into()]);
    }

    let mut waypoints = Vec::new();
    let mut rest = tokens;
    while let Some((word, tail)) = rest.split_first() {
        let word = word.as_ref();
        rest = tail;
        let waypoint = match word {
            "turnleft" => {
                let deg = take_numbers::<1, _>(&mut rest)?.map_or(90.0, |[d]| d);
                Waypoint::pose(0.0, 0.0, deg)
            }
            "turnright" => {
                let deg = take_numbers::<1, _>(&mut rest)?.map_or(90.0, |[d]| d);
                Waypoint::pose(0.0, 0.0, -deg)
            }
            "move" => {
                let [x, y, theta] = take_numbers(&mut rest)?.unwrap_or([100.0, 100.0, 90.0]);
                Waypoint::pose(x, y, theta)
            }
            "movereckless" => {
                let [x, y] = take_numbers(&mut rest)?.unwrap_or([100.0, 100.0]);
                Waypoint::Reckless { x, y }
            }
            other => match other.parse::<f64>() {
                Ok(x) => Waypoint::pose(finite(x, other)?, 0.0, 0.0),
                Err(_) => {
                    return Err(GatiError::Config(format!("Unknown waypoint command '{}'", other)));
                }
            },
        };
        waypoints.push(waypoint);
    }
    Ok(waypoints)
}

/// Consume `N` leading numbers, or nothing if any of them is missing or not a number.
///
/// Numbers that parse but are not finite (`nan`, `inf`, `1e400`) are errors.
fn take_numbers<const N: usize, S: AsRef<str>>(rest: &mut &[S]) -> Result<Option<[f64; N]>> {
    if rest.len() < N {
        return Ok(None);
    }
    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(rest.iter()) {
        match token.as_ref().parse::<f64>() {
            Ok(number) => *value = finite(number, token.as_ref())?,
            Err(_) => return Ok(None),
        }
    }
    *rest = &rest[N..];
    Ok(Some(values))
}

fn finite(value: f64, token: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GatiError::Config(format!("Waypoint value '{}' is not a finite number", token)))
    }
}
