//! Waypoint navigation: plan, run, escape, retry.
//!
//! Each waypoint is reached with a turn toward it, a straight move and a
//! turn to the final heading. An obstacle that does not clear in time ends
//! the sequence with `Interrupt`; the navigator then runs the fixed escape
//! maneuver and tries again from wherever that left the robot.

use crate::config::{EscapeConfig, NavigationConfig};
use crate::engine::{ActionEngine, ActionNode};
use crate::error::Result;
use crate::mission::Waypoint;
use crate::types::{Outcome, Pose};

/// Result of one waypoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointReport {
    pub target: Pose,
    pub pose: Pose,
    pub outcome: Outcome,
    pub attempts: u32,
    pub escapes: u32,
}

/// Result of a waypoint list
#[derive(Debug, Clone, PartialEq)]
pub struct MissionReport {
    pub waypoints: Vec<WaypointReport>,
    pub pose: Pose,
    /// Every waypoint ended `Ok`
    pub completed: bool,
}

/// Turn to face the target, move to it, turn to its heading
pub fn plan_move(from: Pose, to: Pose, speed: i32, clearance_distance_mm: f64) -> [ActionNode; 3] {
    let distance = from.distance(&to);
    let bearing = from.bearing_to(&to);
    let first_turn = bearing - from.theta;
    let final_turn = to.theta - bearing;
    tracing::info!(
        "Trajectory: turn {:.1}°, move {:.1}mm, turn {:.1}°",
        first_turn,
        distance,
        final_turn
    );

    [
        ActionNode::turn(first_turn, speed),
        ActionNode::move_forward(distance, speed, clearance_distance_mm),
        ActionNode::turn(final_turn, speed),
    ]
}

/// Fixed bypass: turn, side-step, turn back, advance
pub fn escape_maneuver(escape: &EscapeConfig, speed: i32, clearance_distance_mm: f64) -> [ActionNode; 4] {
    [
        ActionNode::turn(escape.first_turn_deg, speed),
        ActionNode::move_forward(escape.side_step_mm, speed, clearance_distance_mm),
        ActionNode::turn(escape.second_turn_deg, speed),
        ActionNode::move_forward(escape.advance_mm, speed, clearance_distance_mm),
    ]
}

/// Drives waypoint transitions through an [`ActionEngine`]
pub struct Navigator {
    engine: ActionEngine,
    config: NavigationConfig,
    escape: EscapeConfig,
}

impl Navigator {
    pub fn new(engine: ActionEngine, config: NavigationConfig, escape: EscapeConfig) -> Self {
        Self {
            engine,
            config,
            escape,
        }
    }

    pub fn engine_mut(&mut self) -> &mut ActionEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> ActionEngine {
        self.engine
    }

    /// One straight-line transition; no retries
    pub fn move_from_to(&mut self, from: Pose, to: Pose) -> Result<(Outcome, Pose)> {
        tracing::info!("Going from {} to {}", from, to);
        let actions = plan_move(from, to, self.config.speed, self.clearance_distance());
        let result = self.engine.run_actions(&actions, from)?;
        Ok((result.outcome, result.pose))
    }

    /// Run the escape maneuver from `from`
    pub fn go_around(&mut self, from: Pose) -> Result<(Outcome, Pose)> {
        let actions = escape_maneuver(&self.escape, self.config.speed, self.clearance_distance());
        let result = self.engine.run_actions(&actions, from)?;
        Ok((result.outcome, result.pose))
    }

    /// Reach `target` from `start`, escaping and retrying up to `max_attempts` times
    pub fn execute_move_protocol(&mut self, start: Pose, target: Pose) -> Result<WaypointReport> {
        let mut pose = start;
        let mut outcome = Outcome::Interrupt;
        let mut attempts = 0;
        let mut escapes = 0;

        while attempts < self.config.max_attempts {
            attempts += 1;
            tracing::info!("Attempt {}/{} toward {}", attempts, self.config.max_attempts, target);

            let (result, reached) = self.move_from_to(pose, target)?;
            outcome = result;
            pose = reached;

            if outcome == Outcome::Interrupt {
                tracing::warn!("Blocked at {}, going around", pose);
                let (escape_outcome, escaped) = self.go_around(pose)?;
                if escape_outcome == Outcome::Interrupt {
                    tracing::warn!("Interrupt during escape at {}", escaped);
                }
                escapes += 1;
                pose = escaped;
            }

            if outcome == Outcome::Ok {
                tracing::info!("Reached {} ({:.1}mm from target)", pose, pose.distance(&target));
                break;
            }
        }

        Ok(WaypointReport {
            target,
            pose,
            outcome,
            attempts,
            escapes,
        })
    }

    /// Run waypoints in order, each from where the previous one ended.
    ///
    /// Stops at the first waypoint that does not end `Ok`; an `Err` aborts
    /// the whole list.
    pub fn run_mission(&mut self, initial: Pose, waypoints: &[Waypoint]) -> Result<MissionReport> {
        let ignore_angle = self.engine.config().ignore_angle_deg;
        let mut reports = Vec::with_capacity(waypoints.len());
        let mut pose = initial;

        for (i, waypoint) in waypoints.iter().enumerate() {
            let report = self.execute_move_protocol(pose, waypoint.target(ignore_angle))?;
            tracing::info!(
                "Waypoint {}/{}: {} at {} after {} attempt(s)",
                i + 1,
                waypoints.len(),
                report.outcome,
                report.pose,
                report.attempts
            );
            pose = report.pose;
            reports.push(report);

            if report.outcome != Outcome::Ok {
                tracing::warn!("Dropping {} remaining waypoint(s)", waypoints.len() - i - 1);
                break;
            }
        }

        let completed = reports.len() == waypoints.len()
            && reports.iter().all(|r| r.outcome == Outcome::Ok);
        Ok(MissionReport {
            waypoints: reports,
            pose,
            completed,
        })
    }

    fn clearance_distance(&self) -> f64 {
        self.engine.config().obstacle_distance_mm
    }
}
