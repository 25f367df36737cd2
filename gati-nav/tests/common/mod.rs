//! Fixtures for running the full stack against the simulated robot.

#![allow(dead_code)]

use std::sync::Arc;

use gati_nav::config::ObstacleWindow;
use gati_nav::sim::SimulatedRobot;
use gati_nav::{Clock, GatiConfig, Pose, RobotStack, simplify_angle};

/// Virtual time speed-up used by the integration tests.
///
/// Higher factors squeeze the 10ms sampling period below what the scheduler
/// delivers reliably and wheel pulses start getting missed.
pub const SPEED_FACTOR: f64 = 5.0;

/// Default configuration on a faster clock with a fixed noise seed
pub fn sim_config() -> GatiConfig {
    let mut config = GatiConfig::default();
    config.simulation.speed_factor = SPEED_FACTOR;
    config.simulation.random_seed = 42;
    config
}

/// Configuration with an obstacle in view for the first `until_ms` virtual ms
pub fn obstacle_config(until_ms: u64) -> GatiConfig {
    let mut config = sim_config();
    config.simulation.obstacles = vec![ObstacleWindow {
        from_ms: 0,
        until_ms,
    }];
    config
}

/// Start the stack and let the sensor filters settle
pub fn start(config: GatiConfig) -> (RobotStack, Arc<SimulatedRobot>) {
    let (stack, robot) = RobotStack::simulated(config).expect("stack starts");
    stack.clock().sleep_ms(100);
    (stack, robot)
}

/// Poll `condition` every 10 virtual ms until it holds or `timeout_ms` passes
pub fn wait_until(clock: &dyn Clock, timeout_ms: u64, condition: impl Fn() -> bool) -> bool {
    let started = clock.now_ms();
    while clock.now_ms() - started < timeout_ms {
        if condition() {
            return true;
        }
        clock.sleep_ms(10);
    }
    condition()
}

/// Smallest signed difference between two headings (degrees)
pub fn heading_error(actual: f64, expected: f64) -> f64 {
    simplify_angle(actual - expected).abs()
}

pub fn assert_pose_near(actual: Pose, expected: Pose, position_mm: f64, heading_deg: f64) {
    let d = actual.distance(&expected);
    assert!(
        d <= position_mm,
        "position {} is {:.1}mm from {} (tolerance {}mm)",
        actual,
        d,
        expected,
        position_mm
    );
    let e = heading_error(actual.theta, expected.theta);
    assert!(
        e <= heading_deg,
        "heading {} is {:.1}° from {} (tolerance {}°)",
        actual,
        e,
        expected,
        heading_deg
    );
}
