//! GatiNav - waypoint runner for a two-servo differential drive robot
//!
//! Runs against the simulated robot. Waypoint commands follow the run
//! subcommand:
//!
//! ```text
//! gati-nav run move 500 500 90 turnright 45 movereckless 0 0
//! SPEED=40 N_TRIES=3 gati-nav --sim-speed 4 run 800
//! gati-nav jog left 3
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use gati_nav::{GatiConfig, JogCommand, Result, RobotStack, Waypoint, parse_waypoints};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults to gati.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Servo speed for every action (1..=motor.max_speed)
    #[arg(long, env = "SPEED", allow_negative_numbers = true)]
    speed: Option<i32>,

    /// Attempts per waypoint
    #[arg(long, env = "N_TRIES")]
    tries: Option<u32>,

    /// Initial x (mm)
    #[arg(long, env = "X_INIT", allow_negative_numbers = true)]
    x_init: Option<f64>,

    /// Initial y (mm)
    #[arg(long, env = "Y_INIT", allow_negative_numbers = true)]
    y_init: Option<f64>,

    /// Initial heading (degrees)
    #[arg(long, env = "THETA_INIT", allow_negative_numbers = true)]
    theta_init: Option<f64>,

    /// Simulation speed factor (virtual time / wall time)
    #[arg(long)]
    sim_speed: Option<f64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Visit waypoints: turnleft [deg] | turnright [deg] | move [x y theta] | movereckless [x y] | <x>
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        waypoints: Vec<String>,
    },
    /// Drive one primitive for a while and report the odometry
    Jog {
        #[arg(value_enum)]
        direction: JogCommand,
        /// Duration in seconds
        #[arg(default_value_t = 2)]
        seconds: u64,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gati_nav=info".parse().expect("valid log directive")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_config(args: &Args) -> Result<GatiConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            GatiConfig::load(path)?
        }
        None if Path::new("gati.toml").exists() => {
            info!("Loading configuration from gati.toml");
            GatiConfig::load(Path::new("gati.toml"))?
        }
        None => {
            info!("Using default configuration");
            GatiConfig::default()
        }
    };

    if let Some(speed) = args.speed {
        config.navigation.speed = speed;
    }
    if let Some(tries) = args.tries {
        config.navigation.max_attempts = tries;
    }
    let pose = &mut config.navigation.initial_pose;
    if let Some(x) = args.x_init {
        pose.x = x;
    }
    if let Some(y) = args.y_init {
        pose.y = y;
    }
    if let Some(theta) = args.theta_init {
        pose.theta = theta;
    }
    if let Some(factor) = args.sim_speed {
        config.simulation.speed_factor = factor;
    }

    config.validate()?;
    Ok(config)
}

/// Returns whether everything asked for was completed
fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;
    info!("GatiNav v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Speed {}, {} attempt(s) per waypoint, start {}",
        config.navigation.speed, config.navigation.max_attempts, config.navigation.initial_pose
    );

    let initial = config.navigation.initial_pose;
    let speed = config.navigation.speed;
    let configured_waypoints = config.navigation.waypoints.clone();
    let (mut stack, robot) = RobotStack::simulated(config)?;

    let outcome = match args.command {
        Some(Command::Jog { direction, seconds }) => stack
            .jog(direction, speed, seconds * 1000)
            .map(|_| true),
        Some(Command::Run { waypoints }) => {
            run_waypoints(&mut stack, initial, &waypoints, &configured_waypoints)
        }
        None => run_waypoints(&mut stack, initial, &[], &configured_waypoints),
    };

    info!("Simulated ground truth: {}", robot.true_pose());
    let shutdown = stack.shutdown();
    let completed = outcome?;
    shutdown?;
    Ok(completed)
}

fn run_waypoints(
    stack: &mut RobotStack,
    initial: gati_nav::Pose,
    commands: &[String],
    configured: &[Waypoint],
) -> Result<bool> {
    let waypoints = if commands.is_empty() && !configured.is_empty() {
        configured.to_vec()
    } else {
        parse_waypoints(commands)?
    };
    info!("{} waypoint(s) queued", waypoints.len());

    let report = stack.run_mission(initial, &waypoints)?;
    for (i, wp) in report.waypoints.iter().enumerate() {
        info!(
            "Waypoint {}: target {} reached {} ({}, {} attempt(s), {} escape(s))",
            i + 1,
            wp.target,
            wp.pose,
            wp.outcome,
            wp.attempts,
            wp.escapes
        );
    }
    if !report.completed {
        warn!("Mission incomplete, final pose {}", report.pose);
    } else {
        info!("Mission complete, final pose {}", report.pose);
    }
    Ok(report.completed)
}
