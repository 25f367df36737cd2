//! Error types for GatiNav
//!
//! Every unrecoverable condition in the control stack ends up here. Recoverable
//! motion results (interrupt, retry) are [`crate::types::Outcome`] values instead.

use thiserror::Error;

use crate::types::Side;

/// GatiNav error type
#[derive(Error, Debug)]
pub enum GatiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A pulse counter read back negative. The counters only ever grow, so this
    /// means the sensor side is broken.
    #[error("Broken {side} wheel sensor read: count {count}")]
    SensorFault { side: Side, count: i32 },

    /// Low-level PWM register write failed
    #[error("PWM write failed: {0}")]
    Pwm(String),

    /// A motor command failed at a specific call site (`code` identifies the site)
    #[error("Motor command failed (code {code}): {reason}")]
    Actuator { code: i32, reason: String },

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Sensor task error: {0}")]
    SensorTask(String),
}

impl GatiError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            GatiError::Config(_) | GatiError::Io(_) => 2,
            GatiError::SensorTask(_) => 3,
            GatiError::SensorFault { .. } => 4,
            GatiError::Pwm(_) | GatiError::Actuator { .. } => 5,
            GatiError::InvalidAction(_) => 6,
        }
    }
}

impl From<toml::de::Error> for GatiError {
    fn from(e: toml::de::Error) -> Self {
        GatiError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for GatiError {
    fn from(e: toml::ser::Error) -> Self {
        GatiError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatiError>;
