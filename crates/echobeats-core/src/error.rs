//! Error types for Echobeats

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("clock fault at step {step}: {reason}")]
    ClockFault { step: u64, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn clock_fault(step: u64, reason: impl Into<String>) -> Self {
        Self::ClockFault {
            step,
            reason: reason.into(),
        }
    }

    /// Only clock faults halt the scheduler; everything else is recovered per step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ClockFault { .. })
    }
}
