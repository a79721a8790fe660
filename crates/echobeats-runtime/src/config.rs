//! Scheduler configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use echobeats_core::{Error, LanePattern, Result, DEFAULT_OFFSETS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between steps in milliseconds. Also the integrator's
    /// step-level wait.
    pub step_duration_ms: u64,
    /// Per-call bound on operation handlers in milliseconds.
    pub handler_timeout_ms: u64,
    /// Step offsets of the Affordance, Relevance and Salience lanes.
    pub lane_offsets: [u64; 3],
    /// First step value processed.
    pub start_step: u64,
    /// Stop on its own after this many steps. Unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    /// Snapshots buffered per subscriber before it starts dropping.
    pub stream_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: 1_000,
            handler_timeout_ms: 250,
            lane_offsets: DEFAULT_OFFSETS,
            start_step: 0,
            max_steps: None,
            stream_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse config from TOML text, surfacing parse errors.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_duration_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// How long Integrate waits for the step's PhaseLane events: the handler
    /// timeout plus a quarter of it (at least 1ms) for the degraded event of a
    /// timed-out lane to land.
    pub fn phase_gather_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_gather_timeout_ms())
    }

    fn phase_gather_timeout_ms(&self) -> u64 {
        let margin = (self.handler_timeout_ms / 4).max(1);
        self.handler_timeout_ms.saturating_add(margin)
    }

    /// Builds the lane pattern, which validates the offsets.
    pub fn pattern(&self) -> Result<LanePattern> {
        LanePattern::new(self.lane_offsets)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_duration_ms == 0 {
            return Err(Error::config("step_duration_ms must be > 0"));
        }
        if self.handler_timeout_ms == 0 {
            return Err(Error::config("handler_timeout_ms must be > 0"));
        }
        // Integrate waits for the phase feed and then for its own handler.
        let integrate_bound = self
            .phase_gather_timeout_ms()
            .saturating_add(self.handler_timeout_ms);
        if integrate_bound >= self.step_duration_ms {
            return Err(Error::config(format!(
                "handler_timeout_ms ({}) too long for step_duration_ms ({}): \
                 Integrate may need {}ms",
                self.handler_timeout_ms, self.step_duration_ms, integrate_bound
            )));
        }
        if self.stream_capacity == 0 {
            return Err(Error::config("stream_capacity must be > 0"));
        }
        self.pattern()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn handler_timeout_must_fit_twice_in_a_step() {
        let config = SchedulerConfig {
            step_duration_ms: 100,
            handler_timeout_ms: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn phase_gather_outlasts_handler_timeout() {
        let config = SchedulerConfig {
            step_duration_ms: 100,
            handler_timeout_ms: 40,
            ..Default::default()
        };
        assert_eq!(config.phase_gather_timeout(), Duration::from_millis(50));
        assert!(config.validate().is_ok());

        let tiny = SchedulerConfig {
            step_duration_ms: 10,
            handler_timeout_ms: 2,
            ..Default::default()
        };
        assert!(tiny.phase_gather_timeout() > tiny.handler_timeout());
    }

    #[test]
    fn gather_and_integrate_must_fit_in_a_step() {
        // 45 + 11 + 45 = 101
        let config = SchedulerConfig {
            step_duration_ms: 100,
            handler_timeout_ms: 45,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn colliding_offsets_are_rejected() {
        let config = SchedulerConfig {
            lane_offsets: [0, 0, 2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
