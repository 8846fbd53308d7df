//! Capture configuration

use std::time::Duration;

use obdlog_core::{ScenarioPlan, TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};

/// Longest accepted time between ticks
pub const MAX_SAMPLING_INTERVAL: Duration = Duration::from_secs(3600);

/// Sampling and recovery settings for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Samples per second
    #[serde(default = "default_sampling_rate_hz")]
    pub sampling_rate_hz: f64,
    /// PID names to monitor; empty means auto-detect
    #[serde(default)]
    pub pids: Vec<String>,
    /// Reconnect attempts when the link is lost mid-scenario
    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: u32,
    /// Delay between those attempts in milliseconds
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,
    /// Scenarios in execution order
    #[serde(default = "ScenarioPlan::default_plan")]
    pub scenarios: Vec<ScenarioPlan>,
    /// Emit progress every N samples (0 disables)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_sampling_rate_hz() -> f64 {
    1.0
}

fn default_recovery_attempts() -> u32 {
    3
}

fn default_recovery_delay_ms() -> u64 {
    2000
}

fn default_progress_every() -> u64 {
    10
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: default_sampling_rate_hz(),
            pids: Vec::new(),
            recovery_attempts: default_recovery_attempts(),
            recovery_delay_ms: default_recovery_delay_ms(),
            scenarios: ScenarioPlan::default_plan(),
            progress_every: default_progress_every(),
        }
    }
}

impl CaptureConfig {
    /// Time between ticks, clamped to [`MAX_SAMPLING_INTERVAL`]
    pub fn sampling_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.sampling_rate_hz)
            .map_or(MAX_SAMPLING_INTERVAL, |interval| {
                interval.min(MAX_SAMPLING_INTERVAL)
            })
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    /// Scenarios whose id is in `ids`, in plan order
    pub fn select_scenarios(&self, ids: &[String]) -> TelemetryResult<Vec<ScenarioPlan>> {
        if ids.is_empty() {
            return Ok(self.scenarios.clone());
        }
        if let Some(unknown) = ids
            .iter()
            .find(|id| !self.scenarios.iter().any(|s| &s.id == *id))
        {
            return Err(TelemetryError::InvalidConfig(format!(
                "unknown scenario '{}'",
                unknown
            )));
        }
        Ok(self
            .scenarios
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if !(self.sampling_rate_hz.is_finite() && self.sampling_rate_hz > 0.0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "capture.sampling_rate_hz must be positive, got {}",
                self.sampling_rate_hz
            )));
        }
        if 1.0 / self.sampling_rate_hz > MAX_SAMPLING_INTERVAL.as_secs_f64() {
            return Err(TelemetryError::InvalidConfig(format!(
                "capture.sampling_rate_hz {} is below one sample per {} s",
                self.sampling_rate_hz,
                MAX_SAMPLING_INTERVAL.as_secs()
            )));
        }
        if self.recovery_attempts == 0 {
            return Err(TelemetryError::InvalidConfig(
                "capture.recovery_attempts must be at least 1".to_string(),
            ));
        }
        for plan in &self.scenarios {
            if plan.id.is_empty() {
                return Err(TelemetryError::InvalidConfig(
                    "scenario id must not be empty".to_string(),
                ));
            }
            if !(plan.duration_secs.is_finite() && plan.duration_secs > 0.0) {
                return Err(TelemetryError::InvalidConfig(format!(
                    "scenario '{}' needs a positive duration",
                    plan.id
                )));
            }
        }
        Ok(())
    }
}
