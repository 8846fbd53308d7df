//! Discovery configuration

use std::ops::RangeInclusive;
use std::time::Duration;

use obdlog_core::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};

/// Closed identifier range within a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: u8,
    pub end: u8,
}

impl IdRange {
    /// The whole single-byte space
    pub const FULL: IdRange = IdRange {
        start: 0x00,
        end: 0xFF,
    };

    pub fn as_range(&self) -> RangeInclusive<u8> {
        self.start..=self.end
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            start: 0x00,
            end: 0x0F,
        }
    }
}

/// Probe pacing and manufacturer mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Idle time after each standard PID query, in milliseconds
    #[serde(default = "default_standard_probe_delay_ms")]
    pub standard_probe_delay_ms: u64,
    /// Idle time after each raw manufacturer-mode query, in milliseconds
    #[serde(default = "default_custom_probe_delay_ms")]
    pub custom_probe_delay_ms: u64,
    /// Candidate manufacturer-specific modes
    #[serde(default = "default_manufacturer_modes")]
    pub manufacturer_modes: Vec<u8>,
    /// Identifiers tried per candidate mode
    #[serde(default)]
    pub manufacturer_range: IdRange,
    /// Reconnect attempts when the link drops mid-sweep
    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: u32,
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,
}

fn default_standard_probe_delay_ms() -> u64 {
    100
}

fn default_custom_probe_delay_ms() -> u64 {
    150
}

fn default_manufacturer_modes() -> Vec<u8> {
    vec![0x21, 0x22]
}

fn default_recovery_attempts() -> u32 {
    3
}

fn default_recovery_delay_ms() -> u64 {
    2000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            standard_probe_delay_ms: default_standard_probe_delay_ms(),
            custom_probe_delay_ms: default_custom_probe_delay_ms(),
            manufacturer_modes: default_manufacturer_modes(),
            manufacturer_range: IdRange::default(),
            recovery_attempts: default_recovery_attempts(),
            recovery_delay_ms: default_recovery_delay_ms(),
        }
    }
}

impl DiscoveryConfig {
    pub fn standard_probe_delay(&self) -> Duration {
        Duration::from_millis(self.standard_probe_delay_ms)
    }

    pub fn custom_probe_delay(&self) -> Duration {
        Duration::from_millis(self.custom_probe_delay_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.manufacturer_range.start > self.manufacturer_range.end {
            return Err(TelemetryError::InvalidConfig(format!(
                "discovery.manufacturer_range start 0x{:02X} is past end 0x{:02X}",
                self.manufacturer_range.start, self.manufacturer_range.end
            )));
        }
        if self.recovery_attempts == 0 {
            return Err(TelemetryError::InvalidConfig(
                "discovery.recovery_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
