//! Link configuration
//!
//! Defaults follow an ELM327 adapter on a Bluetooth serial port.

use std::time::Duration;

use obdlog_core::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};

/// Connection and recovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port (e.g., "/dev/rfcomm0"); auto-detect when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Adapter baud rate
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Connect attempts made by a reconnect
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Per-query timeout in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Transport implementation
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_baudrate() -> u32 {
    38400
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_query_timeout_ms() -> u64 {
    2000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baudrate: default_baudrate(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            transport: TransportConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.reconnect_attempts == 0 {
            return Err(TelemetryError::InvalidConfig(
                "link.reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.baudrate == 0 {
            return Err(TelemetryError::InvalidConfig(
                "link.baudrate must be positive".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(TelemetryError::InvalidConfig(
                "link.query_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Simulated ECU, for demos and tests
    Simulated(SimulatedConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Simulated(SimulatedConfig::default())
    }
}

/// Simulated ECU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Simulated latency per exchange in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Add random variation to readings
    #[serde(default)]
    pub jitter: bool,
    /// Standard PIDs the ECU advertises (catalog names)
    #[serde(default = "default_supported_pids")]
    pub supported_pids: Vec<String>,
    /// Manufacturer-space answers: combined hex code (e.g., "2201") -> hex payload
    #[serde(default = "default_manufacturer_responses")]
    pub manufacturer_responses: Vec<(String, String)>,
    /// Protocol name reported by the adapter
    #[serde(default = "default_protocol_name")]
    pub protocol_name: String,
}

fn default_supported_pids() -> Vec<String> {
    [
        "STATUS",
        "ENGINE_LOAD",
        "COOLANT_TEMP",
        "INTAKE_PRESSURE",
        "RPM",
        "SPEED",
        "INTAKE_TEMP",
        "THROTTLE_POS",
        "RUN_TIME",
        "FUEL_LEVEL",
        "CONTROL_MODULE_VOLTAGE",
        "AMBIANT_AIR_TEMP",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_manufacturer_responses() -> Vec<(String, String)> {
    vec![
        ("2201".to_string(), "62010B54".to_string()),
        ("2203".to_string(), "620300C8".to_string()),
        ("210A".to_string(), "610A0F".to_string()),
    ]
}

fn default_protocol_name() -> String {
    "ISO 15765-4 (CAN 11/500)".to_string()
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            jitter: false,
            supported_pids: default_supported_pids(),
            manufacturer_responses: default_manufacturer_responses(),
            protocol_name: default_protocol_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: LinkConfig = toml::from_str("").unwrap();
        assert_eq!(config.baudrate, 38400);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert!(config.port.is_none());
        assert!(matches!(config.transport, TransportConfig::Simulated(_)));
    }

    #[test]
    fn test_parse_simulated_transport() {
        let config: LinkConfig = toml::from_str(
            r#"
            port = "/dev/rfcomm0"
            reconnect_attempts = 2

            [transport]
            type = "simulated"
            latency_ms = 40
            supported_pids = ["RPM", "SPEED"]
            "#,
        )
        .unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/rfcomm0"));
        assert_eq!(config.reconnect_attempts, 2);
        let TransportConfig::Simulated(sim) = config.transport;
        assert_eq!(sim.latency_ms, 40);
        assert_eq!(sim.supported_pids, vec!["RPM", "SPEED"]);
        assert_eq!(sim.manufacturer_responses.len(), 3);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = LinkConfig {
            reconnect_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_baudrate_rejected() {
        let config = LinkConfig {
            baudrate: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("baudrate"));
    }
}
