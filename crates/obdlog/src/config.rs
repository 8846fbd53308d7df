//! Configuration file handling for obdlog

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use obdlog_capture::CaptureConfig;
use obdlog_discovery::DiscoveryConfig;
use obdlog_link::LinkConfig;
use serde::{Deserialize, Serialize};

/// File looked for in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "obdlog.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root for session and discovery output
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            link: LinkConfig::default(),
            capture: CaptureConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `obdlog.toml` from the working directory, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.link.validate().context("Invalid [link] section")?;
        self.capture.validate().context("Invalid [capture] section")?;
        self.discovery
            .validate()
            .context("Invalid [discovery] section")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdlog_link::TransportConfig;
    use std::io::Write;

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
data_dir = "/var/lib/obdlog"

[link]
port = "/dev/ttyUSB0"
reconnect_attempts = 2

[link.transport]
type = "simulated"
latency_ms = 20

[capture]
sampling_rate_hz = 5.0
pids = ["RPM", "COOLANT_TEMP"]

[discovery]
custom_probe_delay_ms = 250
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/obdlog"));
        assert_eq!(config.link.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.link.reconnect_attempts, 2);
        let TransportConfig::Simulated(sim) = &config.link.transport;
        assert_eq!(sim.latency_ms, 20);
        assert_eq!(config.capture.pids, vec!["RPM", "COOLANT_TEMP"]);
        assert_eq!(config.discovery.custom_probe_delay_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "data_dir = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_reports_section() {
        let mut config = AppConfig::default();
        config.capture.sampling_rate_hz = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[capture]"));
    }
}
