//! Diagnostic command and monitored PID models

use serde::{Deserialize, Serialize};

/// OBD-II mode for current powertrain data
pub const MODE_CURRENT_DATA: u8 = 0x01;

/// A query the transport can execute: a diagnostic mode plus a PID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Symbolic name (e.g., "RPM")
    pub name: String,
    /// Diagnostic mode (service) byte
    pub mode: u8,
    /// Parameter identifier within the mode
    pub pid: u8,
    /// Human-readable description
    pub description: String,
}

impl CommandSpec {
    pub fn new(
        name: impl Into<String>,
        mode: u8,
        pid: u8,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            pid,
            description: description.into(),
        }
    }

    /// An unnamed raw query for manufacturer-space probing
    pub fn raw(mode: u8, pid: u8) -> Self {
        let code = format!("{:02X}{:02X}", mode, pid);
        Self {
            name: "CUSTOM".to_string(),
            mode,
            pid,
            description: format!("Custom PID {}", code),
        }
    }

    /// The lightweight query used as a liveness probe (mode 01, PID 01)
    pub fn status() -> Self {
        Self::new(
            "STATUS",
            MODE_CURRENT_DATA,
            0x01,
            "Status since DTCs cleared",
        )
    }

    /// Hex command code, mode followed by PID (e.g., "010C")
    pub fn code(&self) -> String {
        format!("{:02X}{:02X}", self.mode, self.pid)
    }
}

/// A channel monitored during capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidSpec {
    /// Column name in the output (e.g., "COOLANT_TEMP")
    pub name: String,
    /// Underlying transport command
    pub command: CommandSpec,
    /// Human-readable description
    pub description: String,
    /// Unit of measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl PidSpec {
    pub fn new(command: CommandSpec, unit: Option<&str>) -> Self {
        Self {
            name: command.name.clone(),
            description: command.description.clone(),
            unit: unit.map(String::from),
            command,
        }
    }
}
