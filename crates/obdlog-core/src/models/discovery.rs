//! Discovery run models

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Transport identity captured at the start of a discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSnapshot {
    pub timestamp: DateTime<Local>,
    pub protocol_name: String,
    pub protocol_id: String,
    pub port: String,
    pub ecus: usize,
    pub supported_commands_count: usize,
}

impl ProtocolSnapshot {
    /// Key/value pairs in display order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("timestamp", self.timestamp.to_rfc3339()),
            ("protocol_name", self.protocol_name.clone()),
            ("protocol_id", self.protocol_id.clone()),
            ("port", self.port.clone()),
            ("ecus", self.ecus.to_string()),
            (
                "supported_commands_count",
                self.supported_commands_count.to_string(),
            ),
        ]
    }
}

/// A standard PID that answered during the sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPid {
    pub name: String,
    /// Command code (e.g., "010C")
    pub command: String,
    #[serde(rename = "desc")]
    pub description: String,
    /// Mode as two hex digits
    pub mode: String,
    /// PID as two hex digits
    pub pid: String,
    /// Last value seen
    pub value: String,
    /// Unit of the last value, empty when unitless
    pub unit: String,
}

/// A manufacturer-space identifier that answered a raw probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPidResponse {
    /// Combined mode+identifier code (e.g., "2201")
    pub pid: String,
    pub raw_response: String,
}

/// How far a sweep got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Sweep label (e.g., "standard", "mode 22")
    pub sweep: String,
    /// Identifiers probed before the sweep ended
    pub probed: usize,
    /// Identifiers the sweep intended to probe
    pub total: usize,
    /// Identifiers that answered
    pub responding: usize,
    /// Why the sweep stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl SweepReport {
    pub fn new(sweep: impl Into<String>, total: usize) -> Self {
        Self {
            sweep: sweep.into(),
            probed: 0,
            total,
            responding: 0,
            interrupted: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none() && self.probed == self.total
    }

    /// Completed share of the sweep, in percent
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.probed as f64 / self.total as f64 * 100.0
    }
}

/// Everything a discovery run learned, built incrementally
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolSnapshot>,
    /// Responding standard PIDs keyed by command code
    pub standard_pids: BTreeMap<String, DiscoveredPid>,
    /// Manufacturer mode (hex) -> responding identifiers keyed by combined code
    pub manufacturer_modes: BTreeMap<String, BTreeMap<String, CustomPidResponse>>,
    /// Per-sweep progress, in execution order
    pub sweeps: Vec<SweepReport>,
    #[serde(skip)]
    sealed: bool,
}

impl DiscoveryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_protocol(&mut self, snapshot: ProtocolSnapshot) {
        if !self.sealed {
            self.protocol = Some(snapshot);
        }
    }

    /// Record or refresh a responding standard PID
    pub fn record_standard(&mut self, pid: DiscoveredPid) -> bool {
        if self.sealed {
            return false;
        }
        self.standard_pids.insert(pid.command.clone(), pid);
        true
    }

    /// Record the responding identifiers of one manufacturer mode
    pub fn record_mode(&mut self, mode: u8, hits: BTreeMap<String, CustomPidResponse>) -> bool {
        if self.sealed || hits.is_empty() {
            return false;
        }
        self.manufacturer_modes
            .entry(format!("{:02X}", mode))
            .or_default()
            .extend(hits);
        true
    }

    pub fn record_sweep(&mut self, report: SweepReport) {
        if !self.sealed {
            self.sweeps.push(report);
        }
    }

    /// Command codes of responding standard PIDs, in code order
    pub fn standard_codes(&self) -> Vec<String> {
        self.standard_pids.keys().cloned().collect()
    }

    /// Freeze the record; later mutations are ignored
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
