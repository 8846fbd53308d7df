//! Discovery results on disk
//!
//! Each run writes `discovery_results_<ts>.json` and a readable
//! `discovery_summary_<ts>.txt` under `<data_dir>/protocol_discovery/`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use obdlog_core::{
    CustomPidResponse, DiscoveredPid, DiscoveryRecord, ProtocolSnapshot, SweepReport,
    TelemetryError, TelemetryResult,
};
use serde::{Deserialize, Serialize};

pub const DISCOVERY_DIR: &str = "protocol_discovery";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Responding standard PIDs as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardPids {
    pub count: usize,
    /// Command codes in code order
    pub pids: Vec<String>,
    pub details: BTreeMap<String, DiscoveredPid>,
}

/// Contents of a `discovery_results_<ts>.json` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResults {
    pub discovery_timestamp: String,
    pub protocol_info: Option<ProtocolSnapshot>,
    pub standard_pids: StandardPids,
    #[serde(default)]
    pub manufacturer_modes: BTreeMap<String, BTreeMap<String, CustomPidResponse>>,
    #[serde(default)]
    pub sweeps: Vec<SweepReport>,
}

impl DiscoveryResults {
    pub fn new(record: &DiscoveryRecord, discovery_timestamp: impl Into<String>) -> Self {
        let pids = record.standard_codes();
        Self {
            discovery_timestamp: discovery_timestamp.into(),
            protocol_info: record.protocol.clone(),
            standard_pids: StandardPids {
                count: pids.len(),
                pids,
                details: record.standard_pids.clone(),
            },
            manufacturer_modes: record.manufacturer_modes.clone(),
            sweeps: record.sweeps.clone(),
        }
    }

    /// Plain-text report of the run
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "ECU PROTOCOL DISCOVERY SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out);

        let _ = writeln!(out, "PROTOCOL INFORMATION");
        let _ = writeln!(out, "{}", thin);
        match &self.protocol_info {
            Some(protocol) => {
                for (key, value) in protocol.fields() {
                    let _ = writeln!(out, "{:.<30} {}", key, value);
                }
            }
            None => {
                let _ = writeln!(out, "Not detected");
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out);
        let _ = writeln!(out, "STANDARD PIDs (Mode 01)");
        let _ = writeln!(out, "{}", thin);
        let _ = writeln!(out, "Total responding PIDs: {}", self.standard_pids.count);
        let _ = writeln!(out);
        for details in self.standard_pids.details.values() {
            let _ = writeln!(out, "{:.<40} {}", details.name, details.command);
            let _ = writeln!(out, "  Description: {}", details.description);
            let _ = writeln!(out, "  Last Value: {} {}", details.value, details.unit);
            let _ = writeln!(out);
        }

        if !self.manufacturer_modes.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "MANUFACTURER MODES");
            let _ = writeln!(out, "{}", thin);
            for (mode, hits) in &self.manufacturer_modes {
                let _ = writeln!(out, "Mode {}: {} responding", mode, hits.len());
                for hit in hits.values() {
                    let _ = writeln!(out, "  {} -> {}", hit.pid, hit.raw_response);
                }
            }
        }

        let incomplete: Vec<_> = self.sweeps.iter().filter(|s| !s.is_complete()).collect();
        if !incomplete.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "INCOMPLETE SWEEPS");
            let _ = writeln!(out, "{}", thin);
            for sweep in incomplete {
                let _ = writeln!(
                    out,
                    "{}: {}/{} probed ({:.0}%), {}",
                    sweep.sweep,
                    sweep.probed,
                    sweep.total,
                    sweep.percent_complete(),
                    sweep.interrupted.as_deref().unwrap_or("stopped early")
                );
            }
        }
        out
    }
}

/// Paths written by one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDiscovery {
    pub results: PathBuf,
    pub summary: PathBuf,
}

/// Writes discovery runs under a data directory
#[derive(Debug, Clone)]
pub struct DiscoveryStore {
    dir: PathBuf,
}

impl DiscoveryStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(DISCOVERY_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, record: &DiscoveryRecord) -> TelemetryResult<SavedDiscovery> {
        self.save_at(record, Local::now())
    }

    /// Save with an explicit timestamp for the file names
    pub fn save_at(
        &self,
        record: &DiscoveryRecord,
        at: DateTime<Local>,
    ) -> TelemetryResult<SavedDiscovery> {
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let results = DiscoveryResults::new(record, stamp.as_str());

        fs::create_dir_all(&self.dir).map_err(|e| persistence(&self.dir, e))?;

        let results_path = self.dir.join(format!("discovery_results_{}.json", stamp));
        let json = serde_json::to_string_pretty(&results)?;
        fs::write(&results_path, json).map_err(|e| persistence(&results_path, e))?;
        tracing::info!(path = %results_path.display(), "Results saved");

        let summary_path = self.dir.join(format!("discovery_summary_{}.txt", stamp));
        fs::write(&summary_path, results.render_summary())
            .map_err(|e| persistence(&summary_path, e))?;
        tracing::info!(path = %summary_path.display(), "Summary saved");

        Ok(SavedDiscovery {
            results: results_path,
            summary: summary_path,
        })
    }

    /// Read back a results file
    pub fn load(path: impl AsRef<Path>) -> TelemetryResult<DiscoveryResults> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| persistence(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn persistence(path: &Path, err: std::io::Error) -> TelemetryError {
    TelemetryError::Persistence(format!("{}: {}", path.display(), err))
}
