//! Session directory layout and metadata
//!
//! ```text
//! <data_dir>/sessions/<session_id>/
//!     cold_start.csv
//!     idle.csv
//!     ...
//!     session_metadata.json
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use obdlog_core::{
    PidSpec, ProtocolIdentity, ScenarioPlan, Session, SessionCounters, TelemetryError,
    TelemetryResult,
};
use serde::{Deserialize, Serialize};

use crate::sink::CsvSinkFactory;

pub const SESSIONS_DIR: &str = "sessions";
pub const METADATA_FILE: &str = "session_metadata.json";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const UNKNOWN: &str = "Unknown";

/// Where one session's files live
#[derive(Debug, Clone)]
pub struct SessionLayout {
    session_dir: PathBuf,
}

impl SessionLayout {
    pub fn new(data_dir: impl AsRef<Path>, session: &Session) -> Self {
        Self {
            session_dir: data_dir.as_ref().join(SESSIONS_DIR).join(&session.id),
        }
    }

    /// Create the session directory and its parents
    pub fn create(&self) -> TelemetryResult<()> {
        fs::create_dir_all(&self.session_dir)?;
        Ok(())
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Sink factory writing one CSV per scenario into the session directory
    pub fn sinks(&self) -> CsvSinkFactory {
        CsvSinkFactory::new(&self.session_dir)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.session_dir.join(METADATA_FILE)
    }

    pub fn write_metadata(&self, metadata: &SessionMetadata) -> TelemetryResult<PathBuf> {
        let path = self.metadata_path();
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(&path, json).map_err(|e| {
            TelemetryError::Persistence(format!("{}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Session metadata saved");
        Ok(path)
    }
}

/// Adapter identity as recorded with a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcuInfo {
    pub protocol: String,
    pub port: String,
}

/// Contents of `session_metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub sampling_rate_hz: f64,
    pub monitored_pids: Vec<String>,
    pub completed_scenarios: Vec<String>,
    pub statistics: SessionCounters,
    pub ecu_info: EcuInfo,
}

impl SessionMetadata {
    /// `identity` is `None` when the link was down at the end of the session
    pub fn new(
        session: &Session,
        sampling_rate_hz: f64,
        pids: &[PidSpec],
        identity: Option<&ProtocolIdentity>,
    ) -> Self {
        let end = session.ended_at.unwrap_or_else(chrono::Local::now);
        Self {
            session_id: session.id.clone(),
            start_time: session.started_at.format(TIMESTAMP_FORMAT).to_string(),
            end_time: end.format(TIMESTAMP_FORMAT).to_string(),
            sampling_rate_hz,
            monitored_pids: pids.iter().map(|p| p.name.clone()).collect(),
            completed_scenarios: session.completed_scenarios.clone(),
            statistics: session.counters,
            ecu_info: match identity {
                Some(identity) => EcuInfo {
                    protocol: identity.name.clone(),
                    port: identity.port.clone(),
                },
                None => EcuInfo {
                    protocol: UNKNOWN.to_string(),
                    port: UNKNOWN.to_string(),
                },
            },
        }
    }
}

/// Human-readable end-of-session report
pub fn render_summary(session: &Session, planned: usize, session_dir: &Path) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);
    let counters = &session.counters;

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "SESSION SUMMARY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Session ID: {}", session.id);
    let _ = writeln!(
        out,
        "Completed scenarios: {}/{}",
        session.completed_scenarios.len(),
        planned
    );
    for id in &session.completed_scenarios {
        let _ = writeln!(out, "  ✓ {}", ScenarioPlan::new(id.as_str(), 0.0).title());
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Total samples collected: {}", counters.total_samples);
    let _ = writeln!(out, "Failed sample reads: {}", counters.failed_reads);
    let _ = writeln!(out, "Connection reconnections: {}", counters.reconnection_count);
    if let Some(rate) = counters.success_rate() {
        let _ = writeln!(out, "Sample success rate: {:.1}%", rate);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Data saved to: {}", session_dir.display());
    let _ = writeln!(out, "{}", rule);
    out
}
