//! End-to-end tests for obdlog
//!
//! The tests drive the connection manager, sampling scheduler and discovery
//! scanner together against the simulated ECU, on paused tokio time so
//! timing assertions are exact.
//!
//! # Test Structure
//!
//! - `link_e2e_test.rs` - bounded reconnect behaviour
//! - `capture_e2e_test.rs` - scenario capture to CSV, link loss, cancellation
//! - `discovery_e2e_test.rs` - probe pacing and persisted results

use std::path::Path;
use std::sync::Arc;

use obdlog_core::{catalog, EventSink, PidSpec, RecordingEvents};
use obdlog_link::{ConnectionManager, LinkConfig, SimulatedConfig, SimulatedConnector, SimulationControls};

/// A connection manager wired to a simulated ECU, with its fault controls
/// and an event recorder
pub struct Rig {
    pub link: ConnectionManager,
    pub controls: Arc<SimulationControls>,
    pub events: Arc<RecordingEvents>,
}

impl Rig {
    /// Disconnected rig
    pub fn new(sim: SimulatedConfig, link: LinkConfig) -> Self {
        let connector = SimulatedConnector::new(sim);
        let controls = connector.controls();
        let events = Arc::new(RecordingEvents::new());
        let sink: Arc<dyn EventSink> = events.clone();
        Self {
            link: ConnectionManager::new(Arc::new(connector), link, sink),
            controls,
            events,
        }
    }

    /// Rig with the link already up
    pub async fn connected(sim: SimulatedConfig) -> Self {
        let mut rig = Self::new(sim, LinkConfig::default());
        if let Err(e) = rig.link.connect().await {
            panic!("simulated connect failed: {}", e);
        }
        rig
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }
}

/// Catalog PIDs by name
pub fn pids(names: &[&str]) -> Vec<PidSpec> {
    names.iter().filter_map(|n| catalog::lookup(n)).collect()
}

/// Read a scenario CSV written without quoted fields
pub fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => panic!("reading {}: {}", path.display(), e),
    };
    text.lines()
        .map(|line| line.split(',').map(String::from).collect())
        .collect()
}
