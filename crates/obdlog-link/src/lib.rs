//! obdlog-link - ECU connection lifecycle
//!
//! Owns the single transport channel of the process and heals it with
//! bounded retries.
//!
//! ```text
//!              connect                 health check fails
//! Disconnected ───────▶ Connected ──────────────────────▶ Unhealthy
//!      ▲                  ▲   │                             │
//!      │    disconnect    │   └──── health check passes ◀───┤
//!      └──────────────────┼─────────────────────────────────┤
//!                         │  reconnect succeeds             │ reconnect exhausted
//!                         └─────────────────────────────────┴──────────▶ Fatal
//! ```

pub mod config;
pub mod manager;
pub mod mock;

pub use config::{LinkConfig, SimulatedConfig, TransportConfig};
pub use manager::{ConnectionManager, ConnectionState, Health};
pub use mock::{SimulatedConnector, SimulationControls};

use std::sync::Arc;

use obdlog_core::TransportConnector;

/// Create a transport connector based on configuration
pub fn create_connector(config: &TransportConfig) -> Arc<dyn TransportConnector> {
    match config {
        TransportConfig::Simulated(cfg) => Arc::new(SimulatedConnector::new(cfg.clone())),
    }
}
