//! obdlog-discovery - PID and mode discovery
//!
//! Sweeps the standard PID space the ECU advertises and, optionally, raw
//! identifier ranges under manufacturer-specific modes. Every exchange goes
//! through a [`ProbeThrottle`] so the adapter never sees two queries closer
//! together than the configured probe delay.

pub mod config;
pub mod scanner;
pub mod store;
pub mod throttle;

pub use config::{DiscoveryConfig, IdRange};
pub use scanner::DiscoveryScanner;
pub use store::{DiscoveryResults, DiscoveryStore, SavedDiscovery};
pub use throttle::ProbeThrottle;
