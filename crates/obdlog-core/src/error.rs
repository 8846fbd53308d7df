//! Error types shared across the obdlog crates

use std::time::Duration;

use thiserror::Error;

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Failures reported by the transport collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced by the connection manager, scheduler and scanner.
///
/// Failed health checks, channel reads and probes are recovered where they
/// happen: they come back as health verdicts or absent readings and
/// are reported as events, never as errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Opening the transport failed or the channel did not report itself live
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Bounded reconnection attempts were exhausted; the link is fatal
    #[error("Reconnect exhausted after {attempts} attempt(s) in {:.1}s", .elapsed.as_secs_f64())]
    ReconnectExhausted { attempts: u32, elapsed: Duration },

    /// The connection manager is fatal and refuses further link operations
    #[error("Link is fatal; create a new connection manager")]
    LinkFatal,

    /// Writing sample output failed
    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),

    /// Persisting metadata or discovery results failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TelemetryError {
    /// Whether this error ends the current scenario or scan
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            TelemetryError::ReconnectExhausted { .. } | TelemetryError::LinkFatal
        )
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Persistence(err.to_string())
    }
}
