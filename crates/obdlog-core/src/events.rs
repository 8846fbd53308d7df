//! Structured telemetry events
//!
//! The connection manager, scheduler and scanner report what they do through
//! an injected [`EventSink`] rather than logging directly. [`TracingEvents`]
//! forwards events to `tracing`; [`RecordingEvents`] keeps them for tests.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Something observable happened in the link, capture or discovery path
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    // Link
    Connecting {
        port: Option<String>,
    },
    Connected {
        port: String,
        protocol: String,
        supported_commands: usize,
    },
    ConnectFailed {
        reason: String,
    },
    Disconnected,
    DisconnectFailed {
        reason: String,
    },
    HealthCheckFailed {
        reason: String,
    },
    ReconnectStarted {
        max_attempts: u32,
    },
    ReconnectAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    ReconnectWaiting {
        delay: Duration,
    },
    ReconnectSucceeded {
        attempt: u32,
    },
    ReconnectExhausted {
        attempts: u32,
        elapsed: Duration,
    },

    // Capture
    PidConfigured {
        name: String,
    },
    PidUnknown {
        name: String,
    },
    ScenarioStarted {
        scenario: String,
        duration: Duration,
        rate_hz: f64,
    },
    ChannelReadFailed {
        scenario: String,
        pid: String,
        reason: String,
    },
    CaptureProgress {
        scenario: String,
        samples: u64,
        percent: f64,
        remaining_secs: u64,
    },
    ScenarioFinished {
        scenario: String,
        samples: u64,
        outcome: String,
    },
    ScenarioFailed {
        scenario: String,
        reason: String,
    },
    SinkCloseFailed {
        scenario: String,
        reason: String,
    },
    ScenarioDeclined {
        scenario: String,
    },
    SessionCancelled {
        completed: usize,
    },
    SessionFinished {
        session: String,
        completed: usize,
        planned: usize,
    },

    // Discovery
    ProtocolDetected {
        name: String,
        id: String,
        port: String,
        ecus: usize,
        supported_commands: usize,
    },
    SweepStarted {
        sweep: String,
        total: usize,
    },
    ProbeResponded {
        code: String,
        name: String,
        value: String,
    },
    ProbeSilent {
        code: String,
    },
    ProbeFailed {
        code: String,
        reason: String,
    },
    ManufacturerModeResponded {
        mode: String,
        responding: usize,
    },
    SweepFinished {
        sweep: String,
        responding: usize,
        probed: usize,
        total: usize,
        interrupted: Option<String>,
    },
}

/// Receives telemetry events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Connecting { port } => match port {
                Some(port) => info!(%port, "Connecting to ECU"),
                None => info!("Auto-detecting OBD adapter"),
            },
            TelemetryEvent::Connected {
                port,
                protocol,
                supported_commands,
            } => info!(%port, %protocol, supported_commands, "Connected to ECU"),
            TelemetryEvent::ConnectFailed { reason } => {
                error!(%reason, "Failed to establish connection")
            }
            TelemetryEvent::Disconnected => info!("Disconnected from ECU"),
            TelemetryEvent::DisconnectFailed { reason } => {
                error!(%reason, "Error during disconnection")
            }
            TelemetryEvent::HealthCheckFailed { reason } => {
                warn!(%reason, "Connection check failed")
            }
            TelemetryEvent::ReconnectStarted { max_attempts } => {
                warn!(max_attempts, "Attempting to reconnect")
            }
            TelemetryEvent::ReconnectAttempt {
                attempt,
                max_attempts,
            } => info!("Reconnection attempt {}/{}", attempt, max_attempts),
            TelemetryEvent::ReconnectWaiting { delay } => {
                info!(delay_ms = delay.as_millis() as u64, "Waiting before next attempt")
            }
            TelemetryEvent::ReconnectSucceeded { attempt } => {
                info!(attempt, "Reconnection successful")
            }
            TelemetryEvent::ReconnectExhausted { attempts, elapsed } => error!(
                attempts,
                elapsed_secs = elapsed.as_secs_f64(),
                "All reconnection attempts failed"
            ),
            TelemetryEvent::PidConfigured { name } => info!(pid = %name, "Added PID"),
            TelemetryEvent::PidUnknown { name } => warn!(pid = %name, "Unknown PID"),
            TelemetryEvent::ScenarioStarted {
                scenario,
                duration,
                rate_hz,
            } => info!(
                %scenario,
                duration_secs = duration.as_secs_f64(),
                rate_hz,
                "Starting capture"
            ),
            TelemetryEvent::ChannelReadFailed {
                scenario,
                pid,
                reason,
            } => debug!(%scenario, %pid, %reason, "Channel read failed"),
            TelemetryEvent::CaptureProgress {
                scenario,
                samples,
                percent,
                remaining_secs,
            } => info!(
                %scenario,
                samples,
                remaining_secs,
                "Progress: {:.1}%",
                percent
            ),
            TelemetryEvent::ScenarioFinished {
                scenario,
                samples,
                outcome,
            } => {
                if outcome == "succeeded" {
                    info!(%scenario, samples, "Scenario complete")
                } else {
                    warn!(%scenario, samples, %outcome, "Scenario ended early")
                }
            }
            TelemetryEvent::ScenarioFailed { scenario, reason } => {
                error!(%scenario, %reason, "Scenario failed")
            }
            TelemetryEvent::SinkCloseFailed { scenario, reason } => {
                error!(%scenario, %reason, "Closing output failed")
            }
            TelemetryEvent::ScenarioDeclined { scenario } => {
                warn!(%scenario, "Scenario declined, ending session")
            }
            TelemetryEvent::SessionCancelled { completed } => {
                warn!(completed, "Session stopped by emergency stop")
            }
            TelemetryEvent::SessionFinished {
                session,
                completed,
                planned,
            } => info!(%session, "Completed scenarios: {}/{}", completed, planned),
            TelemetryEvent::ProtocolDetected {
                name,
                id,
                port,
                ecus,
                supported_commands,
            } => info!(
                protocol = %name,
                protocol_id = %id,
                %port,
                ecus,
                supported_commands,
                "Protocol detected"
            ),
            TelemetryEvent::SweepStarted { sweep, total } => {
                info!(%sweep, total, "Starting sweep")
            }
            TelemetryEvent::ProbeResponded { code, name, value } => {
                info!(%code, %name, %value, "PID responded")
            }
            TelemetryEvent::ProbeSilent { code } => debug!(%code, "No response"),
            TelemetryEvent::ProbeFailed { code, reason } => {
                debug!(%code, %reason, "Probe failed, checking link")
            }
            TelemetryEvent::ManufacturerModeResponded { mode, responding } => {
                info!(%mode, responding, "Manufacturer mode responded")
            }
            TelemetryEvent::SweepFinished {
                sweep,
                responding,
                probed,
                total,
                interrupted,
            } => match interrupted {
                None => info!(%sweep, responding, probed, total, "Sweep complete"),
                Some(reason) => warn!(
                    %sweep,
                    responding,
                    probed,
                    total,
                    %reason,
                    "Sweep interrupted"
                ),
            },
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events received so far
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Count events matching a predicate
    pub fn count(&self, predicate: impl Fn(&TelemetryEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
