//! obdlog-core - Core types and traits for ECU telemetry logging
//!
//! This crate holds everything the connection manager, the sampling
//! scheduler and the discovery scanner share:
//!
//! - the data model (PIDs, samples, scenarios, sessions, discovery records)
//! - the transport collaborator traits ([`TransportConnector`], [`EcuChannel`])
//! - error kinds ([`TelemetryError`], [`TransportError`])
//! - the structured event sink used instead of process-wide logging
//! - the cooperative cancellation flag

pub mod cancel;
pub mod catalog;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;

pub use cancel::CancelFlag;
pub use error::{TelemetryError, TelemetryResult, TransportError};
pub use events::{EventSink, RecordingEvents, TelemetryEvent, TracingEvents};
pub use models::*;
pub use transport::{EcuChannel, ProtocolIdentity, TransportConnector};
