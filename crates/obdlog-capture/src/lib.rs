//! obdlog-capture - timed telemetry capture
//!
//! Runs scenarios at a fixed sampling rate through a [`ConnectionManager`],
//! writing one row per tick to a [`SampleSink`] and keeping session counters.
//!
//! [`ConnectionManager`]: obdlog_link::ConnectionManager

pub mod config;
pub mod layout;
pub mod pids;
pub mod scheduler;
pub mod sink;
pub mod testing;

pub use config::CaptureConfig;
pub use layout::{SessionLayout, SessionMetadata};
pub use pids::configure_pids;
pub use scheduler::{AutoContinue, SamplingScheduler, SessionControl, SessionDecision};
pub use sink::{CsvSinkFactory, SampleSink, SinkFactory};
