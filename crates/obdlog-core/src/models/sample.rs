//! Sample model: one row of readings captured in a single tick

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::{PidSpec, ReadingValue};

/// Fixed leading columns of every scenario file
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const ELAPSED_COLUMN: &str = "elapsed_time";

/// One channel's contribution to a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// PID name
    pub pid: String,
    /// `None` when the channel failed to answer this tick
    pub value: Option<ReadingValue>,
}

/// Readings from every monitored channel at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time the tick started
    pub captured_at: DateTime<Local>,
    /// Seconds since the scenario started
    pub elapsed_seconds: f64,
    /// One entry per monitored PID, in configuration order
    pub readings: Vec<ChannelReading>,
}

impl Sample {
    pub fn new(captured_at: DateTime<Local>, elapsed_seconds: f64) -> Self {
        Self {
            captured_at,
            elapsed_seconds,
            readings: Vec::new(),
        }
    }

    pub fn push(&mut self, pid: impl Into<String>, value: Option<ReadingValue>) {
        self.readings.push(ChannelReading {
            pid: pid.into(),
            value,
        });
    }

    /// Look up a reading by PID name
    pub fn get(&self, pid: &str) -> Option<&ReadingValue> {
        self.readings
            .iter()
            .find(|r| r.pid == pid)
            .and_then(|r| r.value.as_ref())
    }

    /// Number of channels that did not answer
    pub fn absent_count(&self) -> usize {
        self.readings.iter().filter(|r| r.value.is_none()).count()
    }

    /// Header row for a set of monitored PIDs
    pub fn header(pids: &[PidSpec]) -> Vec<String> {
        [TIMESTAMP_COLUMN, ELAPSED_COLUMN]
            .into_iter()
            .map(String::from)
            .chain(pids.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Row values aligned with [`Sample::header`]; absent readings are empty
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(self.readings.len() + 2);
        row.push(
            self.captured_at
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
        );
        row.push(format!("{:.3}", self.elapsed_seconds));
        row.extend(
            self.readings
                .iter()
                .map(|r| r.value.as_ref().map(|v| v.to_string()).unwrap_or_default()),
        );
        row
    }
}
