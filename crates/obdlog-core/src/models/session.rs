//! Capture session model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Aggregate counters for a capture session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Ticks captured across all scenarios
    pub total_samples: u64,
    /// Channel reads that produced no value
    #[serde(rename = "failed_samples")]
    pub failed_reads: u64,
    /// Times the link was found unhealthy and a reconnect was run
    #[serde(rename = "reconnections")]
    pub reconnection_count: u64,
}

impl SessionCounters {
    /// Percentage of samples not offset by a failed read
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_samples == 0 {
            return None;
        }
        let good = self.total_samples as f64 - self.failed_reads as f64;
        Some(good / self.total_samples as f64 * 100.0)
    }
}

/// A capture session spanning one or more scenarios
#[derive(Debug, Clone)]
pub struct Session {
    /// Derived from the start time (`%Y%m%d_%H%M%S`)
    pub id: String,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    /// Scenario ids that ran to their target duration, in order
    pub completed_scenarios: Vec<String>,
    pub counters: SessionCounters,
}

impl Session {
    pub fn start() -> Self {
        Self::started_at(Local::now())
    }

    pub fn started_at(started_at: DateTime<Local>) -> Self {
        Self {
            id: started_at.format("%Y%m%d_%H%M%S").to_string(),
            started_at,
            ended_at: None,
            completed_scenarios: Vec::new(),
            counters: SessionCounters::default(),
        }
    }

    pub fn record_completed(&mut self, scenario_id: impl Into<String>) {
        self.completed_scenarios.push(scenario_id.into());
    }

    /// Stamp the end time. Only the first call has an effect.
    pub fn finalize(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Local::now());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}
