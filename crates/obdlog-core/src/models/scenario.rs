//! Scenario model: a named, timed capture window

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Sample;

/// A scenario to run: identifier and target duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    /// Identifier, also the output file stem (e.g., "cold_start")
    pub id: String,
    /// Target duration in seconds
    pub duration_secs: f64,
}

impl ScenarioPlan {
    pub fn new(id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            duration_secs,
        }
    }

    /// Target duration; invalid (negative or non-finite) values collapse to zero
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }

    /// Title-cased display name ("cold_start" -> "Cold Start")
    pub fn title(&self) -> String {
        self.id
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The standard operating scenarios, in execution order
    pub fn default_plan() -> Vec<ScenarioPlan> {
        vec![
            ScenarioPlan::new("cold_start", 300.0),
            ScenarioPlan::new("idle", 120.0),
            ScenarioPlan::new("varying_rpm", 120.0),
            ScenarioPlan::new("hydraulics", 120.0),
            ScenarioPlan::new("pto", 30.0),
        ]
    }
}

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Target duration reached
    Succeeded,
    /// Transport exhausted or output could not be written; partial data kept
    Failed { reason: String },
    /// Stopped by the cancellation flag
    Cancelled,
}

impl ScenarioOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioOutcome::Succeeded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioOutcome::Succeeded => "succeeded",
            ScenarioOutcome::Failed { .. } => "failed",
            ScenarioOutcome::Cancelled => "cancelled",
        }
    }
}

/// A scenario run: its samples in time order, closed exactly once
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub target_duration: Duration,
    samples: Vec<Sample>,
    outcome: Option<ScenarioOutcome>,
}

impl Scenario {
    pub fn start(plan: &ScenarioPlan) -> Self {
        Self {
            id: plan.id.clone(),
            target_duration: plan.duration(),
            samples: Vec::new(),
            outcome: None,
        }
    }

    /// Append a sample. Rejected once closed or when it would go back in time.
    pub fn record(&mut self, sample: Sample) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        if let Some(last) = self.samples.last() {
            if sample.elapsed_seconds < last.elapsed_seconds {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    /// Close with an outcome. Returns false if already closed.
    pub fn close(&mut self, outcome: ScenarioOutcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn outcome(&self) -> Option<&ScenarioOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.outcome.is_some()
    }
}
