//! Fixed-rate sampling scheduler
//!
//! Each tick checks link health, reads every monitored channel once, and
//! writes one row. The next tick is scheduled from the scenario origin
//! (`start + (tick + 1) * interval`) so slow reads never accumulate drift.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use obdlog_core::{
    CancelFlag, EventSink, PidSpec, Reading, Sample, Scenario, ScenarioOutcome, ScenarioPlan,
    Session, SessionCounters, TelemetryError, TelemetryEvent,
};
use obdlog_link::{ConnectionManager, ConnectionState, Health};
use tokio::time::Instant;

use crate::config::CaptureConfig;
use crate::sink::{SampleSink, SinkFactory};

/// Caller's answer at the interactive boundaries of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    Continue,
    Abort,
}

/// Decides how a session proceeds between scenarios
pub trait SessionControl {
    /// Called before each scenario starts
    fn before_scenario(&mut self, _plan: &ScenarioPlan) -> SessionDecision {
        SessionDecision::Continue
    }

    /// Called after a scenario fails; `Abort` skips the remaining scenarios
    fn after_failure(&mut self, scenario: &Scenario) -> SessionDecision;
}

/// Runs every scenario and continues past failures
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoContinue;

impl SessionControl for AutoContinue {
    fn after_failure(&mut self, _scenario: &Scenario) -> SessionDecision {
        SessionDecision::Continue
    }
}

/// Captures scenarios through a borrowed connection manager
pub struct SamplingScheduler<'a> {
    link: &'a mut ConnectionManager,
    pids: Vec<PidSpec>,
    config: CaptureConfig,
    events: Arc<dyn EventSink>,
    cancel: CancelFlag,
}

impl<'a> SamplingScheduler<'a> {
    pub fn new(
        link: &'a mut ConnectionManager,
        pids: Vec<PidSpec>,
        config: CaptureConfig,
        events: Arc<dyn EventSink>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            link,
            pids,
            config,
            events,
            cancel,
        }
    }

    pub fn pids(&self) -> &[PidSpec] {
        &self.pids
    }

    pub fn link(&self) -> &ConnectionManager {
        &*self.link
    }

    /// Capture one scenario into a fresh sink.
    ///
    /// Always returns the closed scenario. Transport exhaustion and output
    /// errors end it as failed; rows already written stay written.
    pub async fn capture_scenario(
        &mut self,
        plan: &ScenarioPlan,
        sinks: &dyn SinkFactory,
        counters: &mut SessionCounters,
    ) -> Scenario {
        let mut scenario = Scenario::start(plan);

        let mut sink = match self.open_sink(&plan.id, sinks) {
            Ok(sink) => sink,
            Err(reason) => {
                self.finish(&mut scenario, ScenarioOutcome::Failed { reason });
                return scenario;
            }
        };

        self.events.emit(TelemetryEvent::ScenarioStarted {
            scenario: plan.id.clone(),
            duration: scenario.target_duration,
            rate_hz: self.config.sampling_rate_hz,
        });

        let outcome = self
            .run_ticks(&mut scenario, sink.as_mut(), counters)
            .await;

        let outcome = match sink.close() {
            Err(e) if outcome.is_success() => ScenarioOutcome::Failed {
                reason: format!("closing output failed: {}", e),
            },
            Err(e) => {
                self.events.emit(TelemetryEvent::SinkCloseFailed {
                    scenario: plan.id.clone(),
                    reason: e.to_string(),
                });
                outcome
            }
            Ok(()) => outcome,
        };
        self.finish(&mut scenario, outcome);
        scenario
    }

    fn open_sink(
        &self,
        scenario_id: &str,
        sinks: &dyn SinkFactory,
    ) -> Result<Box<dyn SampleSink>, String> {
        let mut sink = sinks
            .open(scenario_id)
            .map_err(|e| format!("opening output failed: {}", e))?;
        if let Err(e) = sink.write_header(&Sample::header(&self.pids)) {
            // Release the handle before reporting
            if let Err(close) = sink.close() {
                self.events.emit(TelemetryEvent::SinkCloseFailed {
                    scenario: scenario_id.to_string(),
                    reason: close.to_string(),
                });
            }
            return Err(format!("writing header failed: {}", e));
        }
        Ok(sink)
    }

    async fn run_ticks(
        &mut self,
        scenario: &mut Scenario,
        sink: &mut dyn SampleSink,
        counters: &mut SessionCounters,
    ) -> ScenarioOutcome {
        let interval = self.config.sampling_interval();
        let target = scenario.target_duration;
        let start = Instant::now();
        let mut tick: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return ScenarioOutcome::Cancelled;
            }
            let elapsed = start.elapsed();
            if elapsed >= target {
                return ScenarioOutcome::Succeeded;
            }

            if self.link.health_check().await == Health::Unhealthy {
                // A fatal link refuses to reconnect; nothing is attempted
                if self.link.state() == ConnectionState::Fatal {
                    return ScenarioOutcome::Failed {
                        reason: TelemetryError::LinkFatal.to_string(),
                    };
                }
                counters.reconnection_count += 1;
                let attempts = self.config.recovery_attempts;
                let delay = self.config.recovery_delay();
                if let Err(e) = self.link.reconnect(attempts, delay).await {
                    return ScenarioOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }

            let sample = self.collect_sample(&scenario.id, elapsed, counters).await;
            if let Err(e) = sink.write_row(&sample.to_row()) {
                return ScenarioOutcome::Failed {
                    reason: format!("writing row failed: {}", e),
                };
            }
            scenario.record(sample);
            counters.total_samples += 1;
            self.report_progress(scenario, elapsed);

            tick += 1;
            tokio::time::sleep_until(start + interval * tick).await;
        }
    }

    /// One read per channel; failures become empty cells for that channel only
    async fn collect_sample(
        &mut self,
        scenario_id: &str,
        elapsed: Duration,
        counters: &mut SessionCounters,
    ) -> Sample {
        let mut sample = Sample::new(Local::now(), elapsed.as_secs_f64());
        for pid in &self.pids {
            match self.link.read(&pid.command).await {
                Reading::Value { value, .. } => sample.push(&pid.name, Some(value)),
                Reading::Absent(reason) => {
                    counters.failed_reads += 1;
                    self.events.emit(TelemetryEvent::ChannelReadFailed {
                        scenario: scenario_id.to_string(),
                        pid: pid.name.clone(),
                        reason: reason.to_string(),
                    });
                    sample.push(&pid.name, None);
                }
            }
        }
        sample
    }

    fn report_progress(&self, scenario: &Scenario, elapsed: Duration) {
        let every = self.config.progress_every;
        let samples = scenario.samples().len() as u64;
        if every == 0 || samples % every != 0 {
            return;
        }
        let target = scenario.target_duration.as_secs_f64();
        let elapsed = elapsed.as_secs_f64();
        let percent = if target > 0.0 {
            (elapsed / target * 100.0).min(100.0)
        } else {
            100.0
        };
        self.events.emit(TelemetryEvent::CaptureProgress {
            scenario: scenario.id.clone(),
            samples,
            percent,
            remaining_secs: (target - elapsed).max(0.0) as u64,
        });
    }

    fn finish(&self, scenario: &mut Scenario, outcome: ScenarioOutcome) {
        self.events.emit(TelemetryEvent::ScenarioFinished {
            scenario: scenario.id.clone(),
            samples: scenario.samples().len() as u64,
            outcome: outcome.label().to_string(),
        });
        if let ScenarioOutcome::Failed { reason } = &outcome {
            self.events.emit(TelemetryEvent::ScenarioFailed {
                scenario: scenario.id.clone(),
                reason: reason.clone(),
            });
        }
        scenario.close(outcome);
    }

    /// Run scenarios in order and finalize the session.
    ///
    /// Stops early on cancellation, when `control` aborts before a scenario,
    /// or when it aborts after a failure. The session is finalized however
    /// many scenarios completed.
    pub async fn run_session(
        &mut self,
        plans: &[ScenarioPlan],
        sinks: &dyn SinkFactory,
        session: &mut Session,
        control: &mut dyn SessionControl,
    ) -> Vec<Scenario> {
        let mut scenarios = Vec::with_capacity(plans.len());

        for plan in plans {
            if self.cancel.is_cancelled() {
                self.events.emit(TelemetryEvent::SessionCancelled {
                    completed: session.completed_scenarios.len(),
                });
                break;
            }
            if control.before_scenario(plan) == SessionDecision::Abort {
                self.events.emit(TelemetryEvent::ScenarioDeclined {
                    scenario: plan.id.clone(),
                });
                break;
            }

            let scenario = self
                .capture_scenario(plan, sinks, &mut session.counters)
                .await;

            let stop = match scenario.outcome() {
                Some(ScenarioOutcome::Succeeded) => {
                    session.record_completed(&scenario.id);
                    false
                }
                Some(ScenarioOutcome::Cancelled) => true,
                _ => control.after_failure(&scenario) == SessionDecision::Abort,
            };
            scenarios.push(scenario);
            if stop {
                break;
            }
        }

        session.finalize();
        self.events.emit(TelemetryEvent::SessionFinished {
            session: session.id.clone(),
            completed: session.completed_scenarios.len(),
            planned: plans.len(),
        });
        scenarios
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySinkFactory;
    use obdlog_core::{catalog, RecordingEvents};
    use obdlog_link::{LinkConfig, SimulatedConfig, SimulatedConnector, SimulationControls};

    struct Rig {
        link: ConnectionManager,
        controls: Arc<SimulationControls>,
        events: Arc<RecordingEvents>,
    }

    async fn rig(sim: SimulatedConfig) -> Rig {
        let connector = SimulatedConnector::new(sim);
        let controls = connector.controls();
        let events = Arc::new(RecordingEvents::new());
        let mut link =
            ConnectionManager::new(Arc::new(connector), LinkConfig::default(), events.clone());
        link.connect().await.unwrap();
        Rig {
            link,
            controls,
            events,
        }
    }

    fn pids(names: &[&str]) -> Vec<PidSpec> {
        names.iter().filter_map(|n| catalog::lookup(n)).collect()
    }

    fn config(rate: f64) -> CaptureConfig {
        CaptureConfig {
            sampling_rate_hz: rate,
            recovery_attempts: 2,
            recovery_delay_ms: 500,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_follow_header_and_time() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM", "SPEED"]),
            config(2.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 3.0), &sinks, &mut counters)
            .await;

        assert_eq!(scenario.outcome(), Some(&ScenarioOutcome::Succeeded));
        let output = sinks.output("idle").unwrap();
        assert_eq!(output.header, vec!["timestamp", "elapsed_time", "RPM", "SPEED"]);
        assert_eq!(output.rows.len(), 6);
        assert_eq!(output.closes, 1);
        let elapsed: Vec<_> = output.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            elapsed,
            vec!["0.000", "0.500", "1.000", "1.500", "2.000", "2.500"]
        );
        assert_eq!(counters.total_samples, 6);
        assert_eq!(counters.failed_reads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reads_do_not_drift() {
        // Four exchanges per tick at 150 ms each eat 600 ms of a 1 s interval
        let sim = SimulatedConfig {
            latency_ms: 150,
            ..Default::default()
        };
        let mut rig = rig(sim).await;
        let sinks = MemorySinkFactory::new();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM", "SPEED", "COOLANT_TEMP"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 10.0), &sinks, &mut counters)
            .await;

        assert_eq!(scenario.samples().len(), 10);
        let last = scenario.samples().last().unwrap();
        assert!((last.elapsed_seconds - 9.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_is_recovered() {
        let mut rig = rig(SimulatedConfig::default()).await;
        rig.controls.drop_link_after_status_checks(2);
        let controls = rig.controls.clone();
        let sinks = MemorySinkFactory::new();
        let mut counters = SessionCounters::default();

        // Restore the adapter while the scheduler waits between attempts
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_200)).await;
            controls.restore_link();
        });

        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );
        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 5.0), &sinks, &mut counters)
            .await;

        assert!(scenario.outcome().unwrap().is_success());
        assert_eq!(counters.reconnection_count, 1);
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::ReconnectSucceeded { attempt: 2 })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reads_are_counted_per_channel() {
        let mut rig = rig(SimulatedConfig::default()).await;
        rig.controls.set_null("SPEED");
        let sinks = MemorySinkFactory::new();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM", "SPEED"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 4.0), &sinks, &mut counters)
            .await;

        assert_eq!(counters.total_samples, 4);
        assert_eq!(counters.failed_reads, 4);
        assert_eq!(counters.success_rate(), Some(0.0));
        assert!(sinks.rows("idle").iter().all(|r| r[3].is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_every_n_samples() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        let mut counters = SessionCounters::default();
        let config = CaptureConfig {
            progress_every: 4,
            ..config(2.0)
        };
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config,
            rig.events.clone(),
            CancelFlag::new(),
        );

        scheduler
            .capture_scenario(&ScenarioPlan::new("pto", 5.0), &sinks, &mut counters)
            .await;

        let progress: Vec<_> = rig
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::CaptureProgress {
                    samples,
                    remaining_secs,
                    ..
                } => Some((samples, remaining_secs)),
                _ => None,
            })
            .collect();
        // Samples 4 and 8 start at 1.5 s and 3.5 s
        assert_eq!(progress, vec![(4, 3), (8, 1)]);
    }

    #[tokio::test]
    async fn test_sink_open_failure_fails_scenario() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        sinks.fail_open();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 5.0), &sinks, &mut counters)
            .await;

        assert!(matches!(
            scenario.outcome(),
            Some(ScenarioOutcome::Failed { .. })
        ));
        assert!(scenario.samples().is_empty());
        assert_eq!(counters.total_samples, 0);
    }

    struct AbortOnFailure {
        failures: usize,
    }

    impl SessionControl for AbortOnFailure {
        fn after_failure(&mut self, _scenario: &Scenario) -> SessionDecision {
            self.failures += 1;
            SessionDecision::Abort
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_abort_after_failure() {
        let mut rig = rig(SimulatedConfig::default()).await;
        rig.controls.drop_link_after_status_checks(3);
        let sinks = MemorySinkFactory::new();
        let mut session = Session::start();
        let mut control = AbortOnFailure { failures: 0 };
        let plans = vec![
            ScenarioPlan::new("cold_start", 2.0),
            ScenarioPlan::new("idle", 5.0),
            ScenarioPlan::new("pto", 2.0),
        ];
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenarios = scheduler
            .run_session(&plans, &sinks, &mut session, &mut control)
            .await;

        assert_eq!(scenarios.len(), 2);
        assert_eq!(control.failures, 1);
        assert_eq!(session.completed_scenarios, vec!["cold_start"]);
        assert_eq!(sinks.rows("idle").len(), 1);
        assert!(sinks.output("pto").is_none());
        assert!(session.is_finalized());
        assert_eq!(session.counters.total_samples, 3);
        assert_eq!(session.counters.reconnection_count, 1);
        assert_eq!(
            rig.events.count(|e| matches!(
                e,
                TelemetryEvent::SessionFinished {
                    completed: 1,
                    planned: 3,
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_continues_past_failure() {
        let mut rig = rig(SimulatedConfig::default()).await;
        rig.controls.drop_link_after_status_checks(0);
        let sinks = MemorySinkFactory::new();
        let mut session = Session::start();
        let plans = vec![
            ScenarioPlan::new("idle", 2.0),
            ScenarioPlan::new("pto", 2.0),
        ];
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenarios = scheduler
            .run_session(&plans, &sinks, &mut session, &mut AutoContinue)
            .await;

        // The link is fatal after the first scenario, so the second fails at once
        assert_eq!(scenarios.len(), 2);
        assert!(scenarios.iter().all(|s| !s.outcome().unwrap().is_success()));
        assert!(session.completed_scenarios.is_empty());
        assert_eq!(sinks.closes("idle"), 1);
        assert_eq!(sinks.closes("pto"), 1);

        // Only the first scenario actually tried to reconnect
        assert_eq!(session.counters.reconnection_count, 1);
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::ReconnectStarted { .. })),
            1
        );
        assert_eq!(
            scenarios[1].outcome(),
            Some(&ScenarioOutcome::Failed {
                reason: TelemetryError::LinkFatal.to_string()
            })
        );
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::ScenarioFailed { .. })),
            2
        );
    }

    #[tokio::test]
    async fn test_header_failure_reports_close_error() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        sinks.fail_header();
        sinks.fail_close();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 5.0), &sinks, &mut counters)
            .await;

        let Some(ScenarioOutcome::Failed { reason }) = scenario.outcome() else {
            panic!("expected failure, got {:?}", scenario.outcome());
        };
        assert!(reason.starts_with("writing header failed"));
        assert_eq!(sinks.closes("idle"), 1);
        assert_eq!(
            rig.events.count(|e| matches!(
                e,
                TelemetryEvent::SinkCloseFailed { scenario, reason }
                    if scenario == "idle" && reason == "device busy"
            )),
            1
        );
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::ScenarioFailed { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_after_failure_is_reported() {
        let mut rig = rig(SimulatedConfig::default()).await;
        rig.controls.drop_link_after_status_checks(1);
        let sinks = MemorySinkFactory::new();
        sinks.fail_close();
        let mut counters = SessionCounters::default();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenario = scheduler
            .capture_scenario(&ScenarioPlan::new("idle", 5.0), &sinks, &mut counters)
            .await;

        // The transport failure stays the reported reason
        let Some(ScenarioOutcome::Failed { reason }) = scenario.outcome() else {
            panic!("expected failure, got {:?}", scenario.outcome());
        };
        assert!(reason.contains("Reconnect exhausted"));
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::SinkCloseFailed { .. })),
            1
        );
    }

    struct Decline;

    impl SessionControl for Decline {
        fn before_scenario(&mut self, _plan: &ScenarioPlan) -> SessionDecision {
            SessionDecision::Abort
        }

        fn after_failure(&mut self, _scenario: &Scenario) -> SessionDecision {
            SessionDecision::Continue
        }
    }

    #[tokio::test]
    async fn test_declined_scenario_ends_session() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        let mut session = Session::start();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            CancelFlag::new(),
        );

        let scenarios = scheduler
            .run_session(
                &ScenarioPlan::default_plan(),
                &sinks,
                &mut session,
                &mut Decline,
            )
            .await;

        assert!(scenarios.is_empty());
        assert!(sinks.output("cold_start").is_none());
        assert_eq!(
            rig.events.count(|e| matches!(
                e,
                TelemetryEvent::ScenarioDeclined { scenario } if scenario == "cold_start"
            )),
            1
        );
    }

    #[tokio::test]
    async fn test_cancelled_session_runs_nothing() {
        let mut rig = rig(SimulatedConfig::default()).await;
        let sinks = MemorySinkFactory::new();
        let mut session = Session::start();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut scheduler = SamplingScheduler::new(
            &mut rig.link,
            pids(&["RPM"]),
            config(1.0),
            rig.events.clone(),
            cancel,
        );

        let scenarios = scheduler
            .run_session(
                &ScenarioPlan::default_plan(),
                &sinks,
                &mut session,
                &mut AutoContinue,
            )
            .await;

        assert!(scenarios.is_empty());
        assert!(session.is_finalized());
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::SessionCancelled { completed: 0 })),
            1
        );
    }
}
