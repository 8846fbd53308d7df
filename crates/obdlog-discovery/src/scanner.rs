//! Discovery scanner

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use obdlog_core::{
    CancelFlag, CommandSpec, CustomPidResponse, DiscoveredPid, DiscoveryRecord, EventSink,
    ProtocolSnapshot, Reading, ReadingValue, SweepReport, TelemetryError, TelemetryEvent,
    TelemetryResult,
};
use obdlog_link::{ConnectionManager, ConnectionState, Health};

use crate::config::DiscoveryConfig;
use crate::store::{DiscoveryStore, SavedDiscovery};
use crate::throttle::ProbeThrottle;

const STANDARD_SWEEP: &str = "standard";

/// A probe that produced a non-empty value
struct Hit {
    command: CommandSpec,
    value: ReadingValue,
    unit: Option<String>,
}

/// Sweeps identifier spaces through a borrowed connection manager,
/// accumulating a [`DiscoveryRecord`]
pub struct DiscoveryScanner<'a> {
    link: &'a mut ConnectionManager,
    config: DiscoveryConfig,
    events: Arc<dyn EventSink>,
    cancel: CancelFlag,
    throttle: ProbeThrottle,
    record: DiscoveryRecord,
}

impl<'a> DiscoveryScanner<'a> {
    pub fn new(
        link: &'a mut ConnectionManager,
        config: DiscoveryConfig,
        events: Arc<dyn EventSink>,
        cancel: CancelFlag,
    ) -> Self {
        let throttle = ProbeThrottle::new(config.standard_probe_delay());
        Self {
            link,
            config,
            events,
            cancel,
            throttle,
            record: DiscoveryRecord::new(),
        }
    }

    pub fn record(&self) -> &DiscoveryRecord {
        &self.record
    }

    pub fn into_record(self) -> DiscoveryRecord {
        self.record
    }

    /// Snapshot the transport identity into the record
    pub fn detect_protocol(&mut self) -> TelemetryResult<ProtocolSnapshot> {
        let identity = match (self.link.is_connected(), self.link.identity()) {
            (true, Some(identity)) => identity.clone(),
            _ => {
                return Err(TelemetryError::TransportUnavailable(
                    "ECU not connected".to_string(),
                ))
            }
        };

        let snapshot = ProtocolSnapshot {
            timestamp: Local::now(),
            protocol_name: identity.name,
            protocol_id: identity.id,
            port: identity.port,
            ecus: identity.ecu_count,
            supported_commands_count: self.link.supported_commands().len(),
        };
        self.events.emit(TelemetryEvent::ProtocolDetected {
            name: snapshot.protocol_name.clone(),
            id: snapshot.protocol_id.clone(),
            port: snapshot.port.clone(),
            ecus: snapshot.ecus,
            supported_commands: snapshot.supported_commands_count,
        });
        self.record.set_protocol(snapshot.clone());
        Ok(snapshot)
    }

    /// Query every command the ECU advertises and record those that answer
    pub async fn scan_standard_pids(&mut self) -> SweepReport {
        let commands = self.link.supported_commands();
        let (report, hits) = if commands.is_empty() && !self.link.is_connected() {
            let mut report = SweepReport::new(STANDARD_SWEEP, 0);
            report.interrupted = Some("ECU not connected".to_string());
            self.finish_sweep(&report);
            (report, Vec::new())
        } else {
            let delay = self.config.standard_probe_delay();
            self.sweep(STANDARD_SWEEP.to_string(), commands, delay).await
        };

        for hit in hits {
            self.record.record_standard(DiscoveredPid {
                name: hit.command.name.clone(),
                command: hit.command.code(),
                description: hit.command.description.clone(),
                mode: format!("{:02X}", hit.command.mode),
                pid: format!("{:02X}", hit.command.pid),
                value: hit.value.to_string(),
                unit: hit.unit.unwrap_or_default(),
            });
        }
        report
    }

    /// Raw-probe every identifier in `ids` under `mode`.
    ///
    /// Any non-empty answer counts as responding; the payload is not checked
    /// against the identifier that was asked for.
    pub async fn scan_custom_pids(
        &mut self,
        mode: u8,
        ids: RangeInclusive<u8>,
    ) -> BTreeMap<String, CustomPidResponse> {
        let commands = ids.map(|id| CommandSpec::raw(mode, id)).collect();
        let delay = self.config.custom_probe_delay();
        let (_, hits) = self
            .sweep(format!("mode {:02X}", mode), commands, delay)
            .await;

        let responses: BTreeMap<_, _> = hits
            .into_iter()
            .map(|hit| {
                let code = hit.command.code();
                let response = CustomPidResponse {
                    pid: code.clone(),
                    raw_response: hit.value.to_string(),
                };
                (code, response)
            })
            .collect();
        self.record.record_mode(mode, responses.clone());
        responses
    }

    /// Cheap probe of candidate manufacturer modes over the configured
    /// low range. Returns the modes that answered.
    pub async fn test_manufacturer_modes(
        &mut self,
        modes: &[u8],
    ) -> BTreeMap<String, BTreeMap<String, CustomPidResponse>> {
        let range = self.config.manufacturer_range.as_range();
        let mut responding = BTreeMap::new();

        for &mode in modes {
            if self.cancel.is_cancelled() || self.link.state() == ConnectionState::Fatal {
                break;
            }
            let hits = self.scan_custom_pids(mode, range.clone()).await;
            if !hits.is_empty() {
                let mode = format!("{:02X}", mode);
                self.events.emit(TelemetryEvent::ManufacturerModeResponded {
                    mode: mode.clone(),
                    responding: hits.len(),
                });
                responding.insert(mode, hits);
            }
        }
        responding
    }

    /// Detect, sweep, optionally probe manufacturer modes, then persist
    pub async fn run_full_discovery(
        &mut self,
        include_custom: bool,
        store: &DiscoveryStore,
    ) -> TelemetryResult<SavedDiscovery> {
        self.detect_protocol()?;
        self.scan_standard_pids().await;

        if include_custom {
            let modes = self.config.manufacturer_modes.clone();
            self.test_manufacturer_modes(&modes).await;
        }

        self.record.seal();
        store.save(&self.record)
    }

    async fn sweep(
        &mut self,
        label: String,
        commands: Vec<CommandSpec>,
        delay: Duration,
    ) -> (SweepReport, Vec<Hit>) {
        self.throttle.set_delay(delay);
        let mut report = SweepReport::new(label.clone(), commands.len());
        let mut hits = Vec::new();
        self.events.emit(TelemetryEvent::SweepStarted {
            sweep: label,
            total: commands.len(),
        });

        for command in commands {
            if self.cancel.is_cancelled() {
                report.interrupted = Some("cancelled".to_string());
                break;
            }

            self.throttle.wait().await;
            let reading = self.link.read(&command).await;
            self.throttle.done();
            report.probed += 1;

            match reading {
                Reading::Value { value, unit } if !value.is_empty() => {
                    self.events.emit(TelemetryEvent::ProbeResponded {
                        code: command.code(),
                        name: command.name.clone(),
                        value: value.to_string(),
                    });
                    hits.push(Hit {
                        command,
                        value,
                        unit,
                    });
                }
                reading if reading.is_link_failure() => {
                    if let Reading::Absent(reason) = &reading {
                        self.events.emit(TelemetryEvent::ProbeFailed {
                            code: command.code(),
                            reason: reason.to_string(),
                        });
                    }
                    if let Err(e) = self.recover().await {
                        report.interrupted = Some(e.to_string());
                        break;
                    }
                }
                _ => self.events.emit(TelemetryEvent::ProbeSilent {
                    code: command.code(),
                }),
            }
        }

        report.responding = hits.len();
        self.finish_sweep(&report);
        (report, hits)
    }

    /// Confirm the link after a failed probe and heal it if needed
    async fn recover(&mut self) -> TelemetryResult<()> {
        // The health check is itself a query
        self.throttle.wait().await;
        let health = self.link.health_check().await;
        self.throttle.done();
        if health == Health::Healthy {
            return Ok(());
        }
        let result = self
            .link
            .reconnect(self.config.recovery_attempts, self.config.recovery_delay())
            .await;
        self.throttle.done();
        result.map(|_| ())
    }

    fn finish_sweep(&mut self, report: &SweepReport) {
        self.events.emit(TelemetryEvent::SweepFinished {
            sweep: report.sweep.clone(),
            responding: report.responding,
            probed: report.probed,
            total: report.total,
            interrupted: report.interrupted.clone(),
        });
        self.record.record_sweep(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdlog_core::RecordingEvents;
    use obdlog_link::{LinkConfig, SimulatedConfig, SimulatedConnector, SimulationControls};
    use tokio::time::Instant;

    async fn connected() -> (ConnectionManager, Arc<SimulationControls>, Arc<RecordingEvents>) {
        connected_with(SimulatedConfig::default()).await
    }

    async fn connected_with(
        sim: SimulatedConfig,
    ) -> (ConnectionManager, Arc<SimulationControls>, Arc<RecordingEvents>) {
        let connector = SimulatedConnector::new(sim);
        let controls = connector.controls();
        let events = Arc::new(RecordingEvents::new());
        let mut link =
            ConnectionManager::new(Arc::new(connector), LinkConfig::default(), events.clone());
        link.connect().await.unwrap();
        (link, controls, events)
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            recovery_attempts: 2,
            recovery_delay_ms: 500,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_detect_protocol() {
        let (mut link, _, events) = connected().await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events.clone(), CancelFlag::new());

        let snapshot = scanner.detect_protocol().unwrap();

        assert_eq!(snapshot.protocol_id, "6");
        assert_eq!(snapshot.port, "/dev/rfcomm0");
        assert_eq!(snapshot.ecus, 1);
        assert_eq!(snapshot.supported_commands_count, 12);
        assert_eq!(scanner.record().protocol.as_ref(), Some(&snapshot));
    }

    #[tokio::test]
    async fn test_detect_protocol_requires_link() {
        let connector = SimulatedConnector::new(SimulatedConfig::default());
        let events = Arc::new(RecordingEvents::new());
        let mut link = ConnectionManager::new(Arc::new(connector), LinkConfig::default(), events.clone());
        let mut scanner = DiscoveryScanner::new(&mut link, config(), events, CancelFlag::new());

        assert!(matches!(
            scanner.detect_protocol(),
            Err(TelemetryError::TransportUnavailable(_))
        ));
        let report = scanner.scan_standard_pids().await;
        assert_eq!(report.interrupted.as_deref(), Some("ECU not connected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_standard_sweep_records_responders() {
        let (mut link, controls, events) = connected().await;
        controls.set_null("FUEL_LEVEL");
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events.clone(), CancelFlag::new());

        let report = scanner.scan_standard_pids().await;

        assert!(report.is_complete());
        assert_eq!(report.total, 12);
        assert_eq!(report.responding, 11);
        let rpm = &scanner.record().standard_pids["010C"];
        assert_eq!(rpm.name, "RPM");
        assert_eq!(rpm.mode, "01");
        assert_eq!(rpm.pid, "0C");
        assert_eq!(rpm.unit, "revolutions_per_minute");
        assert!(!scanner.record().standard_pids.contains_key("012F"));
        assert_eq!(
            events.count(|e| matches!(e, TelemetryEvent::ProbeSilent { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_are_spaced_by_delay() {
        let (mut link, controls, events) = connected().await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events, CancelFlag::new());

        let started = Instant::now();
        scanner.scan_standard_pids().await;
        scanner.scan_custom_pids(0x22, 0x00..=0x05).await;

        let log = controls.query_log();
        assert_eq!(log.len(), 18);
        let gaps: Vec<_> = log.windows(2).map(|p| p[1].at - p[0].at).collect();
        // Standard PIDs at 100 ms, then the raw sweep at 150 ms
        assert!(gaps[..11].iter().all(|&g| g == Duration::from_millis(100)));
        assert!(gaps[11..].iter().all(|&g| g == Duration::from_millis(150)));
        assert_eq!(started.elapsed(), Duration::from_millis(11 * 100 + 6 * 150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_answers_still_get_full_idle_time() {
        let sim = SimulatedConfig {
            latency_ms: 200,
            ..Default::default()
        };
        let (mut link, controls, events) = connected_with(sim).await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events, CancelFlag::new());

        scanner.scan_custom_pids(0x22, 0x00..=0x07).await;

        let log = controls.query_log();
        assert_eq!(log.len(), 8);
        for pair in log.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, Duration::from_millis(200 + 150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_sweep_is_permissive() {
        let (mut link, _, events) = connected().await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events, CancelFlag::new());

        let hits = scanner.scan_custom_pids(0x22, 0x00..=0x0F).await;

        let codes: Vec<_> = hits.keys().cloned().collect();
        assert_eq!(codes, vec!["2201", "2203"]);
        assert_eq!(hits["2203"].raw_response, "620300C8");
        assert_eq!(scanner.record().manufacturer_modes["22"].len(), 2);
        assert_eq!(scanner.record().sweeps[0].sweep, "mode 22");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manufacturer_modes_keep_responding_only() {
        let (mut link, _, events) = connected().await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events.clone(), CancelFlag::new());

        let modes = scanner.test_manufacturer_modes(&[0x21, 0x22, 0x23]).await;

        let keys: Vec<_> = modes.keys().cloned().collect();
        assert_eq!(keys, vec!["21", "22"]);
        assert_eq!(modes["21"]["210A"].raw_response, "610A0F");
        assert_eq!(scanner.record().sweeps.len(), 3);
        assert_eq!(
            events.count(|e| matches!(
                e,
                TelemetryEvent::ManufacturerModeResponded { mode, responding: 2 } if mode == "22"
            )),
            1
        );
        assert_eq!(
            events.count(|e| matches!(e, TelemetryEvent::ManufacturerModeResponded { .. })),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_interrupts_sweep_with_progress() {
        let (mut link, controls, events) = connected().await;
        controls.drop_link();
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events.clone(), CancelFlag::new());

        let hits = scanner.scan_custom_pids(0x22, 0x00..=0xFF).await;
        let sweep = scanner.record().sweeps[0].clone();

        assert!(hits.is_empty());
        assert_eq!(sweep.probed, 1);
        assert_eq!(sweep.total, 256);
        assert!(sweep.interrupted.unwrap().contains("Reconnect exhausted"));
        assert_eq!(
            events.count(|e| matches!(e, TelemetryEvent::ProbeFailed { code, .. } if code == "2200")),
            1
        );

        // Later modes are skipped once the link is fatal
        let modes = scanner.test_manufacturer_modes(&[0x21, 0x22]).await;
        assert!(modes.is_empty());
        assert_eq!(scanner.record().sweeps.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_loss_is_healed_mid_sweep() {
        let (mut link, controls, events) = connected().await;
        controls.drop_link();
        let restore = controls.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            restore.restore_link();
        });
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events.clone(), CancelFlag::new());

        let report = scanner.scan_standard_pids().await;

        assert!(report.is_complete());
        assert!(report.responding >= 10);
        assert_eq!(
            events.count(|e| matches!(e, TelemetryEvent::ReconnectSucceeded { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_between_probes() {
        let (mut link, controls, events) = connected().await;
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            flag.cancel();
        });
        let mut scanner = DiscoveryScanner::new(&mut link, config(), events, cancel);

        scanner.scan_custom_pids(0x22, 0x00..=0xFF).await;

        let sweep = &scanner.record().sweeps[0];
        assert_eq!(sweep.interrupted.as_deref(), Some("cancelled"));
        // Probes start at 0, 150, 300 and 450 ms; cancellation lands before the fifth
        assert_eq!(sweep.probed, 4);
        assert_eq!(controls.query_log().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_discovery_persists_sealed_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiscoveryStore::new(dir.path());
        let (mut link, _, events) = connected().await;
        let mut scanner =
            DiscoveryScanner::new(&mut link, config(), events, CancelFlag::new());

        let saved = scanner.run_full_discovery(true, &store).await.unwrap();

        assert!(scanner.record().is_sealed());
        let results = DiscoveryStore::load(&saved.results).unwrap();
        assert_eq!(results.standard_pids.count, 12);
        assert_eq!(results.manufacturer_modes.len(), 2);
        assert!(saved.summary.exists());
    }
}
