//! Simulated ECU transport
//!
//! Behaves like an ELM327 adapter attached to a running engine. Faults are
//! scripted through [`SimulationControls`], shared between the connector and
//! every channel it opens, so tests can drop the link mid-run and inspect
//! every exchange that reached the "wire".

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use obdlog_core::catalog;
use obdlog_core::{
    CommandSpec, EcuChannel, ProtocolIdentity, QueryResponse, ReadingValue, TransportConnector,
    TransportError, MODE_CURRENT_DATA,
};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::time::Instant;

use crate::config::SimulatedConfig;

/// Port reported when the adapter is auto-detected
const AUTO_DETECTED_PORT: &str = "/dev/rfcomm0";

/// One exchange that reached the simulated ECU
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub at: Instant,
    pub code: String,
}

/// Fault injection and observation shared by a connector and its channels
#[derive(Debug, Default)]
pub struct SimulationControls {
    open_failures: AtomicU32,
    link_down: AtomicBool,
    ecu_silent: AtomicBool,
    fail_close: AtomicBool,
    status_checks_before_drop: Mutex<Option<u64>>,
    null_pids: RwLock<HashSet<String>>,
    opens: AtomicU32,
    closes: AtomicU32,
    last_baudrate: AtomicU32,
    query_log: Mutex<Vec<QueryRecord>>,
}

impl SimulationControls {
    /// The next `n` opens fail
    pub fn fail_next_opens(&self, n: u32) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    /// Every open fails until cleared with `fail_next_opens(0)`
    pub fn fail_all_opens(&self) {
        self.open_failures.store(u32::MAX, Ordering::SeqCst);
    }

    /// Cut the link: queries fail and opens fail until restored
    pub fn drop_link(&self) {
        self.link_down.store(true, Ordering::SeqCst);
    }

    pub fn restore_link(&self) {
        self.link_down.store(false, Ordering::SeqCst);
        *self.status_checks_before_drop.lock() = None;
    }

    /// Let `n` status queries succeed, then cut the link
    pub fn drop_link_after_status_checks(&self, n: u64) {
        *self.status_checks_before_drop.lock() = Some(n);
    }

    /// Adapter answers but the ECU side is dead (ignition off)
    pub fn set_ecu_silent(&self, silent: bool) {
        self.ecu_silent.store(silent, Ordering::SeqCst);
    }

    /// Closing a channel reports an error
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// A PID that always answers null
    pub fn set_null(&self, pid: &str) {
        self.null_pids.write().insert(pid.to_string());
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Baud rate requested by the most recent open, 0 before any open
    pub fn last_baudrate(&self) -> u32 {
        self.last_baudrate.load(Ordering::SeqCst)
    }

    /// Every query that reached the ECU, in order
    pub fn query_log(&self) -> Vec<QueryRecord> {
        self.query_log.lock().clone()
    }

    pub fn clear_query_log(&self) {
        self.query_log.lock().clear();
    }

    fn is_link_down(&self) -> bool {
        self.link_down.load(Ordering::SeqCst)
    }

    fn take_open_failure(&self) -> bool {
        self.open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    /// Count a status check; returns false once the scripted drop is reached
    fn pass_status_check(&self) -> bool {
        let mut remaining = self.status_checks_before_drop.lock();
        match *remaining {
            Some(0) => {
                self.link_down.store(true, Ordering::SeqCst);
                false
            }
            Some(n) => {
                *remaining = Some(n - 1);
                true
            }
            None => true,
        }
    }
}

/// Opens simulated channels
pub struct SimulatedConnector {
    config: SimulatedConfig,
    controls: Arc<SimulationControls>,
}

impl SimulatedConnector {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            controls: Arc::new(SimulationControls::default()),
        }
    }

    /// Handle for scripting faults after the connector is shared
    pub fn controls(&self) -> Arc<SimulationControls> {
        self.controls.clone()
    }
}

#[async_trait]
impl TransportConnector for SimulatedConnector {
    async fn open(
        &self,
        address: Option<&str>,
        baudrate: u32,
    ) -> Result<Box<dyn EcuChannel>, TransportError> {
        self.controls.opens.fetch_add(1, Ordering::SeqCst);
        self.controls.last_baudrate.store(baudrate, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.controls.is_link_down() {
            return Err(TransportError::ConnectionFailed(
                "adapter not responding".to_string(),
            ));
        }
        if self.controls.take_open_failure() {
            return Err(TransportError::ConnectionFailed(
                "unable to open serial port".to_string(),
            ));
        }
        if baudrate == 0 {
            return Err(TransportError::ConnectionFailed(
                "invalid baud rate 0".to_string(),
            ));
        }

        let port = address.unwrap_or(AUTO_DETECTED_PORT).to_string();
        tracing::debug!(%port, baudrate, "Simulated adapter opened");
        Ok(Box::new(SimulatedChannel::new(
            &self.config,
            self.controls.clone(),
            port,
        )))
    }
}

struct SimulatedChannel {
    latency: Duration,
    jitter: bool,
    protocol_name: String,
    port: String,
    supported: Vec<CommandSpec>,
    manufacturer: HashMap<String, String>,
    controls: Arc<SimulationControls>,
    opened_at: Instant,
    closed: bool,
}

impl SimulatedChannel {
    fn new(config: &SimulatedConfig, controls: Arc<SimulationControls>, port: String) -> Self {
        let supported = config
            .supported_pids
            .iter()
            .filter_map(|name| catalog::lookup(name))
            .map(|spec| spec.command)
            .collect();
        let manufacturer = config
            .manufacturer_responses
            .iter()
            .filter_map(|(code, payload)| match hex::decode(payload) {
                Ok(bytes) => Some((code.to_ascii_uppercase(), hex::encode_upper(bytes))),
                Err(e) => {
                    tracing::warn!(%code, error = %e, "Ignoring malformed simulated payload");
                    None
                }
            })
            .collect();

        Self {
            latency: Duration::from_millis(config.latency_ms),
            jitter: config.jitter,
            protocol_name: config.protocol_name.clone(),
            port,
            supported,
            manufacturer,
            controls,
            opened_at: Instant::now(),
            closed: false,
        }
    }

    fn is_supported(&self, command: &CommandSpec) -> bool {
        self.supported
            .iter()
            .any(|c| c.mode == command.mode && c.pid == command.pid)
    }

    /// Engine behaviour over time since the channel opened
    fn simulate(&self, command: &CommandSpec) -> Option<ReadingValue> {
        let t = self.opened_at.elapsed().as_secs_f64();
        let wave = (t / 10.0).sin();
        let value = match command.pid {
            0x01 => return Some(ReadingValue::Text("MIL off, 0 DTC".to_string())),
            0x04 => 22.0 + 8.0 * wave,
            0x05 => (20.0 + t * 0.25).min(88.0),
            0x0B => 35.0 + 5.0 * wave,
            0x0C => 850.0 + 400.0 * wave,
            0x0D => 0.0,
            0x0F => 24.0,
            0x11 => 14.0 + 6.0 * wave,
            0x1F => t.floor(),
            0x2F => 71.5,
            0x42 => 13.8,
            0x46 => 21.0,
            _ => 0.0,
        };
        let value = if self.jitter {
            value + rand::thread_rng().gen_range(-0.5..0.5)
        } else {
            value
        };
        Some(ReadingValue::Number((value * 100.0).round() / 100.0))
    }
}

#[async_trait]
impl EcuChannel for SimulatedChannel {
    async fn is_alive(&self) -> bool {
        !self.closed
            && !self.controls.is_link_down()
            && !self.controls.ecu_silent.load(Ordering::SeqCst)
    }

    async fn query(&mut self, command: &CommandSpec) -> Result<QueryResponse, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.controls.query_log.lock().push(QueryRecord {
            at: Instant::now(),
            code: command.code(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if command.mode == MODE_CURRENT_DATA
            && command.pid == 0x01
            && !self.controls.pass_status_check()
        {
            return Err(TransportError::ConnectionClosed);
        }
        if self.controls.is_link_down() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.controls.ecu_silent.load(Ordering::SeqCst) {
            return Ok(QueryResponse::null());
        }

        if command.mode != MODE_CURRENT_DATA {
            return Ok(match self.manufacturer.get(&command.code()) {
                Some(payload) => QueryResponse::with_value(payload.as_str(), None),
                None => QueryResponse::null(),
            });
        }

        let is_status = command.pid == 0x01;
        if !is_status && !self.is_supported(command) {
            return Ok(QueryResponse::null());
        }
        if self.controls.null_pids.read().contains(&command.name) {
            return Ok(QueryResponse::null());
        }

        Ok(QueryResponse {
            value: self.simulate(command),
            unit: catalog::unit_for(command).map(String::from),
        })
    }

    fn supported_commands(&self) -> Vec<CommandSpec> {
        self.supported.clone()
    }

    fn protocol_identity(&self) -> ProtocolIdentity {
        ProtocolIdentity {
            name: self.protocol_name.clone(),
            id: "6".to_string(),
            port: self.port.clone(),
            ecu_count: 1,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.controls.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        if self.controls.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("port busy while closing".to_string()));
        }
        Ok(())
    }
}
