//! Connection manager: connect, disconnect, health check, bounded reconnect

use std::sync::Arc;
use std::time::Duration;

use obdlog_core::{
    AbsentReason, CancelFlag, CommandSpec, EcuChannel, EventSink, ProtocolIdentity, Reading,
    TelemetryError, TelemetryEvent, TelemetryResult, TransportConnector,
};
use tokio::time::Instant;

use crate::config::LinkConfig;

/// Link state, owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// The last health check failed; the channel is still held
    Unhealthy,
    /// Reconnect attempts were exhausted; terminal for this manager
    Fatal,
}

/// Result of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// Sole owner of the transport channel
///
/// Every operation takes `&mut self`, so at most one transport exchange is
/// in flight and callers can only reach the ECU through the manager.
pub struct ConnectionManager {
    connector: Arc<dyn TransportConnector>,
    config: LinkConfig,
    events: Arc<dyn EventSink>,
    channel: Option<Box<dyn EcuChannel>>,
    state: ConnectionState,
    identity: Option<ProtocolIdentity>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        config: LinkConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connector,
            config,
            events,
            channel: None,
            state: ConnectionState::Disconnected,
            identity: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a channel is open (healthy or not)
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
            && matches!(
                self.state,
                ConnectionState::Connected | ConnectionState::Unhealthy
            )
    }

    /// Identity recorded at the last successful connect
    pub fn identity(&self) -> Option<&ProtocolIdentity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Open the transport. Fails if the manager is fatal, the transport
    /// cannot be opened, or the channel does not report itself live.
    pub async fn connect(&mut self) -> TelemetryResult<()> {
        if self.state == ConnectionState::Fatal {
            return Err(TelemetryError::LinkFatal);
        }
        self.open_channel().await
    }

    async fn open_channel(&mut self) -> TelemetryResult<()> {
        if self.channel.is_some() {
            self.close_channel().await;
        }

        self.events.emit(TelemetryEvent::Connecting {
            port: self.config.port.clone(),
        });

        let result = self
            .connector
            .open(self.config.port.as_deref(), self.config.baudrate)
            .await;
        let mut channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                let reason = e.to_string();
                self.events.emit(TelemetryEvent::ConnectFailed {
                    reason: reason.clone(),
                });
                return Err(TelemetryError::TransportUnavailable(reason));
            }
        };

        if !channel.is_alive().await {
            if let Err(e) = channel.close().await {
                self.events.emit(TelemetryEvent::DisconnectFailed {
                    reason: e.to_string(),
                });
            }
            self.state = ConnectionState::Disconnected;
            let reason = "adapter opened but the ECU is not responding".to_string();
            self.events.emit(TelemetryEvent::ConnectFailed {
                reason: reason.clone(),
            });
            return Err(TelemetryError::TransportUnavailable(reason));
        }

        let identity = channel.protocol_identity();
        self.events.emit(TelemetryEvent::Connected {
            port: identity.port.clone(),
            protocol: identity.name.clone(),
            supported_commands: channel.supported_commands().len(),
        });
        self.identity = Some(identity);
        self.channel = Some(channel);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Close the transport if open. Idempotent; close errors are reported
    /// as events and never returned. A fatal manager stays fatal.
    pub async fn disconnect(&mut self) {
        self.close_channel().await;
        if self.state != ConnectionState::Fatal {
            self.state = ConnectionState::Disconnected;
        }
    }

    async fn close_channel(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        match channel.close().await {
            Ok(()) => self.events.emit(TelemetryEvent::Disconnected),
            Err(e) => self.events.emit(TelemetryEvent::DisconnectFailed {
                reason: e.to_string(),
            }),
        }
    }

    /// Issue one status query. Does not reconnect.
    pub async fn health_check(&mut self) -> Health {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Unhealthy
        ) {
            return Health::Unhealthy;
        }

        let failure = match self.read(&CommandSpec::status()).await {
            Reading::Value { .. } => None,
            Reading::Absent(AbsentReason::NoData) => Some("received null response".to_string()),
            Reading::Absent(reason) => Some(reason.to_string()),
        };

        match failure {
            None => {
                self.state = ConnectionState::Connected;
                Health::Healthy
            }
            Some(reason) => {
                self.state = ConnectionState::Unhealthy;
                self.events
                    .emit(TelemetryEvent::HealthCheckFailed { reason });
                Health::Unhealthy
            }
        }
    }

    /// Disconnect, then make up to `max_attempts` sequential connect attempts
    /// with `delay` between them (none after the last). Returns the attempt
    /// that succeeded; exhausting every attempt makes the manager fatal.
    pub async fn reconnect(&mut self, max_attempts: u32, delay: Duration) -> TelemetryResult<u32> {
        if self.state == ConnectionState::Fatal {
            return Err(TelemetryError::LinkFatal);
        }

        self.events
            .emit(TelemetryEvent::ReconnectStarted { max_attempts });
        let started = Instant::now();
        self.disconnect().await;

        for attempt in 1..=max_attempts {
            self.events.emit(TelemetryEvent::ReconnectAttempt {
                attempt,
                max_attempts,
            });

            if self.open_channel().await.is_ok() {
                self.events
                    .emit(TelemetryEvent::ReconnectSucceeded { attempt });
                return Ok(attempt);
            }

            if attempt < max_attempts {
                self.events.emit(TelemetryEvent::ReconnectWaiting { delay });
                tokio::time::sleep(delay).await;
            }
        }

        let elapsed = started.elapsed();
        self.state = ConnectionState::Fatal;
        self.events.emit(TelemetryEvent::ReconnectExhausted {
            attempts: max_attempts,
            elapsed,
        });
        Err(TelemetryError::ReconnectExhausted {
            attempts: max_attempts,
            elapsed,
        })
    }

    /// Reconnect with the configured attempt count and delay
    pub async fn reconnect_configured(&mut self) -> TelemetryResult<u32> {
        let attempts = self.config.reconnect_attempts;
        let delay = self.config.reconnect_delay();
        self.reconnect(attempts, delay).await
    }

    /// Query one command. Failures and null responses come back as
    /// [`Reading::Absent`]; nothing here changes the link state.
    pub async fn read(&mut self, command: &CommandSpec) -> Reading {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Unhealthy
        ) {
            return Reading::Absent(AbsentReason::NotConnected);
        }
        let timeout = self.config.query_timeout();
        let Some(channel) = self.channel.as_mut() else {
            return Reading::Absent(AbsentReason::NotConnected);
        };

        match tokio::time::timeout(timeout, channel.query(command)).await {
            Ok(Ok(response)) => response.into(),
            Ok(Err(e)) => Reading::Absent(AbsentReason::Transport(e.to_string())),
            Err(_) => Reading::Absent(AbsentReason::Timeout),
        }
    }

    /// Raw probe of one identifier under a diagnostic mode
    pub async fn probe(&mut self, mode: u8, id: u8) -> Reading {
        self.read(&CommandSpec::raw(mode, id)).await
    }

    /// Commands the ECU advertised; empty when not connected
    pub fn supported_commands(&self) -> Vec<CommandSpec> {
        match (&self.channel, self.is_connected()) {
            (Some(channel), true) => channel.supported_commands(),
            _ => Vec::new(),
        }
    }

    /// Health-check every `check_interval` and self-heal on failure.
    ///
    /// Runs until cancelled (Ok) or until a reconnect is exhausted (Err).
    pub async fn maintain(
        &mut self,
        check_interval: Duration,
        cancel: &CancelFlag,
    ) -> TelemetryResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if self.health_check().await == Health::Unhealthy {
                self.reconnect_configured().await?;
            }
            tokio::time::sleep(check_interval).await;
        }
    }
}
