//! Transport collaborator interface
//!
//! The diagnostic protocol itself (frame construction, checksums, unit
//! conversion) lives behind these traits. A [`TransportConnector`] opens a
//! channel; the resulting [`EcuChannel`] executes one query-response
//! exchange per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::models::{CommandSpec, QueryResponse};

/// Protocol identity reported by an open channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolIdentity {
    /// Protocol name (e.g., "ISO 15765-4 (CAN 11/500)")
    pub name: String,
    /// Protocol id as reported by the adapter (e.g., "6")
    pub id: String,
    /// Port the channel is attached to
    pub port: String,
    /// Number of ECUs answering on the bus
    pub ecu_count: usize,
}

/// Opens channels to the ECU
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a channel at `baudrate`. `None` asks the transport to
    /// auto-detect the port.
    async fn open(
        &self,
        address: Option<&str>,
        baudrate: u32,
    ) -> Result<Box<dyn EcuChannel>, TransportError>;
}

/// An open channel to the ECU
///
/// Implementations are driven by exactly one owner; every mutating call
/// takes `&mut self` so only one exchange can be outstanding.
#[async_trait]
pub trait EcuChannel: Send + Sync {
    /// Whether the adapter reports the vehicle side as connected
    async fn is_alive(&self) -> bool;

    /// Execute one query-response exchange
    async fn query(&mut self, command: &CommandSpec) -> Result<QueryResponse, TransportError>;

    /// Commands the ECU advertised as supported when the channel opened
    fn supported_commands(&self) -> Vec<CommandSpec>;

    /// Protocol identity of this channel
    fn protocol_identity(&self) -> ProtocolIdentity;

    /// Close the channel
    async fn close(&mut self) -> Result<(), TransportError>;
}
