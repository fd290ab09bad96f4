//! Transport layer: the adapter link abstraction and its implementations

mod error;
mod scripted;
mod serial;

use std::sync::Arc;

use async_trait::async_trait;
use obd_core::{ObdError, ObdResult, TransportKind};
use tokio::sync::broadcast;

use crate::config::TransportConfig;

pub use error::TransportError;
pub use scripted::ScriptedTransport;
pub use serial::SerialTransport;

/// Event pushed by a transport to its subscribers
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A chunk of text from the adapter (not yet framed)
    Data(String),
    /// Link-level error; a `Closed` event follows if the link is gone
    Error(String),
    /// Link closed, no more data will arrive
    Closed,
}

/// Static description of a transport endpoint
#[derive(Debug, Clone)]
pub struct TransportDescriptor {
    pub kind: TransportKind,
    /// Endpoint identity: device node, peripheral address, ...
    pub endpoint: Option<String>,
    pub bluetooth_address: Option<String>,
    pub bluetooth_name: Option<String>,
}

/// Byte-stream link to an ELM327-family adapter.
///
/// Implementations push received text through a broadcast channel;
/// framing (the `>` prompt) is the driver's job. A BLE stack integrates
/// by implementing this trait and handing the object to
/// [`crate::Elm327Driver::with_transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. Idempotent when already open.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the link and stop delivering events
    async fn close(&self) -> Result<(), TransportError>;

    /// Write raw text (the driver appends the CR itself)
    async fn write(&self, text: &str) -> Result<(), TransportError>;

    /// Subscribe to incoming data/lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Whether the link is currently open
    fn is_open(&self) -> bool;

    /// Endpoint description for snapshots and logs
    fn descriptor(&self) -> TransportDescriptor;
}

/// Build a transport from configuration.
///
/// Bluetooth links cannot be constructed here: the BLE session lives in
/// the host stack, which passes its own [`Transport`] implementation to
/// the driver instead.
pub fn create_transport(config: &TransportConfig) -> ObdResult<Arc<dyn Transport>> {
    match config {
        TransportConfig::Serial(serial) => Ok(Arc::new(SerialTransport::new(serial.clone()))),
        TransportConfig::Scripted(scripted) => Ok(Arc::new(ScriptedTransport::new(scripted))),
        TransportConfig::Bluetooth(ble) => Err(ObdError::Transport(format!(
            "bluetooth link {} is provided by the host BLE stack; use Elm327Driver::with_transport",
            ble.address
        ))),
    }
}
