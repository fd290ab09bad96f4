//! Driver state and connection snapshot

use serde::{Deserialize, Serialize};

/// Driver lifecycle state
///
/// Legal transitions:
/// Disconnected → Connecting → Initializing → Ready ⇄ Busy,
/// any state → Error → Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Busy,
    Error,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Kind of link the adapter is attached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Bluetooth,
    Scripted,
}

/// Point-in-time view of a driver connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: DriverState,
    pub transport: TransportKind,
    /// Adapter firmware identification (ATI), once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    /// Active protocol reported by the adapter (ATDPN), once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Peripheral address for Bluetooth links
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bluetooth_address: Option<String>,
    /// Advertised peripheral name for Bluetooth links
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bluetooth_name: Option<String>,
}
