//! Normalized error taxonomy
//!
//! Every error carries a stable machine code and a subtype so callers can
//! branch without string matching. Transport and protocol errors are
//! retryable; parse and resource errors are not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub type ObdResult<T> = Result<T, ObdError>;

/// Coarse error class, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSubtype {
    SerialPortError,
    TimeoutError,
    ProtocolError,
    DataError,
    ParseError,
    ResourceError,
    Generic,
}

/// Engine error taxonomy
#[derive(Debug, Error, Clone)]
pub enum ObdError {
    /// Adapter device not present (serial ENOENT or BLE peripheral gone)
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),

    /// Port exists but cannot be opened (permissions, busy)
    #[error("unable to open adapter: {0}")]
    AdapterUnavailable(String),

    /// Link-level failure on an established connection
    #[error("transport failure: {0}")]
    Transport(String),

    /// Link closed underneath us (adapter reported STOPPED or stream EOF)
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Connection attempt did not finish in time
    #[error("connection timed out: {0}")]
    ConnectionTimeout(String),

    /// A single command did not produce a response in time
    #[error("command '{command}' timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    /// Vehicle returned NO DATA for a request
    #[error("no data for command '{command}'")]
    NoData { command: String },

    /// Adapter could not talk to the vehicle (UNABLE TO CONNECT)
    #[error("unable to connect to vehicle: {0}")]
    VehicleUnreachable(String),

    /// Bus initialization failed (BUS INIT ERROR)
    #[error("bus init error: {0}")]
    BusInit(String),

    /// CAN-level fault, usually a protocol mismatch (CAN ERROR)
    #[error("protocol selection failed: {0}")]
    ProtocolSelection(String),

    /// Adapter rejected or did not understand a command ("?", ERROR)
    #[error("adapter rejected command '{command}': {response}")]
    CommandRejected { command: String, response: String },

    /// Adapter init sequence exhausted its retry budget
    #[error("adapter initialization failed: {0}")]
    InitFailed(String),

    /// Response arrived but could not be decoded
    #[error("cannot parse response: {reason} (raw: {raw:?})")]
    Parse { reason: String, raw: String },

    /// Operation requires an established connection
    #[error("driver is not connected")]
    NotConnected,

    /// Pool: the vehicle already holds an active connection
    #[error("Vehicle already has active connection: {0}")]
    VehicleBusy(String),

    /// Pool: waited past the acquisition deadline
    #[error("connection acquisition timed out after {0}ms")]
    AcquireTimeout(u64),

    /// Pool: shutdown in progress, no new acquisitions
    #[error("Pool shutting down")]
    PoolShutdown,

    /// Invariant violation inside the engine
    #[error("internal error: {0}")]
    Internal(String),
}

impl ObdError {
    /// Stable machine code for UI and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            Self::AdapterNotFound(_) => "adapter_not_found",
            Self::AdapterUnavailable(_) => "unable_to_connect",
            Self::Transport(_) => "transport_error",
            Self::TransportClosed(_) => "transport_closed",
            Self::ConnectionTimeout(_) => "connection_timeout",
            Self::CommandTimeout { .. } => "command_timeout",
            Self::NoData { .. } => "no_data",
            Self::VehicleUnreachable(_) => "unable_to_connect",
            Self::BusInit(_) => "bus_init_error",
            Self::ProtocolSelection(_) => "protocol_selection_failed",
            Self::CommandRejected { .. } => "command_rejected",
            Self::InitFailed(_) => "init_failed",
            Self::Parse { .. } => "parse_error",
            Self::NotConnected => "not_connected",
            Self::VehicleBusy(_) => "vehicle_busy",
            Self::AcquireTimeout(_) => "acquire_timeout",
            Self::PoolShutdown => "pool_shutting_down",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn subtype(&self) -> ErrorSubtype {
        match self {
            Self::AdapterNotFound(_) | Self::AdapterUnavailable(_) => ErrorSubtype::SerialPortError,
            Self::Transport(_) | Self::TransportClosed(_) | Self::NotConnected => {
                ErrorSubtype::Generic
            }
            Self::ConnectionTimeout(_) | Self::CommandTimeout { .. } => ErrorSubtype::TimeoutError,
            Self::NoData { .. } => ErrorSubtype::DataError,
            Self::VehicleUnreachable(_)
            | Self::BusInit(_)
            | Self::ProtocolSelection(_)
            | Self::CommandRejected { .. }
            | Self::InitFailed(_) => ErrorSubtype::ProtocolError,
            Self::Parse { .. } => ErrorSubtype::ParseError,
            Self::VehicleBusy(_) | Self::AcquireTimeout(_) | Self::PoolShutdown => {
                ErrorSubtype::ResourceError
            }
            Self::Internal(_) => ErrorSubtype::Generic,
        }
    }

    /// Whether a retry policy may re-attempt the failed operation.
    ///
    /// Transport, timeout and vehicle-side protocol faults are transient;
    /// parse failures and resource conflicts will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AdapterNotFound(_)
            | Self::AdapterUnavailable(_)
            | Self::Transport(_)
            | Self::TransportClosed(_)
            | Self::ConnectionTimeout(_)
            | Self::CommandTimeout { .. }
            | Self::NoData { .. }
            | Self::VehicleUnreachable(_)
            | Self::BusInit(_)
            | Self::ProtocolSelection(_)
            | Self::NotConnected => true,
            Self::CommandRejected { .. }
            | Self::InitFailed(_)
            | Self::Parse { .. }
            | Self::VehicleBusy(_)
            | Self::AcquireTimeout(_)
            | Self::PoolShutdown
            | Self::Internal(_) => false,
        }
    }

    /// Serializable form for UIs and logs
    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code(),
            subtype: self.subtype(),
            message: self.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Machine-consumable error envelope
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub code: &'static str,
    pub subtype: ErrorSubtype,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Classify an OS-level I/O error from opening or using the adapter port.
///
/// Mirrors the serial stack's errno semantics: missing device, permission
/// or busy port, and kernel-level timeouts each get their own code.
pub fn classify_io_error(err: &std::io::Error, context: &str) -> ObdError {
    use std::io::ErrorKind;
    let detail = format!("{context}: {err}");
    match err.kind() {
        ErrorKind::NotFound => ObdError::AdapterNotFound(detail),
        ErrorKind::PermissionDenied | ErrorKind::AddrInUse | ErrorKind::WouldBlock => {
            ObdError::AdapterUnavailable(detail)
        }
        ErrorKind::TimedOut => ObdError::ConnectionTimeout(detail),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            ObdError::TransportClosed(detail)
        }
        // ENOENT / EACCES / EBUSY / ETIMEDOUT for kinds std does not map
        _ => match err.raw_os_error() {
            Some(2) => ObdError::AdapterNotFound(detail),
            Some(13) | Some(16) => ObdError::AdapterUnavailable(detail),
            Some(110) => ObdError::ConnectionTimeout(detail),
            _ => ObdError::Transport(detail),
        },
    }
}
