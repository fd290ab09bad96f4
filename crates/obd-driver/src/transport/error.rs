//! Transport layer errors

use obd_core::ObdError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// Device node or peripheral does not exist (ENOENT)
    #[error("Adapter not found: {0}")]
    NotFound(String),

    /// Port exists but cannot be opened (EACCES)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Port held by another process (EBUSY)
    #[error("Port busy: {0}")]
    Busy(String),

    /// Link-level timeout (ETIMEDOUT)
    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Open failed: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Transport not open")]
    NotOpen,

    #[error("Connection closed")]
    Closed,
}

impl From<TransportError> for ObdError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(detail) => ObdError::AdapterNotFound(detail),
            TransportError::AccessDenied(detail) | TransportError::Busy(detail) => {
                ObdError::AdapterUnavailable(detail)
            }
            TransportError::TimedOut(detail) => ObdError::ConnectionTimeout(detail),
            TransportError::OpenFailed(detail) | TransportError::WriteFailed(detail) => {
                ObdError::Transport(detail)
            }
            TransportError::NotOpen => ObdError::NotConnected,
            TransportError::Closed => ObdError::TransportClosed("link closed".to_string()),
        }
    }
}
