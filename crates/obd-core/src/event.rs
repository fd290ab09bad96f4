//! Driver lifecycle events
//!
//! Delivered over a `tokio::sync::broadcast` channel: at-least-once to
//! current subscribers, no replay for late joiners.

use crate::models::DriverState;

/// Event emitted by a driver or its link supervisor
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Adapter link established and init sequence completed
    Connected {
        /// Adapter firmware identification, when available
        firmware: Option<String>,
    },
    /// Link lost or closed
    Disconnected,
    /// Driver state transition
    StateChanged {
        from: DriverState,
        to: DriverState,
    },
    /// A command finished (successfully or not)
    CommandCompleted {
        command: String,
        duration_ms: u64,
        ok: bool,
    },
    /// Mode 03 read finished
    DtcRead {
        count: usize,
    },
    /// Mode 04 clear acknowledged
    DtcCleared,
    /// A PID was read successfully
    PidRead {
        pid: String,
    },
    /// The watchdog declared a stalled command and forced a disconnect
    WatchdogTriggered {
        stalled_for_ms: u64,
    },
    /// Reconnect loop is about to try again
    ReconnectAttempt {
        attempt: u32,
    },
    /// Reconnect loop restored the link
    ReconnectSucceeded {
        duration_ms: u64,
    },
    /// Reconnect loop gave up
    ReconnectFailed {
        error: String,
    },
    /// Any surfaced error, with its machine code
    Error {
        code: &'static str,
        message: String,
    },
}
