//! obd-core - Core types for the OBD-II diagnostic engine
//!
//! Shared data model (DTCs, PID readings, vehicle status, driver state)
//! and the normalized error taxonomy used by every other crate in the
//! workspace.

pub mod error;
pub mod event;
pub mod models;

pub use error::{ErrorSubtype, ObdError, ObdResult, WireError};
pub use event::DriverEvent;
pub use models::{
    ConnectionSnapshot, DriverState, DtcCategory, DtcEntry, DtcSeverity, ObdLiveData, ObdStatus,
    PidReading, ReadinessMonitors, TransportKind,
};
