//! Domain model types

mod dtc;
mod live_data;
mod pid;
mod snapshot;
mod status;

pub use dtc::{DtcCategory, DtcEntry, DtcSeverity};
pub use live_data::ObdLiveData;
pub use pid::PidReading;
pub use snapshot::{ConnectionSnapshot, DriverState, TransportKind};
pub use status::{ObdStatus, ReadinessMonitors};
