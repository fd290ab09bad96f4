//! PID reading type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded live parameter (SAE J1979 Mode 01)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidReading {
    /// PID in upper-case hex, e.g. "0C"
    pub pid: String,
    /// Human-readable parameter name, e.g. "Engine RPM"
    pub name: String,
    /// Decoded value in `unit`
    pub value: f64,
    /// Measurement unit, e.g. "rpm"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}
