//! Live data snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One pass over the core live parameters
///
/// Individual fields are `None` when the vehicle returned NO DATA for the
/// corresponding PID or does not support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObdLiveData {
    /// Engine RPM (PID 0C)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<f64>,
    /// Engine coolant temperature, °C (PID 05)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coolant_temp: Option<f64>,
    /// Intake air temperature, °C (PID 0F)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_temp: Option<f64>,
    /// Vehicle speed, km/h (PID 0D)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_speed: Option<f64>,
    /// Control module voltage, V (PID 42)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    /// Throttle position, % (PID 11)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_position: Option<f64>,
    /// When the pass completed
    pub timestamp: DateTime<Utc>,
}
