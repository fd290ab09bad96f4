//! Vehicle diagnostic status (Mode 01 PID 01)

use serde::{Deserialize, Serialize};

/// Emission readiness monitor states
///
/// Only the monitors common to spark and compression engines are modeled
/// individually; engine-type specific continuous monitors are folded into
/// `misfire`/`fuel_system`/`components`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessMonitors {
    pub misfire: bool,
    pub fuel_system: bool,
    pub components: bool,
    pub catalyst: bool,
    pub heated_catalyst: bool,
    pub evaporative_system: bool,
    pub secondary_air_system: bool,
    pub oxygen_sensor: bool,
    pub oxygen_sensor_heater: bool,
    pub egr_system: bool,
}

/// Decoded Mode 01 PID 01 response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObdStatus {
    /// Malfunction indicator lamp (check engine light)
    pub mil_on: bool,
    /// Number of confirmed DTCs reported by the ECU
    pub dtc_count: u8,
    /// True for spark ignition (gasoline), false for compression (diesel)
    pub spark_ignition: bool,
    /// Readiness monitor completion flags (true = ready/complete)
    pub readiness: ReadinessMonitors,
}
