//! Built-in DTC description catalog (common SAE J2012 codes)

use obd_core::{DtcCategory, DtcSeverity};

/// Catalog entry for a trouble code
#[derive(Debug, Clone, PartialEq)]
pub struct DtcDescription {
    pub description: String,
    pub severity: DtcSeverity,
}

use DtcSeverity::{Critical, High, Low, Medium};

/// Common codes seen on generic OBD-II vehicles. Not exhaustive; unknown
/// codes fall back to a per-category generic description.
static DTC_CATALOG: &[(&str, &str, DtcSeverity)] = &[
    // Fuel and air metering
    ("P0100", "Mass air flow (MAF) sensor circuit malfunction", Medium),
    ("P0101", "MAF sensor range/performance", Medium),
    ("P0102", "MAF sensor circuit low input", Medium),
    ("P0103", "MAF sensor circuit high input", Medium),
    ("P0105", "Manifold absolute pressure (MAP) sensor malfunction", Medium),
    ("P0106", "MAP sensor range/performance", Medium),
    ("P0110", "Intake air temperature sensor malfunction", Low),
    ("P0113", "Intake air temperature sensor high input", Low),
    ("P0115", "Engine coolant temperature sensor malfunction", Medium),
    ("P0117", "Coolant temperature sensor low input", Medium),
    ("P0118", "Coolant temperature sensor high input", Medium),
    ("P0120", "Throttle position sensor malfunction", Medium),
    ("P0121", "Throttle position sensor range/performance", Medium),
    ("P0125", "Insufficient coolant temperature for closed loop", Low),
    ("P0128", "Coolant temperature below thermostat regulating temperature", Low),
    ("P0130", "O2 sensor circuit malfunction (bank 1, sensor 1)", Medium),
    ("P0131", "O2 sensor low voltage (bank 1, sensor 1)", Medium),
    ("P0133", "O2 sensor slow response (bank 1, sensor 1)", Medium),
    ("P0134", "O2 sensor no activity (bank 1, sensor 1)", Medium),
    ("P0135", "O2 sensor heater malfunction (bank 1, sensor 1)", Medium),
    ("P0136", "O2 sensor circuit malfunction (bank 1, sensor 2)", Medium),
    ("P0141", "O2 sensor heater malfunction (bank 1, sensor 2)", Medium),
    ("P0171", "System too lean (bank 1)", High),
    ("P0172", "System too rich (bank 1)", High),
    ("P0174", "System too lean (bank 2)", High),
    ("P0175", "System too rich (bank 2)", High),
    // Injectors and misfires
    ("P0200", "Injector circuit malfunction", High),
    ("P0300", "Random/multiple cylinder misfire detected", Critical),
    ("P0301", "Cylinder 1 misfire detected", Critical),
    ("P0302", "Cylinder 2 misfire detected", Critical),
    ("P0303", "Cylinder 3 misfire detected", Critical),
    ("P0304", "Cylinder 4 misfire detected", Critical),
    ("P0305", "Cylinder 5 misfire detected", Critical),
    ("P0306", "Cylinder 6 misfire detected", Critical),
    // Emissions
    ("P0400", "Exhaust gas recirculation (EGR) flow malfunction", Medium),
    ("P0401", "EGR insufficient flow", Medium),
    ("P0402", "EGR excessive flow", Medium),
    ("P0420", "Catalyst efficiency below threshold (bank 1)", Medium),
    ("P0430", "Catalyst efficiency below threshold (bank 2)", Medium),
    ("P0440", "Evaporative emission control system malfunction", Low),
    ("P0441", "EVAP incorrect purge flow", Low),
    ("P0442", "EVAP small leak detected", Low),
    ("P0446", "EVAP vent control malfunction", Low),
    ("P0455", "EVAP large leak detected", Low),
    ("P0456", "EVAP very small leak detected", Low),
    // Speed and idle
    ("P0500", "Vehicle speed sensor malfunction", Medium),
    ("P0505", "Idle control system malfunction", Medium),
    ("P0506", "Idle speed lower than expected", Low),
    ("P0507", "Idle speed higher than expected", Low),
    // Control module
    ("P0600", "Serial communication link malfunction", High),
    ("P0601", "Control module memory checksum error", High),
    ("P0603", "Control module keep-alive memory error", High),
    ("P0605", "Control module ROM error", High),
    // Network
    ("U0100", "Lost communication with ECM/PCM", High),
    ("U0101", "Lost communication with TCM", High),
    ("U0121", "Lost communication with ABS control module", High),
    ("U0140", "Lost communication with body control module", Medium),
];

/// Look up the description for a code, falling back to a generic
/// per-category description for unknown codes.
pub fn describe_dtc(code: &str) -> DtcDescription {
    let normalized = code.to_ascii_uppercase();
    if let Some((_, description, severity)) =
        DTC_CATALOG.iter().find(|(c, _, _)| *c == normalized)
    {
        return DtcDescription {
            description: (*description).to_string(),
            severity: *severity,
        };
    }
    fallback_description(&normalized)
}

fn fallback_description(code: &str) -> DtcDescription {
    let category = match code.chars().next() {
        Some('P') => Some(DtcCategory::Powertrain),
        Some('C') => Some(DtcCategory::Chassis),
        Some('B') => Some(DtcCategory::Body),
        Some('U') => Some(DtcCategory::Network),
        _ => None,
    };
    let description = match category {
        Some(DtcCategory::Powertrain) => format!("Powertrain fault {code}"),
        Some(DtcCategory::Chassis) => format!("Chassis fault {code}"),
        Some(DtcCategory::Body) => format!("Body fault {code}"),
        Some(DtcCategory::Network) => format!("Network/communication fault {code}"),
        None => format!("Unknown fault {code}"),
    };
    DtcDescription {
        description,
        severity: Medium,
    }
}
