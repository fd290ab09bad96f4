//! SAE J1979 Mode 01 PID decoders

use chrono::Utc;
use obd_core::PidReading;

use crate::normalize::normalize_response;
use crate::payload::decode_hex_lenient;

/// Arithmetic decoder for one PID
pub struct PidDecoder {
    /// PID in upper-case hex
    pub pid: &'static str,
    /// Human-readable parameter name
    pub name: &'static str,
    /// Measurement unit
    pub unit: &'static str,
    /// Minimum payload bytes required
    min_bytes: usize,
    decode: fn(&[u8]) -> f64,
}

/// Registry of supported decoders, in PID order.
///
/// Formulas are the standard SAE J1979 ones; A is the first payload byte,
/// B the second.
static PID_DECODERS: &[PidDecoder] = &[
    PidDecoder {
        pid: "05",
        name: "Engine Coolant Temperature",
        unit: "°C",
        min_bytes: 1,
        decode: |b| f64::from(b[0]) - 40.0,
    },
    PidDecoder {
        pid: "0C",
        name: "Engine RPM",
        unit: "rpm",
        min_bytes: 2,
        decode: |b| (f64::from(b[0]) * 256.0 + f64::from(b[1])) / 4.0,
    },
    PidDecoder {
        pid: "0D",
        name: "Vehicle Speed",
        unit: "km/h",
        min_bytes: 1,
        decode: |b| f64::from(b[0]),
    },
    PidDecoder {
        pid: "0F",
        name: "Intake Air Temperature",
        unit: "°C",
        min_bytes: 1,
        decode: |b| f64::from(b[0]) - 40.0,
    },
    PidDecoder {
        pid: "11",
        name: "Throttle Position",
        unit: "%",
        min_bytes: 1,
        decode: |b| f64::from(b[0]) * 100.0 / 255.0,
    },
    PidDecoder {
        pid: "42",
        name: "Control Module Voltage",
        unit: "V",
        min_bytes: 2,
        decode: |b| (f64::from(b[0]) * 256.0 + f64::from(b[1])) / 1000.0,
    },
];

/// Look up decoder metadata for a PID (case-insensitive)
pub fn decoder_info(pid: &str) -> Option<&'static PidDecoder> {
    let normalized = pid.to_ascii_uppercase();
    PID_DECODERS.iter().find(|d| d.pid == normalized)
}

/// List all PIDs with a registered decoder
pub fn supported_pids() -> Vec<&'static str> {
    PID_DECODERS.iter().map(|d| d.pid).collect()
}

/// Decode a hex payload for the given PID.
///
/// Returns `None` when the PID has no registered decoder or the payload is
/// malformed or too short; callers treat that as an absent reading.
pub fn parse_pid(pid: &str, payload: &str) -> Option<f64> {
    let decoder = decoder_info(pid)?;
    let bytes = decode_hex_lenient(&normalize_response(payload)).ok()?;
    if bytes.len() < decoder.min_bytes {
        return None;
    }
    Some((decoder.decode)(&bytes))
}

/// Decode a payload into a full reading with name/unit and timestamp
pub fn pid_reading(pid: &str, payload: &str) -> Option<PidReading> {
    let decoder = decoder_info(pid)?;
    let value = parse_pid(pid, payload)?;
    Some(PidReading {
        pid: decoder.pid.to_string(),
        name: decoder.name.to_string(),
        value,
        unit: Some(decoder.unit.to_string()),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("0C", "1AF8", 1726.0)]
    #[case("0C", "1A F8", 1726.0)]
    #[case("0D", "50", 80.0)]
    #[case("05", "64", 60.0)]
    #[case("0F", "28", 0.0)]
    #[case("42", "3039", 12.345)]
    #[case("11", "FF", 100.0)]
    fn decodes_formulas(#[case] pid: &str, #[case] payload: &str, #[case] expected: f64) {
        let value = parse_pid(pid, payload).unwrap();
        assert!((value - expected).abs() < 1e-9, "{pid}: {value} != {expected}");
    }

    #[test]
    fn rpm_reference_value() {
        // ((0x1A * 256) + 0xF8) / 4 = 1726
        assert_eq!(parse_pid("0C", "1AF8"), Some(1726.0));
    }

    #[test]
    fn case_insensitive_pid() {
        assert_eq!(parse_pid("0c", "1AF8"), parse_pid("0C", "1AF8"));
    }

    #[test]
    fn unknown_pid_is_absent() {
        assert_eq!(parse_pid("FF", "00"), None);
    }

    #[test]
    fn short_payload_is_absent() {
        assert_eq!(parse_pid("0C", "1A"), None);
        assert_eq!(parse_pid("0D", ""), None);
    }

    #[test]
    fn malformed_hex_is_absent() {
        assert_eq!(parse_pid("0D", "ZZ"), None);
    }

    #[test]
    fn reading_carries_metadata() {
        let reading = pid_reading("0C", "1AF8").unwrap();
        assert_eq!(reading.pid, "0C");
        assert_eq!(reading.name, "Engine RPM");
        assert_eq!(reading.unit.as_deref(), Some("rpm"));
        assert_eq!(reading.value, 1726.0);
    }

    #[test]
    fn registry_is_complete() {
        let pids = supported_pids();
        for expected in ["05", "0C", "0D", "0F", "11", "42"] {
            assert!(pids.contains(&expected), "missing {expected}");
        }
    }
}
