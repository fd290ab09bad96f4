//! Mode 01 PID 01 status decoding

use obd_core::{ObdStatus, ReadinessMonitors};

use crate::error::CodecError;
use crate::payload::{decode_hex_lenient, extract_payload};

/// Decode a `0101` response into MIL state, stored DTC count and
/// readiness monitors.
///
/// Byte A carries the MIL bit and the DTC count, byte B the continuous
/// monitor completeness bits and the ignition-type flag, bytes C/D the
/// availability and incompleteness masks for the non-continuous monitors.
/// A monitor is reported ready unless it is supported and still
/// incomplete.
pub fn decode_status(raw: &str) -> Result<ObdStatus, CodecError> {
    let payload = extract_payload(raw, "01", Some("01"))?;
    let bytes = decode_hex_lenient(&payload)?;
    if bytes.len() < 4 {
        return Err(CodecError::TruncatedPayload {
            what: "status (need A..D)",
            raw: payload,
        });
    }
    let (a, b, c, d) = (bytes[0], bytes[1], bytes[2], bytes[3]);

    let continuous_ready = |bit: u8| (b >> bit) & 1 == 0;
    let monitor_ready = |bit: u8| {
        let supported = (c >> bit) & 1 == 1;
        let incomplete = (d >> bit) & 1 == 1;
        !(supported && incomplete)
    };

    Ok(ObdStatus {
        mil_on: a & 0x80 != 0,
        dtc_count: a & 0x7F,
        spark_ignition: b & 0x08 == 0,
        readiness: ReadinessMonitors {
            misfire: continuous_ready(4),
            fuel_system: continuous_ready(5),
            components: continuous_ready(6),
            catalyst: monitor_ready(0),
            heated_catalyst: monitor_ready(1),
            evaporative_system: monitor_ready(2),
            secondary_air_system: monitor_ready(3),
            oxygen_sensor: monitor_ready(5),
            oxygen_sensor_heater: monitor_ready(6),
            egr_system: monitor_ready(7),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mil_off_no_dtcs_all_ready() {
        let status = decode_status("41 01 00 07 65 00\r>").unwrap();
        assert!(!status.mil_on);
        assert_eq!(status.dtc_count, 0);
        assert!(status.spark_ignition);
        assert!(status.readiness.misfire);
        assert!(status.readiness.catalyst);
        assert!(status.readiness.oxygen_sensor);
    }

    #[test]
    fn mil_on_with_stored_dtcs() {
        let status = decode_status("41 01 82 07 65 00\r>").unwrap();
        assert!(status.mil_on);
        assert_eq!(status.dtc_count, 2);
    }

    #[test]
    fn incomplete_supported_monitor_is_not_ready() {
        // C bit0 set (catalyst supported), D bit0 set (incomplete)
        let status = decode_status("41 01 00 07 01 01\r>").unwrap();
        assert!(!status.readiness.catalyst);
        // unsupported monitors do not block readiness
        assert!(status.readiness.egr_system);
    }

    #[test]
    fn compression_ignition_flag() {
        let status = decode_status("41 01 00 0F 65 00\r>").unwrap();
        assert!(!status.spark_ignition);
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(decode_status("41 01 00 07\r>").is_err());
    }
}
