//! Adapter/vehicle fault token detection

use obd_core::ObdError;

use crate::normalize::normalize_response;

/// Fault token the adapter can emit instead of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFault {
    /// "NO DATA" - vehicle did not answer the request
    NoData,
    /// "UNABLE TO CONNECT" - adapter cannot reach the vehicle
    UnableToConnect,
    /// "BUS INIT ERROR" - legacy bus initialization failed
    BusInitError,
    /// "CAN ERROR" - CAN-level fault, usually wrong protocol
    CanError,
    /// "STOPPED" - adapter aborted, link is going away
    Stopped,
    /// "BUFFER FULL" - adapter receive buffer overran
    BufferFull,
    /// "?" - adapter did not understand the command
    Unrecognized,
    /// bare "ERROR"
    GenericError,
}

impl ProtocolFault {
    /// The token as the adapter prints it
    pub fn token(&self) -> &'static str {
        match self {
            Self::NoData => "NO DATA",
            Self::UnableToConnect => "UNABLE TO CONNECT",
            Self::BusInitError => "BUS INIT ERROR",
            Self::CanError => "CAN ERROR",
            Self::Stopped => "STOPPED",
            Self::BufferFull => "BUFFER FULL",
            Self::Unrecognized => "?",
            Self::GenericError => "ERROR",
        }
    }

    /// Map the fault to the engine error taxonomy for a given command
    pub fn to_error(self, command: &str) -> ObdError {
        match self {
            Self::NoData => ObdError::NoData {
                command: command.to_string(),
            },
            Self::UnableToConnect => {
                ObdError::VehicleUnreachable(format!("adapter reported UNABLE TO CONNECT for '{command}'"))
            }
            Self::BusInitError => {
                ObdError::BusInit(format!("adapter reported BUS INIT ERROR for '{command}'"))
            }
            Self::CanError => {
                ObdError::ProtocolSelection(format!("adapter reported CAN ERROR for '{command}'"))
            }
            Self::Stopped => {
                ObdError::TransportClosed(format!("adapter reported STOPPED for '{command}'"))
            }
            Self::BufferFull => {
                ObdError::Transport(format!("adapter buffer overrun for '{command}'"))
            }
            Self::Unrecognized | Self::GenericError => ObdError::CommandRejected {
                command: command.to_string(),
                response: self.token().to_string(),
            },
        }
    }
}

/// Check a raw or normalized response for a fault token.
///
/// Specific multi-word tokens are checked before the bare `ERROR`
/// fallback so "BUS INIT ERROR" is not misreported as a generic error.
pub fn detect_fault(response: &str) -> Option<ProtocolFault> {
    let n = normalize_response(response);
    if n.is_empty() {
        return None;
    }
    if n.contains("NODATA") {
        Some(ProtocolFault::NoData)
    } else if n.contains("UNABLETOCONNECT") {
        Some(ProtocolFault::UnableToConnect)
    } else if n.contains("BUSINITERROR") {
        Some(ProtocolFault::BusInitError)
    } else if n.contains("CANERROR") {
        Some(ProtocolFault::CanError)
    } else if n.contains("STOPPED") {
        Some(ProtocolFault::Stopped)
    } else if n.contains("BUFFERFULL") {
        Some(ProtocolFault::BufferFull)
    } else if n.contains('?') {
        Some(ProtocolFault::Unrecognized)
    } else if n.contains("ERROR") {
        Some(ProtocolFault::GenericError)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("NO DATA\r>", ProtocolFault::NoData)]
    #[case("UNABLE TO CONNECT", ProtocolFault::UnableToConnect)]
    #[case("BUS INIT ERROR", ProtocolFault::BusInitError)]
    #[case("CAN ERROR", ProtocolFault::CanError)]
    #[case("STOPPED", ProtocolFault::Stopped)]
    #[case("?", ProtocolFault::Unrecognized)]
    #[case("ERROR", ProtocolFault::GenericError)]
    fn detects_tokens(#[case] raw: &str, #[case] expected: ProtocolFault) {
        assert_eq!(detect_fault(raw), Some(expected));
    }

    #[test]
    fn specific_tokens_win_over_generic_error() {
        assert_eq!(detect_fault("BUS INIT ERROR"), Some(ProtocolFault::BusInitError));
        assert_eq!(detect_fault("CAN ERROR"), Some(ProtocolFault::CanError));
    }

    #[test]
    fn data_is_not_a_fault() {
        assert_eq!(detect_fault("41 0C 1A F8"), None);
        assert_eq!(detect_fault("OK"), None);
        assert_eq!(detect_fault("ELM327 v1.5"), None);
    }

    #[test]
    fn fault_error_mapping() {
        let err = ProtocolFault::CanError.to_error("0100");
        assert_eq!(err.code(), "protocol_selection_failed");
        let err = ProtocolFault::NoData.to_error("010C");
        assert_eq!(err.code(), "no_data");
        let err = ProtocolFault::Stopped.to_error("03");
        assert_eq!(err.code(), "transport_closed");
    }
}
