//! Diagnostic trouble code types

use serde::{Deserialize, Serialize};

/// DTC system category (SAE J2012), encoded in bits 7..6 of the first
/// raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcCategory {
    /// Powertrain (P)
    Powertrain,
    /// Chassis (C)
    Chassis,
    /// Body (B)
    Body,
    /// Network/communication (U)
    Network,
}

impl DtcCategory {
    /// Category from the top two bits of the first DTC byte
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Powertrain,
            1 => Self::Chassis,
            2 => Self::Body,
            _ => Self::Network,
        }
    }

    /// Letter prefix for the textual code
    pub fn prefix(&self) -> char {
        match self {
            Self::Powertrain => 'P',
            Self::Chassis => 'C',
            Self::Body => 'B',
            Self::Network => 'U',
        }
    }
}

/// Indicative severity from the built-in description catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A decoded diagnostic trouble code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcEntry {
    /// Textual code, e.g. "P0133"
    pub code: String,
    /// System category derived from the code prefix
    pub category: DtcCategory,
    /// Raw two-byte encoding as received from the ECU
    pub raw: [u8; 2],
    /// Human-readable description, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Indicative severity, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<DtcSeverity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_bits() {
        assert_eq!(DtcCategory::from_bits(0), DtcCategory::Powertrain);
        assert_eq!(DtcCategory::from_bits(1), DtcCategory::Chassis);
        assert_eq!(DtcCategory::from_bits(2), DtcCategory::Body);
        assert_eq!(DtcCategory::from_bits(3), DtcCategory::Network);
    }

    #[test]
    fn category_prefixes() {
        assert_eq!(DtcCategory::Powertrain.prefix(), 'P');
        assert_eq!(DtcCategory::Network.prefix(), 'U');
    }
}
