//! OBD protocol identifiers and per-make protocol profiles

use serde::{Deserialize, Serialize};

/// Protocol as selectable via `ATSP<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// ATSP0 - let the adapter search
    #[serde(rename = "auto")]
    Auto,
    /// ATSP1 - SAE J1850 PWM (41.6 kbps)
    #[serde(rename = "sae-j1850-pwm")]
    SaeJ1850Pwm,
    /// ATSP2 - SAE J1850 VPW (10.4 kbps)
    #[serde(rename = "sae-j1850-vpw")]
    SaeJ1850Vpw,
    /// ATSP3 - ISO 9141-2 (5 baud init)
    #[serde(rename = "iso9141-2")]
    Iso9141_2,
    /// ATSP4 - KWP2000 / ISO 14230-4 (5 baud init)
    #[serde(rename = "kwp2000-slow")]
    Kwp2000Slow,
    /// ATSP5 - KWP2000 / ISO 14230-4 (fast init)
    #[serde(rename = "kwp2000-fast")]
    Kwp2000Fast,
    /// ATSP6 - ISO 15765-4 CAN, 11-bit id, 500 kbps
    #[serde(rename = "can-11bit-500k")]
    Can11Bit500k,
    /// ATSP7 - ISO 15765-4 CAN, 29-bit id, 500 kbps
    #[serde(rename = "can-29bit-500k")]
    Can29Bit500k,
}

impl ObdProtocol {
    /// The AT command that selects this protocol
    pub fn at_command(&self) -> &'static str {
        match self {
            Self::Auto => "ATSP0",
            Self::SaeJ1850Pwm => "ATSP1",
            Self::SaeJ1850Vpw => "ATSP2",
            Self::Iso9141_2 => "ATSP3",
            Self::Kwp2000Slow => "ATSP4",
            Self::Kwp2000Fast => "ATSP5",
            Self::Can11Bit500k => "ATSP6",
            Self::Can29Bit500k => "ATSP7",
        }
    }

    /// Friendly display name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::SaeJ1850Pwm => "SAE J1850 PWM",
            Self::SaeJ1850Vpw => "SAE J1850 VPW",
            Self::Iso9141_2 => "ISO 9141-2",
            Self::Kwp2000Slow => "KWP2000 (5 baud init)",
            Self::Kwp2000Fast => "KWP2000 (fast init)",
            Self::Can11Bit500k => "ISO 15765-4 CAN (11/500)",
            Self::Can29Bit500k => "ISO 15765-4 CAN (29/500)",
        }
    }
}

/// Per-make protocol priority list with optional extra init commands
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolProfile {
    pub name: &'static str,
    pub display_name: &'static str,
    /// Protocols to try, in order
    pub protocols: Vec<ObdProtocol>,
    /// Extra AT commands sent before protocol selection
    pub init_commands: Vec<&'static str>,
}

impl ProtocolProfile {
    /// A profile that tries exactly one protocol
    pub fn single(protocol: ObdProtocol) -> Self {
        Self {
            name: "explicit",
            display_name: "Explicit protocol",
            protocols: vec![protocol],
            init_commands: Vec::new(),
        }
    }
}

/// Resolve a profile by name; unknown or absent names fall back to `auto`.
pub fn profile(name: Option<&str>) -> ProtocolProfile {
    use ObdProtocol::*;
    let key = name.map(|n| n.trim().to_ascii_lowercase());
    match key.as_deref() {
        Some("toyota_lexus") => ProtocolProfile {
            name: "toyota_lexus",
            display_name: "Toyota / Lexus",
            protocols: vec![Can11Bit500k, Iso9141_2, Kwp2000Slow, Kwp2000Fast],
            init_commands: vec!["ATCAF0"],
        },
        Some("honda") => ProtocolProfile {
            name: "honda",
            display_name: "Honda / Acura",
            protocols: vec![Can11Bit500k, Kwp2000Fast],
            init_commands: Vec::new(),
        },
        Some("nissan") => ProtocolProfile {
            name: "nissan",
            display_name: "Nissan / Infiniti",
            protocols: vec![Can11Bit500k, Kwp2000Fast, Iso9141_2],
            init_commands: Vec::new(),
        },
        Some("gm") => ProtocolProfile {
            name: "gm",
            display_name: "General Motors",
            protocols: vec![Can11Bit500k, SaeJ1850Vpw],
            init_commands: Vec::new(),
        },
        Some("ford") => ProtocolProfile {
            name: "ford",
            display_name: "Ford / Lincoln / Mercury",
            protocols: vec![Can11Bit500k, SaeJ1850Pwm],
            init_commands: Vec::new(),
        },
        Some("european") => ProtocolProfile {
            name: "european",
            display_name: "European (VW, BMW, Mercedes)",
            protocols: vec![Can11Bit500k, Kwp2000Fast, Iso9141_2],
            init_commands: Vec::new(),
        },
        _ => ProtocolProfile {
            name: "auto",
            display_name: "Automatic (universal)",
            protocols: vec![Auto],
            init_commands: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn at_commands() {
        assert_eq!(ObdProtocol::Auto.at_command(), "ATSP0");
        assert_eq!(ObdProtocol::Can11Bit500k.at_command(), "ATSP6");
        assert_eq!(ObdProtocol::SaeJ1850Pwm.at_command(), "ATSP1");
    }

    #[test]
    fn unknown_profile_falls_back_to_auto() {
        assert_eq!(profile(Some("unknown-make")).name, "auto");
        assert_eq!(profile(None).name, "auto");
    }

    #[test]
    fn toyota_prefers_can() {
        let p = profile(Some("Toyota_Lexus"));
        assert_eq!(p.protocols[0], ObdProtocol::Can11Bit500k);
        assert_eq!(p.init_commands, vec!["ATCAF0"]);
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&ObdProtocol::Can11Bit500k).unwrap();
        assert_eq!(json, "\"can-11bit-500k\"");
        let back: ObdProtocol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ObdProtocol::Can11Bit500k);
    }
}
