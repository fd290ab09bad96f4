//! Payload extraction from positive responses

use crate::error::CodecError;
use crate::normalize::normalize_response;

/// Compute the positive response echo for a request mode ("01" -> "41").
fn mode_echo(mode: &str) -> Result<String, CodecError> {
    let value = u8::from_str_radix(mode, 16).map_err(|_| CodecError::InvalidHex {
        raw: mode.to_string(),
    })?;
    Ok(format!("{:02X}", value.wrapping_add(0x40)))
}

/// Extract the hex payload that follows the mode echo (and PID echo, when
/// given) from an adapter response.
///
/// Works line by line so multi-frame responses concatenate: each line is
/// normalized, searched for the echo, and everything after the echo is
/// appended. CAN arbitration headers and ISO-TP length prefixes before the
/// echo are skipped by searching rather than assuming a fixed offset.
pub fn extract_payload(raw: &str, mode: &str, pid: Option<&str>) -> Result<String, CodecError> {
    let needle = match pid {
        Some(p) => format!("{}{}", mode_echo(mode)?, p.to_ascii_uppercase()),
        None => mode_echo(mode)?,
    };

    let mut payload = String::new();
    let mut seen_any_text = false;
    for line in raw.lines() {
        let n = normalize_response(line);
        if n.is_empty() {
            continue;
        }
        seen_any_text = true;
        if let Some(idx) = n.find(&needle) {
            payload.push_str(&n[idx + needle.len()..]);
        }
    }

    if !seen_any_text {
        return Err(CodecError::EmptyResponse);
    }
    if payload.is_empty() {
        return Err(CodecError::MissingModeEcho {
            expected: needle,
            raw: normalize_response(raw),
        });
    }
    Ok(payload)
}

/// Hex-decode a normalized payload, tolerating a trailing stray nibble
/// (some clones pad frames with an odd character count).
pub(crate) fn decode_hex_lenient(payload: &str) -> Result<Vec<u8>, CodecError> {
    if !payload.is_ascii() {
        return Err(CodecError::InvalidHex {
            raw: payload.to_string(),
        });
    }
    let even = &payload[..payload.len() - payload.len() % 2];
    even.as_bytes()
        .chunks_exact(2)
        .map(|chunk| {
            let s = std::str::from_utf8(chunk).map_err(|_| CodecError::InvalidHex {
                raw: payload.to_string(),
            })?;
            u8::from_str_radix(s, 16).map_err(|_| CodecError::InvalidHex {
                raw: payload.to_string(),
            })
        })
        .collect()
}
