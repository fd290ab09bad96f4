//! DTC bit-decoding (Mode 03)

use obd_core::{DtcCategory, DtcEntry};

use crate::catalog::describe_dtc;
use crate::error::CodecError;
use crate::payload::{decode_hex_lenient, extract_payload};

/// Decode one raw DTC byte pair into its textual code.
///
/// Returns `None` for the `00 00` padding pair used to fill frames.
///
/// Layout of the first byte: bits 7..6 category, bits 5..4 first digit,
/// bits 3..0 second digit; the second byte holds the last two digits as
/// nibbles.
pub fn decode_dtc_pair(b1: u8, b2: u8) -> Option<String> {
    if b1 == 0 && b2 == 0 {
        return None;
    }
    let category = DtcCategory::from_bits(b1 >> 6);
    Some(format!(
        "{}{}{:X}{:X}{:X}",
        category.prefix(),
        (b1 >> 4) & 0x03,
        b1 & 0x0F,
        b2 >> 4,
        b2 & 0x0F
    ))
}

/// Decode a full Mode 03 response into catalog-enriched entries.
///
/// Handles both framings seen in the wild: ISO 15765-4 replies carry a
/// count byte after the `43` echo, legacy replies go straight into byte
/// pairs. The count byte is recognized only when it matches the number of
/// complete pairs that follow. Output is sorted and de-duplicated.
pub fn decode_dtc_frame(raw: &str) -> Result<Vec<DtcEntry>, CodecError> {
    let payload = extract_payload(raw, "03", None)?;
    let bytes = decode_hex_lenient(&payload)?;

    let mut data = bytes.as_slice();
    if let Some((&first, rest)) = data.split_first() {
        if rest.len() % 2 == 0 && usize::from(first) == rest.len() / 2 {
            data = rest;
        }
    }

    let mut entries: Vec<DtcEntry> = data
        .chunks_exact(2)
        .filter_map(|pair| {
            let code = decode_dtc_pair(pair[0], pair[1])?;
            let info = describe_dtc(&code);
            Some(DtcEntry {
                category: DtcCategory::from_bits(pair[0] >> 6),
                raw: [pair[0], pair[1]],
                description: Some(info.description),
                severity: Some(info.severity),
                code,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.code.cmp(&b.code));
    entries.dedup_by(|a, b| a.code == b.code);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0x01, 0x33, "P0133")]
    #[case(0x00, 0x44, "P0044")]
    #[case(0x41, 0x21, "C0121")]
    #[case(0x81, 0x01, "B0101")]
    #[case(0xC1, 0x00, "U0100")]
    #[case(0x2A, 0xFF, "P2AFF")]
    fn decodes_pairs(#[case] b1: u8, #[case] b2: u8, #[case] expected: &str) {
        assert_eq!(decode_dtc_pair(b1, b2).as_deref(), Some(expected));
    }

    #[test]
    fn padding_pair_is_skipped() {
        assert_eq!(decode_dtc_pair(0x00, 0x00), None);
    }

    #[test]
    fn legacy_frame_without_count_byte() {
        let dtcs = decode_dtc_frame("43 01 33 00 44 00 00 00\r>").unwrap();
        let codes: Vec<&str> = dtcs.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["P0044", "P0133"]);
    }

    #[test]
    fn can_frame_with_count_byte() {
        let dtcs = decode_dtc_frame("43 02 01 33 00 44\r>").unwrap();
        let codes: Vec<&str> = dtcs.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["P0044", "P0133"]);
    }

    #[test]
    fn empty_dtc_set() {
        assert!(decode_dtc_frame("43 00\r>").unwrap().is_empty());
        assert!(decode_dtc_frame("43 00 00 00 00 00 00\r>").unwrap().is_empty());
    }

    #[test]
    fn output_is_sorted() {
        let dtcs = decode_dtc_frame("43 04 20 C1 00 01 33\r>").unwrap();
        let codes: Vec<&str> = dtcs.iter().map(|d| d.code.as_str()).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn known_code_gets_description() {
        let dtcs = decode_dtc_frame("43 01 33 00 00 00 00 00\r>").unwrap();
        assert_eq!(dtcs.len(), 1);
        assert!(dtcs[0].description.is_some());
        assert!(dtcs[0].severity.is_some());
    }
}
