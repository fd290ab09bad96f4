//! Response text normalization

/// Normalize a raw adapter response for matching and extraction.
///
/// Strips CR/LF, the trailing `>` prompt and all whitespace, then
/// upper-cases. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_response(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '>' && *c != '\0')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
