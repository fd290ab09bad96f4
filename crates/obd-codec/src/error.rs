//! Codec errors

use obd_core::ObdError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("response is empty")]
    EmptyResponse,

    #[error("expected mode echo {expected} not found in {raw:?}")]
    MissingModeEcho { expected: String, raw: String },

    #[error("invalid hex in {raw:?}")]
    InvalidHex { raw: String },

    #[error("payload too short for {what}: {raw:?}")]
    TruncatedPayload { what: &'static str, raw: String },
}

impl From<CodecError> for ObdError {
    fn from(err: CodecError) -> Self {
        let raw = match &err {
            CodecError::EmptyResponse => String::new(),
            CodecError::MissingModeEcho { raw, .. }
            | CodecError::InvalidHex { raw }
            | CodecError::TruncatedPayload { raw, .. } => raw.clone(),
        };
        ObdError::Parse {
            reason: err.to_string(),
            raw,
        }
    }
}
