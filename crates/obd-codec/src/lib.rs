//! obd-codec - Pure ELM327 / SAE J1979 codec
//!
//! Everything here is synchronous and side-effect free: text normalization
//! of adapter responses, protocol fault detection, payload extraction, DTC
//! bit-decoding, the Mode 01 PID decoder registry and status decoding, and
//! the built-in DTC description catalog.
//!
//! The driver crate owns all I/O; this crate never sees a transport.

mod catalog;
mod dtc;
mod error;
mod fault;
mod normalize;
mod payload;
mod pid;
mod status;

pub use catalog::{describe_dtc, DtcDescription};
pub use dtc::{decode_dtc_frame, decode_dtc_pair};
pub use error::CodecError;
pub use fault::{detect_fault, ProtocolFault};
pub use normalize::normalize_response;
pub use payload::extract_payload;
pub use pid::{decoder_info, parse_pid, pid_reading, supported_pids, PidDecoder};
pub use status::decode_status;
