//! Integration tests for the OBD diagnostic stack
//!
//! This crate contains end-to-end tests that exercise the full stack:
//! - Driver state machine and AT init sequence
//! - Codec (DTC/PID/status decoding) through the driver API
//! - Connection pool, self-check and the link supervisor
//!
//! Everything runs against the in-process scripted transport; no adapter
//! hardware is needed.
//!
//! # Test Structure
//!
//! - `e2e_test.rs` - Drive-cycle tests against a scripted adapter,
//!   including Prometheus export names
//! - `pool_e2e_test.rs` - Pool contention, timeout and shutdown behavior

// This crate only contains tests, no library code
