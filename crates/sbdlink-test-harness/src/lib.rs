//! sbdlink-test-harness: Test utilities and mock transports for sbdlink.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the AT transceiver and modem verbs without a real modem attached.

pub mod mock_serial;

pub use mock_serial::MockTransport;
