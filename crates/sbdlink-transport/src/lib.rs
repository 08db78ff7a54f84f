//! Serial line handle for sbdlink.
//!
//! This crate provides [`SerialTransport`], the concrete implementation of
//! the [`Transport`](sbdlink_core::Transport) trait from `sbdlink-core` for the
//! modem's serial port: fixed 19200 8N1 line parameters, canonical/raw mode
//! switching, drained writes, and quiet-window reads.
//!
//! # Example
//!
//! ```no_run
//! use sbdlink_core::transport::Transport;
//! use sbdlink_transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> sbdlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyS12").await?;
//! transport.send(b"AT+CGSN\r\n").await?;
//!
//! let mut buf = [0u8; 255];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialTransport, DEFAULT_BAUD, DEFAULT_PORT, READ_CAP};
