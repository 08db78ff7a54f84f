//! # sbdlink -- Command/response transport for Iridium SBD modems
//!
//! `sbdlink` is an asynchronous Rust library for driving Iridium
//! short-burst-data (SBD) modems such as the 9602/9603 over a serial line.
//! It sends AT commands, reads line-oriented and binary replies, verifies
//! binary frames, and exposes the modem verbs (query, session, write, read,
//! clear, copy) as typed async methods.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sbdlink::{BufferTarget, ModemBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut modem = ModemBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     modem.write_binary(b"position report").await?;
//!     let session = modem.open_session().await?;
//!     println!("MO status {}: {}", session.mo_status, session.mo_status_text());
//!     if session.mt_received() {
//!         let message = modem.read_binary().await?;
//!         println!("received {} bytes", message.len());
//!     }
//!     modem.clear_buffers(BufferTarget::Both).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `sbdlink-core`          | [`Transport`] trait, typed results, errors       |
//! | `sbdlink-transport`     | Serial line handle with text/binary mode switch  |
//! | `sbdlink-at`            | Frame codec, grammar table, transceiver, verbs   |
//! | **`sbdlink`**           | This facade crate -- re-exports everything       |
//!
//! ## Errors
//!
//! Every operation returns [`Result`]. [`Error::kind`] collapses the error
//! into one of five classes ([`ErrorKind`]): I/O failure (the link is
//! closed), timeout and checksum mismatch (retryable), protocol error, and
//! length error (rejected before any I/O).

pub use sbdlink_core::*;

pub use sbdlink_at::{AtTransceiver, IoConfig, ModemBuilder, Reply, SbdModem};

/// Serial line handle.
pub mod transport {
    pub use sbdlink_transport::*;
}

/// AT protocol engine: frame codec, text normalizer, command table,
/// transceiver, and modem verbs.
pub mod at {
    pub use sbdlink_at::*;
}

/// Open the modem on `port` with default settings and send the init string.
pub async fn open(port: &str) -> Result<SbdModem> {
    ModemBuilder::new().serial_port(port).build().await
}
