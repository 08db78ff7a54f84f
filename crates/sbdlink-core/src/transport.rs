//! Transport trait for modem communication.
//!
//! The [`Transport`] trait abstracts over the serial line to the modem. The
//! AT transceiver in `sbdlink-at` operates on a `Transport` rather than on a
//! serial port directly, so the same protocol code runs against real
//! hardware (`SerialTransport`) and against `MockTransport` from the
//! `sbdlink-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::LineMode;

/// Byte-level, half-duplex link to a modem.
///
/// Exactly one owner drives a transport, one command at a time; every
/// method takes `&mut self`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` and wait until the driver has drained it onto the
    /// wire. Returns the number of bytes written.
    ///
    /// The modem starts timing its response window at the end of
    /// transmission, so implementations must not return early.
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever the modem delivers within one quiet window.
    ///
    /// Returns between `0` and `buf.len()` bytes. `Ok(0)` means the window
    /// elapsed with no data; it is not an error, and callers must loop and
    /// accumulate rather than expect a whole reply from one call.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Switch the line discipline between canonical text and raw binary.
    ///
    /// Setting the current mode again is a no-op. Bytes already buffered by
    /// the driver are kept.
    async fn set_mode(&mut self, mode: LineMode) -> Result<()>;

    /// The currently active line discipline.
    fn mode(&self) -> LineMode;

    /// Discard any unread input (e.g. echo left over from modem power-up).
    async fn flush_input(&mut self) -> Result<()>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent calls should return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
