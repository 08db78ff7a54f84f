//! ModemBuilder -- fluent builder for constructing [`SbdModem`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, read budgets, and retry policy before the
//! device is opened.
//!
//! # Example
//!
//! ```no_run
//! use sbdlink_at::builder::ModemBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> sbdlink_core::Result<()> {
//! let mut modem = ModemBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_secs(5))
//!     .build()
//!     .await?;
//! let imei = modem.imei().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use sbdlink_core::error::Result;
use sbdlink_core::transport::Transport;
use sbdlink_transport::{SerialConfig, SerialTransport, DEFAULT_PORT};

use crate::io::{AtTransceiver, IoConfig};
use crate::modem::SbdModem;

/// Fluent builder for [`SbdModem`].
///
/// Every setting has a default matching the modem's documented line
/// parameters and command timing, so the simplest usage is:
///
/// ```ignore
/// let modem = ModemBuilder::new().build().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ModemBuilder {
    serial_port: String,
    serial: SerialConfig,
    io: IoConfig,
    max_retries: u32,
    initialize: bool,
}

impl Default for ModemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemBuilder {
    pub fn new() -> Self {
        ModemBuilder {
            serial_port: DEFAULT_PORT.to_string(),
            serial: SerialConfig::default(),
            io: IoConfig::default(),
            max_retries: 1,
            initialize: true,
        }
    }

    /// Set the serial device path (default `/dev/ttyS12`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = port.to_string();
        self
    }

    /// Override the baud rate (default 19200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial.baud_rate = baud;
        self
    }

    /// Set the quiet window of a single read (default: 100ms). Also used as
    /// the serial driver's read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.serial.read_timeout = timeout;
        self.io.read_timeout = timeout;
        self
    }

    /// Set how many consecutive quiet windows a started reply may stall
    /// before it is declared timed out (default: 20, minimum 1).
    pub fn max_idle_reads(mut self, n: u32) -> Self {
        self.io.max_idle_reads = n.max(1);
        self
    }

    /// Set the wall-clock budget for ordinary commands (default: 10s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.io.command_timeout = timeout;
        self
    }

    /// Set the wall-clock budget for `+SBDIX` sessions (default: 65s).
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.io.session_timeout = timeout;
        self
    }

    /// Set how many times a timed-out or corrupted idempotent command is
    /// repeated (default: 1).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Send the line setup string after connecting (default: true).
    pub fn initialize(mut self, enabled: bool) -> Self {
        self.initialize = enabled;
        self
    }

    /// Build an [`SbdModem`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `sbdlink-test-harness`).
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<SbdModem> {
        let mut modem = SbdModem::new(AtTransceiver::new(transport, self.io), self.max_retries);
        if self.initialize {
            modem.initialize().await?;
        }
        Ok(modem)
    }

    /// Open the serial device and build an [`SbdModem`] on it.
    pub async fn build(self) -> Result<SbdModem> {
        let transport =
            SerialTransport::open_with_config(&self.serial_port, self.serial.clone()).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
