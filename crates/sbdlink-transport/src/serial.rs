//! Serial line handle for SBD modem communication.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for the modem's RS-232 / USB serial port.
//!
//! The Iridium 9602 family talks 19200 baud, 8 data bits, no parity, 1 stop
//! bit, and no flow control. On top of the byte stream the line discipline is
//! switched between canonical (line-buffered) input for AT text replies and
//! raw input for length-prefixed binary frames.
//!
//! # Example
//!
//! ```no_run
//! use sbdlink_core::transport::Transport;
//! use sbdlink_core::LineMode;
//! use sbdlink_transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> sbdlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyS12").await?;
//!
//! transport.send(b"AT+CSQ\r\n").await?;
//!
//! let mut buf = [0u8; 255];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//!
//! transport.set_mode(LineMode::Binary).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sbdlink_core::error::{Error, Result};
use sbdlink_core::transport::Transport;
use sbdlink_core::types::LineMode;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

/// Serial device used when none is given.
pub const DEFAULT_PORT: &str = "/dev/ttyS12";

/// Documented baud rate of the Iridium 9602.
pub const DEFAULT_BAUD: u32 = 19_200;

/// Upper bound on bytes delivered by a single read call.
pub const READ_CAP: usize = 255;

/// Serial port configuration.
///
/// The character format is fixed at 8 data bits, 1 stop bit, no parity and
/// no flow control, as the modem requires. Only the rate and the read
/// window are adjustable:
/// - 19200 baud
/// - 100 ms inter-character quiet window
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (the modem ships at 19200)
    pub baud_rate: u32,
    /// Quiet period after which a read returns whatever has arrived
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Serial line handle to the modem.
///
/// Owns the device exclusively for its lifetime and tracks the active
/// [`LineMode`]. A freshly opened handle is in [`LineMode::Text`] with its
/// input queue flushed.
pub struct SerialTransport {
    /// The underlying serial port stream
    port: Option<SerialStream>,
    /// Port name for logging/debugging
    port_name: String,
    /// Currently applied line discipline
    mode: LineMode,
}

impl SerialTransport {
    /// Open a serial port with the modem's default line parameters.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g. "/dev/ttyS12", "/dev/ttyUSB0")
    pub async fn open(port: &str) -> Result<Self> {
        Self::open_with_config(port, SerialConfig::default()).await
    }

    /// Open a serial port with full configuration control.
    ///
    /// Opens the device, applies the line parameters, enters text mode, and
    /// discards any stale input before returning.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            read_timeout_ms = config.read_timeout.as_millis(),
            "Opening serial port"
        );

        #[allow(unused_mut)]
        let mut serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        #[cfg(unix)]
        {
            if let Err(e) = serial_stream.set_exclusive(true) {
                tracing::warn!(port = %port, error = %e, "Failed to acquire exclusive access");
            }
        }

        let mut transport = Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
            mode: LineMode::Text,
        };
        transport.configure()?;
        transport.flush_input().await?;

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened successfully");

        Ok(transport)
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Apply the fixed line discipline and enter text mode.
    ///
    /// Ignores breaks and parity errors, disables software flow control and
    /// all output processing, and turns off echo and signal characters.
    fn configure(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let port = self.port.as_ref().ok_or(Error::NotConnected)?;
            let fd = port.as_raw_fd();
            termios::configure_line(fd)
                .and_then(|()| termios::apply_mode(fd, LineMode::Text))
                .map_err(|e| {
                    tracing::error!(port = %self.port_name, error = %e, "Failed to configure line discipline");
                    Error::Io(e)
                })?;
        }
        self.mode = LineMode::Text;
        Ok(())
    }
}

/// Map a read/write failure onto the library error type.
fn io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            io_error(e)
        })?;

        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            io_error(e)
        })?;

        // Block until the UART has shifted out the last byte.
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            termios::drain(port.as_raw_fd()).map_err(|e| {
                tracing::error!(port = %self.port_name, error = %e, "Failed to drain serial port");
                io_error(e)
            })?;
        }

        tracing::trace!(port = %self.port_name, "Data sent successfully");

        Ok(data.len())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let cap = buf.len().min(READ_CAP);

        let result = tokio::time::timeout(timeout, port.read(&mut buf[..cap])).await;

        match result {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(io_error(e))
            }
            Err(_) => {
                tracing::trace!(
                    port = %self.port_name,
                    timeout_ms = timeout.as_millis(),
                    "Quiet window elapsed"
                );
                Ok(0)
            }
        }
    }

    async fn set_mode(&mut self, mode: LineMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let port = self.port.as_ref().ok_or(Error::NotConnected)?;
            termios::apply_mode(port.as_raw_fd(), mode).map_err(|e| {
                tracing::error!(port = %self.port_name, %mode, error = %e, "Failed to switch line mode");
                Error::Io(e)
            })?;
        }
        #[cfg(not(unix))]
        {
            if self.port.is_none() {
                return Err(Error::NotConnected);
            }
        }

        tracing::debug!(port = %self.port_name, from = %self.mode, to = %mode, "Line mode switched");
        self.mode = mode;
        Ok(())
    }

    fn mode(&self) -> LineMode {
        self.mode
    }

    async fn flush_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.clear(ClearBuffer::Input).map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush input");
            Error::Transport(format!("Failed to flush input on {}: {}", self.port_name, e))
        })?;
        tracing::debug!(port = %self.port_name, "Input queue flushed");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

/// Thin wrappers over the termios calls `tokio-serial` does not expose.
#[cfg(unix)]
mod termios {
    use sbdlink_core::types::LineMode;
    use std::io;
    use std::mem::MaybeUninit;
    use std::os::unix::io::RawFd;

    fn get(fd: RawFd) -> io::Result<libc::termios> {
        let mut tio = MaybeUninit::<libc::termios>::uninit();
        // SAFETY: `tio` points to writable storage of the right size and `fd`
        // is an open terminal descriptor owned by the caller.
        let rc = unsafe { libc::tcgetattr(fd, tio.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: tcgetattr succeeded, so every field has been written.
        Ok(unsafe { tio.assume_init() })
    }

    fn set(fd: RawFd, tio: &libc::termios) -> io::Result<()> {
        // SAFETY: `tio` is a fully initialised termios and `fd` is open.
        let rc = unsafe { libc::tcsetattr(fd, libc::TCSANOW, tio) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn configure_line(fd: RawFd) -> io::Result<()> {
        let mut tio = get(fd)?;
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_iflag = libc::IGNPAR | libc::IGNBRK;
        tio.c_oflag = 0;
        tio.c_lflag = 0;
        set(fd, &tio)
    }

    pub(super) fn apply_mode(fd: RawFd, mode: LineMode) -> io::Result<()> {
        let mut tio = get(fd)?;
        match mode {
            LineMode::Text => tio.c_lflag |= libc::ICANON,
            LineMode::Binary => tio.c_lflag &= !libc::ICANON,
        }
        set(fd, &tio)
    }

    pub(super) fn drain(fd: RawFd) -> io::Result<()> {
        // SAFETY: `fd` is an open terminal descriptor.
        let rc = unsafe { libc::tcdrain(fd) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 19_200);
        assert_eq!(config.read_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_serial_config_only_rate_and_window() {
        let config = SerialConfig {
            baud_rate: 9_600,
            read_timeout: Duration::from_millis(20),
        };
        let rendered = format!("{config:?}");
        assert_eq!(
            rendered,
            "SerialConfig { baud_rate: 9600, read_timeout: 20ms }"
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(io_error(broken), Error::ConnectionLost));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "eio");
        assert!(matches!(io_error(other), Error::Io(_)));
    }

    #[tokio::test]
    async fn test_open_missing_device_fails() {
        let result = SerialTransport::open("/dev/sbdlink-does-not-exist").await;
        match result {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("opening a missing device must fail"),
        }
    }
}
