//! SbdModem -- the modem verbs built on the AT transceiver.
//!
//! Each verb is one command cycle (two for the `READY`-prompted writes)
//! followed by one grammar parse. Retry policy lives here: idempotent
//! queries and reads are repeated on timeout or checksum mismatch, binary
//! writes are repeated as a whole cycle when the modem reports a checksum
//! mismatch, and session initiation is never repeated. Any I/O failure
//! closes the link.

use tracing::{debug, info, warn};

use sbdlink_core::error::{Error, ErrorKind, Result};
use sbdlink_core::types::{BufferTarget, Geolocation, ModemInfo, SbdStatus, SessionResult};

use crate::commands::{self, Command, ResponseShape};
use crate::frame::{validate_length, Frame, MAX_PAYLOAD};
use crate::io::{AtTransceiver, Payload, Reply};
use crate::text::READY;

/// `+SBDWT` / `+SBDWB` data-phase result codes.
const WRITE_OK: i64 = 0;
const WRITE_TIMEOUT: i64 = 1;
const WRITE_BAD_CHECKSUM: i64 = 2;
const WRITE_BAD_LENGTH: i64 = 3;

/// A connected SBD modem.
///
/// Constructed via [`ModemBuilder`](crate::builder::ModemBuilder). Exactly one
/// command is in flight at a time; every verb takes `&mut self`.
pub struct SbdModem {
    io: AtTransceiver,
    max_retries: u32,
}

impl SbdModem {
    pub(crate) fn new(io: AtTransceiver, max_retries: u32) -> Self {
        SbdModem { io, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_connected(&self) -> bool {
        self.io.is_connected()
    }

    /// One command cycle. Fatal errors close the link before returning.
    async fn run(&mut self, cmd: &Command) -> Result<Reply> {
        let result = self.io.execute(cmd).await;
        if let Err(e) = &result {
            self.close_on_fatal(e).await;
        }
        result
    }

    /// One command cycle, repeated up to `max_retries` times on timeout or
    /// checksum mismatch. Only for commands that do not change modem state.
    async fn run_with_retry(&mut self, cmd: &Command) -> Result<Reply> {
        let mut attempt = 0;
        loop {
            match self.run(cmd).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(command = cmd.text(), attempt, error = %e, "retrying command");
                    self.io.flush_input().await?;
                }
                other => return other,
            }
        }
    }

    async fn close_on_fatal(&mut self, e: &Error) {
        if e.is_fatal() && self.io.is_connected() {
            warn!(error = %e, "I/O failure, closing modem link");
            if let Err(close_err) = self.io.close().await {
                debug!(error = %close_err, "error while closing modem link");
            }
        }
    }

    /// Send the line setup string and discard anything the modem echoed.
    pub async fn initialize(&mut self) -> Result<()> {
        debug!("initializing modem");
        self.io.flush_input().await?;
        self.run(&commands::cmd_init()).await?;
        self.io.flush_input().await
    }

    pub async fn firmware_revision(&mut self) -> Result<String> {
        self.run_with_retry(&commands::cmd_firmware_revision())
            .await?
            .into_text()
    }

    pub async fn product_family(&mut self) -> Result<String> {
        self.run_with_retry(&commands::cmd_product_family())
            .await?
            .into_text()
    }

    pub async fn hardware_spec(&mut self) -> Result<String> {
        self.run_with_retry(&commands::cmd_hardware_spec())
            .await?
            .into_text()
    }

    pub async fn imei(&mut self) -> Result<String> {
        self.run_with_retry(&commands::cmd_imei()).await?.into_text()
    }

    /// Signal quality, 0 (none) to 5 (best).
    pub async fn signal_quality(&mut self) -> Result<u8> {
        let text = self
            .run_with_retry(&commands::cmd_signal_quality())
            .await?
            .into_text()?;
        commands::parse_signal_quality(&text)
    }

    /// Name of the gateway the modem is provisioned for.
    pub async fn gateway(&mut self) -> Result<String> {
        let text = self
            .run_with_retry(&commands::cmd_gateway())
            .await?
            .into_text()?;
        commands::parse_gateway(&text)
    }

    /// Last known position; `None` without a fix.
    pub async fn geolocation(&mut self) -> Result<Option<Geolocation>> {
        let text = self
            .run_with_retry(&commands::cmd_geolocation())
            .await?
            .into_text()?;
        commands::parse_geolocation(&text)
    }

    /// Iridium system time in 90 ms ticks; `None` without network service.
    pub async fn system_time(&mut self) -> Result<Option<u32>> {
        let text = self
            .run_with_retry(&commands::cmd_system_time())
            .await?
            .into_text()?;
        commands::parse_system_time(&text)
    }

    /// Buffer status (`+SBDS`).
    pub async fn status(&mut self) -> Result<SbdStatus> {
        let text = self
            .run_with_retry(&commands::cmd_status())
            .await?
            .into_text()?;
        commands::parse_status(&text)
    }

    /// Buffer status with ring alert and gateway queue (`+SBDSX`).
    pub async fn extended_status(&mut self) -> Result<SbdStatus> {
        let text = self
            .run_with_retry(&commands::cmd_extended_status())
            .await?
            .into_text()?;
        commands::parse_status(&text)
    }

    /// Run an SBD session: send the MO buffer, fetch any MT message.
    ///
    /// Never retried here. A failed MO transfer is reported through
    /// [`SessionResult::mo_status`], not as an error.
    pub async fn open_session(&mut self) -> Result<SessionResult> {
        info!("initiating SBD session");
        let text = self
            .run(&commands::cmd_initiate_session())
            .await?
            .into_text()?;
        let result = commands::parse_session(&text)?;
        if result.mo_succeeded() {
            info!(momsn = result.momsn, mt_status = result.mt_status, "session complete");
        } else {
            warn!(
                mo_status = result.mo_status,
                reason = result.mo_status_text(),
                "MO transfer failed"
            );
        }
        Ok(result)
    }

    /// Issue a `READY`-prompted write command.
    async fn expect_ready(&mut self, cmd: &Command) -> Result<()> {
        let text = self.run(cmd).await?.into_text()?;
        if text != READY {
            return Err(Error::protocol(
                format!("expected {READY}, got {text:?}"),
                text.as_bytes(),
            ));
        }
        Ok(())
    }

    /// Run the data phase of a write and return the modem's result code.
    async fn write_payload(&mut self, payload: Payload<'_>, expects: ResponseShape) -> Result<i64> {
        let result = self.io.send_payload(payload, expects).await;
        if let Err(e) = &result {
            self.close_on_fatal(e).await;
        }
        let text = result?.into_text()?;
        // A bare OK carries no result code.
        if text.is_empty() {
            return Ok(WRITE_OK);
        }
        commands::parse_result_code(&text)
    }

    /// Write a text message (at most 340 bytes, no CR/LF) to the MO buffer.
    pub async fn write_text(&mut self, message: &str) -> Result<()> {
        validate_length(message.len())?;
        if message.contains(|c: char| c == '\r' || c == '\n') {
            return Err(Error::protocol(
                "text message must not contain CR or LF",
                message.as_bytes(),
            ));
        }

        self.expect_ready(&commands::cmd_write_text()).await?;
        let code = self
            .write_payload(Payload::Text(message.as_bytes()), ResponseShape::PlainText)
            .await?;
        match code {
            WRITE_OK => {
                debug!(len = message.len(), "text message written");
                Ok(())
            }
            WRITE_TIMEOUT => Err(Error::Timeout {
                received: Vec::new(),
            }),
            other => Err(Error::protocol(
                format!("unexpected write result {other}"),
                message.as_bytes(),
            )),
        }
    }

    /// Write a binary message (1 to 340 bytes) to the MO buffer.
    ///
    /// A checksum disagreement reported by the modem repeats the whole
    /// write cycle, up to `max_retries` times.
    pub async fn write_binary(&mut self, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(payload)?;
        let cmd = commands::cmd_write_binary(frame.len())?;

        let mut attempt = 0;
        loop {
            match self.write_binary_once(&cmd, &frame).await {
                Err(e) if e.kind() == ErrorKind::ChecksumMismatch && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, "modem reported checksum mismatch, rewriting");
                    self.io.flush_input().await?;
                }
                other => return other,
            }
        }
    }

    async fn write_binary_once(&mut self, cmd: &Command, frame: &Frame) -> Result<()> {
        self.expect_ready(cmd).await?;
        let code = self
            .write_payload(Payload::Binary(frame), ResponseShape::PlainText)
            .await?;
        match code {
            WRITE_OK => {
                debug!(len = frame.len(), "binary message written");
                Ok(())
            }
            WRITE_TIMEOUT => Err(Error::Timeout {
                received: Vec::new(),
            }),
            WRITE_BAD_CHECKSUM => Err(Error::ChecksumMismatch {
                trailer: frame.checksum(),
                calculated: None,
                payload: frame.payload().to_vec(),
            }),
            WRITE_BAD_LENGTH => Err(Error::Length {
                len: frame.len(),
                max: MAX_PAYLOAD,
            }),
            other => Err(Error::protocol(
                format!("unexpected write result {other}"),
                frame.payload(),
            )),
        }
    }

    /// Read the MT buffer as text. The message is returned verbatim, even
    /// when it reads `OK` or `ERROR`.
    pub async fn read_text(&mut self) -> Result<String> {
        self.run_with_retry(&commands::cmd_read_text())
            .await?
            .into_text()
    }

    /// Read the MT buffer as a verified binary payload. An empty MT buffer
    /// yields an empty payload.
    pub async fn read_binary(&mut self) -> Result<Vec<u8>> {
        self.run_with_retry(&commands::cmd_read_binary())
            .await?
            .into_binary()
    }

    /// Run a command whose reply is a bare result code and require `0`.
    async fn run_result_code(&mut self, cmd: &Command, what: &str) -> Result<()> {
        let reply = self.run_with_retry(cmd).await?;
        let text = reply.into_text()?;
        match commands::parse_result_code(&text)? {
            0 => Ok(()),
            code => Err(Error::protocol(
                format!("failed to {what} (result {code})"),
                text.as_bytes(),
            )),
        }
    }

    /// Clear the MO buffer, the MT buffer, or both.
    pub async fn clear_buffers(&mut self, target: BufferTarget) -> Result<()> {
        debug!(%target, "clearing buffers");
        let what = format!("clear {target} buffer");
        self.run_result_code(&commands::cmd_clear_buffers(target), &what)
            .await
    }

    /// Reset the MO sequence number to zero.
    pub async fn clear_mo_sequence(&mut self) -> Result<()> {
        self.run_result_code(&commands::cmd_clear_mo_sequence(), "clear MOMSN")
            .await
    }

    /// Copy the MO buffer to the MT buffer; returns the number of bytes
    /// copied.
    pub async fn copy_mo_to_mt(&mut self) -> Result<usize> {
        let text = self
            .run_with_retry(&commands::cmd_copy_mo_to_mt())
            .await?
            .into_text()?;
        commands::parse_copy_size(&text)
    }

    /// Enable or disable unsolicited indicator event reporting.
    pub async fn set_event_reporting(&mut self, on: bool) -> Result<()> {
        debug!(on, "setting indicator event reporting");
        self.run(&commands::cmd_event_reporting(on)).await?;
        Ok(())
    }

    /// Collect identity, signal, position, time, and buffer status.
    pub async fn info(&mut self) -> Result<ModemInfo> {
        Ok(ModemInfo {
            firmware: self.firmware_revision().await?,
            hardware: self.product_family().await?,
            hardware_spec: self.hardware_spec().await?,
            imei: self.imei().await?,
            signal: self.signal_quality().await?,
            gateway: self.gateway().await?,
            geolocation: self.geolocation().await?,
            system_time: self.system_time().await?,
            status: self.extended_status().await?,
        })
    }

    /// Close the link. Further verbs fail with an I/O error.
    pub async fn close(&mut self) -> Result<()> {
        debug!("closing modem link");
        self.io.close().await
    }

    /// Release the transceiver, e.g. to inspect the transport in tests.
    pub fn into_transceiver(self) -> AtTransceiver {
        self.io
    }
}
