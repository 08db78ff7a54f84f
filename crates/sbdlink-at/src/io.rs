//! The AT transceiver: one write-then-read cycle per command.
//!
//! [`AtTransceiver`] owns the transport and drives each command cycle:
//! write the command, switch the line mode if the reply is binary, read and
//! accumulate the reply under a quiet-window / wall-clock budget, restore
//! text mode, and classify the outcome. It never retries; that is left to
//! the caller.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use sbdlink_core::error::{Error, Result};
use sbdlink_core::transport::Transport;
use sbdlink_core::types::LineMode;
use sbdlink_transport::READ_CAP;

use crate::commands::{Command, Field, ResponseShape};
use crate::frame::{Decoded, Frame, FrameDecoder};
use crate::text::{self, ReplyStatus};

/// Largest text reply accepted before the cycle is abandoned.
const MAX_REPLY: usize = 1024;

/// Timing budget for command cycles.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Length of one quiet window: how long a single read waits for data.
    pub read_timeout: Duration,
    /// Consecutive quiet windows tolerated once a reply has started arriving.
    pub max_idle_reads: u32,
    /// Wall-clock budget for an ordinary command.
    pub command_timeout: Duration,
    /// Wall-clock budget for commands that wait on a satellite session.
    pub session_timeout: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_timeout: Duration::from_millis(100),
            max_idle_reads: 20,
            command_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(65),
        }
    }
}

/// A classified, successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Normalized text (empty for a bare acknowledgement).
    Text(String),
    /// Normalized text and the fields parsed from it by the command's grammar.
    Fields { text: String, fields: Vec<Field> },
    /// A verified binary payload.
    Binary(Vec<u8>),
}

impl Reply {
    /// The normalized text of a text or structured reply.
    pub fn into_text(self) -> Result<String> {
        match self {
            Reply::Text(text) | Reply::Fields { text, .. } => Ok(text),
            Reply::Binary(payload) => Err(Error::protocol("expected text reply", &payload)),
        }
    }

    pub fn into_fields(self) -> Result<Vec<Field>> {
        match self {
            Reply::Fields { fields, .. } => Ok(fields),
            Reply::Text(text) => Err(Error::protocol("expected structured reply", text.as_bytes())),
            Reply::Binary(payload) => Err(Error::protocol("expected structured reply", &payload)),
        }
    }

    pub fn into_binary(self) -> Result<Vec<u8>> {
        match self {
            Reply::Binary(payload) => Ok(payload),
            Reply::Text(text) | Reply::Fields { text, .. } => {
                Err(Error::protocol("expected binary reply", text.as_bytes()))
            }
        }
    }
}

/// Message data sent after the modem's `READY` prompt.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Text message; sent followed by a carriage return.
    Text(&'a [u8]),
    /// Binary message; payload and checksum trailer sent in raw mode.
    Binary(&'a Frame),
}

/// Drives command cycles over an owned [`Transport`].
pub struct AtTransceiver {
    transport: Box<dyn Transport>,
    config: IoConfig,
}

impl AtTransceiver {
    pub fn new(transport: Box<dyn Transport>, config: IoConfig) -> Self {
        AtTransceiver { transport, config }
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Line mode currently active on the transport.
    pub fn mode(&self) -> LineMode {
        self.transport.mode()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Run one command cycle and return the classified reply.
    ///
    /// Errors map onto the five outcome classes of
    /// [`ErrorKind`](sbdlink_core::ErrorKind). The link is always left in
    /// text mode, whatever the outcome.
    pub async fn execute(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.text(), "sending AT command");
        self.transport.send(&cmd.to_bytes()).await?;

        let budget = if cmd.is_long_running() {
            self.config.session_timeout
        } else {
            self.config.command_timeout
        };
        let reply = self.receive_reply(cmd.expects(), budget).await;
        match &reply {
            Ok(_) => trace!(command = cmd.text(), "command complete"),
            Err(e) => debug!(command = cmd.text(), error = %e, "command failed"),
        }
        reply
    }

    /// Send message data after a `READY` prompt and read the result reply.
    ///
    /// Binary payloads are written with the line in raw mode; text mode is
    /// restored before the reply is read. The modem may take up to a minute
    /// to report the result, so the reply gets the session budget.
    pub async fn send_payload(&mut self, payload: Payload<'_>, expects: ResponseShape) -> Result<Reply> {
        match payload {
            Payload::Text(data) => {
                let mut bytes = Vec::with_capacity(data.len() + 1);
                bytes.extend_from_slice(data);
                bytes.push(b'\r');
                debug!(len = data.len(), "sending text message");
                self.transport.send(&bytes).await?;
            }
            Payload::Binary(frame) => {
                debug!(len = frame.len(), checksum = frame.checksum(), "sending binary message");
                self.transport.set_mode(LineMode::Binary).await?;
                let sent = self.transport.send(&frame.encode_body()).await;
                let restored = self.transport.set_mode(LineMode::Text).await;
                sent?;
                restored?;
            }
        }
        self.receive_reply(expects, self.config.session_timeout).await
    }

    /// Discard unread input.
    pub async fn flush_input(&mut self) -> Result<()> {
        self.transport.flush_input().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Give back the transport, e.g. to reuse it after tests.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    async fn receive_reply(&mut self, shape: ResponseShape, budget: Duration) -> Result<Reply> {
        match shape {
            ResponseShape::Binary => self.receive_binary(budget).await.map(Reply::Binary),
            _ => {
                let raw = self.receive_text(shape, budget).await?;
                finish_text(shape, &raw)
            }
        }
    }

    /// Accumulate a text reply.
    ///
    /// Completes on a final token, or on a quiet window once at least one
    /// full line has arrived (quiet mode drops the `OK`). Quiet windows only
    /// count against `max_idle_reads` after the reply has started, except
    /// for [`ResponseShape::Ack`], where silence from the start is an empty
    /// acknowledgement.
    async fn receive_text(&mut self, shape: ResponseShape, budget: Duration) -> Result<Vec<u8>> {
        let silence_ok = shape == ResponseShape::Ack;
        let deadline = Instant::now() + budget;
        let mut buf = Vec::new();
        let mut chunk = [0u8; READ_CAP];
        let mut idle = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout { received: buf });
            }
            let wait = self.config.read_timeout.min(deadline - now);
            let n = self.transport.receive(&mut chunk, wait).await?;

            if n == 0 {
                let status = text_status(shape, &buf);
                if status == ReplyStatus::Lines {
                    return Ok(buf);
                }
                if !buf.is_empty() || silence_ok {
                    idle += 1;
                    if idle >= self.config.max_idle_reads {
                        if silence_ok && status == ReplyStatus::Incomplete && !has_content(&buf) {
                            return Ok(buf);
                        }
                        return Err(Error::Timeout { received: buf });
                    }
                }
                continue;
            }

            idle = 0;
            buf.extend_from_slice(&chunk[..n]);
            trace!(bytes = n, total = buf.len(), "text reply chunk");
            if buf.len() > MAX_REPLY {
                return Err(Error::protocol(
                    format!("text reply exceeds {MAX_REPLY} bytes"),
                    &buf,
                ));
            }
            if let ReplyStatus::Final(_) = text_status(shape, &buf) {
                return Ok(buf);
            }
        }
    }

    /// Read one binary frame with the line in raw mode.
    ///
    /// Text mode is restored on every exit path. If both the read and the
    /// restore fail, the read error is reported.
    async fn receive_binary(&mut self, budget: Duration) -> Result<Vec<u8>> {
        self.transport.set_mode(LineMode::Binary).await?;
        let result = self.read_frame(budget).await;
        if let Err(e) = self.transport.set_mode(LineMode::Text).await {
            warn!(error = %e, "failed to restore text mode");
            return Err(result.err().unwrap_or(e));
        }

        if matches!(result, Ok(_) | Err(Error::ChecksumMismatch { .. })) {
            let drained = self.drain_trailer().await;
            if result.is_ok() {
                drained?;
            }
        }
        result
    }

    async fn read_frame(&mut self, budget: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + budget;
        let mut decoder = FrameDecoder::new();
        let mut chunk = [0u8; READ_CAP];
        let mut idle = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    received: decoder.received().to_vec(),
                });
            }
            let wait = self.config.read_timeout.min(deadline - now);
            let want = decoder.remaining().min(READ_CAP);
            let n = self.transport.receive(&mut chunk[..want], wait).await?;

            if n == 0 {
                if !decoder.received().is_empty() {
                    idle += 1;
                    if idle >= self.config.max_idle_reads {
                        debug!(
                            received = decoder.received().len(),
                            declared = ?decoder.declared_len(),
                            "binary reply stalled"
                        );
                        return Err(Error::Timeout {
                            received: decoder.received().to_vec(),
                        });
                    }
                }
                continue;
            }

            idle = 0;
            match decoder.feed(&chunk[..n])? {
                Decoded::Complete { payload, .. } => {
                    debug!(len = payload.len(), "binary frame verified");
                    return Ok(payload);
                }
                Decoded::Incomplete { needed } => trace!(bytes = n, needed, "binary reply chunk"),
            }
        }
    }

    /// Swallow whatever follows a frame (the line terminator and `OK`, if
    /// the modem sends them) until the line goes quiet.
    async fn drain_trailer(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CAP];
        for _ in 0..self.config.max_idle_reads {
            let n = self
                .transport
                .receive(&mut chunk, self.config.read_timeout)
                .await?;
            if n == 0 {
                break;
            }
            trace!(bytes = n, "discarding frame trailer");
        }
        Ok(())
    }
}

fn has_content(buf: &[u8]) -> bool {
    buf.iter().any(|b| !b.is_ascii_whitespace())
}

fn text_status(shape: ResponseShape, buf: &[u8]) -> ReplyStatus {
    match shape {
        ResponseShape::Message(prefix) => text::message_status(buf, prefix),
        _ => text::reply_status(buf),
    }
}

/// Classify a completed text reply against its expected shape.
fn finish_text(shape: ResponseShape, raw: &[u8]) -> Result<Reply> {
    if let ResponseShape::Message(prefix) = shape {
        if let Some(message) = text::message_body(raw, prefix)? {
            return Ok(Reply::Text(message));
        }
    }
    if text::contains_error(raw) {
        return Err(text::modem_error(raw));
    }
    let text = text::normalize(raw)?;
    match shape {
        ResponseShape::Structured(grammar) => {
            let fields = grammar.parse(&text)?;
            Ok(Reply::Fields { text, fields })
        }
        ResponseShape::Message(prefix) => Err(Error::protocol(
            format!("reply does not start with {prefix}"),
            raw,
        )),
        _ => Ok(Reply::Text(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        cmd_event_reporting, cmd_extended_status, cmd_imei, cmd_initiate_session,
        cmd_read_binary, cmd_read_text, cmd_signal_quality, RESULT_CODE,
    };
    use crate::frame::encode_frame;
    use sbdlink_core::ErrorKind;
    use sbdlink_test_harness::MockTransport;

    /// Tight budget so timeout paths finish quickly.
    fn test_config() -> IoConfig {
        IoConfig {
            read_timeout: Duration::from_millis(1),
            max_idle_reads: 3,
            command_timeout: Duration::from_millis(60),
            session_timeout: Duration::from_millis(120),
        }
    }

    fn transceiver(mock: &MockTransport) -> AtTransceiver {
        AtTransceiver::new(Box::new(mock.clone()), test_config())
    }

    #[test]
    fn io_config_defaults() {
        let config = IoConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(config.max_idle_reads, 20);
        assert_eq!(config.command_timeout, Duration::from_secs(10));
        assert_eq!(config.session_timeout, Duration::from_secs(65));
    }

    #[test]
    fn reply_accessors() {
        assert_eq!(Reply::Text("x".into()).into_text().unwrap(), "x");
        assert!(Reply::Text("x".into()).into_binary().is_err());
        assert!(Reply::Binary(vec![1]).into_text().is_err());
        assert!(Reply::Text("x".into()).into_fields().is_err());
    }

    // =======================================================================
    // Text replies
    // =======================================================================

    #[tokio::test]
    async fn signal_query_parses_fields() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CSQ\r\n", b"+CSQ:4\r\n\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let reply = io.execute(&cmd_signal_quality()).await.unwrap();
        assert_eq!(
            reply,
            Reply::Fields {
                text: "+CSQ:4".into(),
                fields: vec![Field::Int(4)],
            }
        );
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn status_reply_split_across_reads() {
        let mock = MockTransport::new();
        mock.expect_chunks(
            b"AT+SBDSX\r\n",
            &[b"+SBDSX: 1, 7", b"", b", 0, -1, 0, 2\r\n", b"\r\nOK\r\n"],
        );
        let mut io = transceiver(&mock);

        let fields = io
            .execute(&cmd_extended_status())
            .await
            .unwrap()
            .into_fields()
            .unwrap();
        let ints: Vec<i64> = fields.iter().filter_map(Field::as_int).collect();
        assert_eq!(ints, vec![1, 7, 0, -1, 0, 2]);
    }

    #[tokio::test]
    async fn quiet_mode_reply_completes_on_quiet_window() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CGSN\r\n", b"300234010753370\r\n");
        let mut io = transceiver(&mock);

        let text = io.execute(&cmd_imei()).await.unwrap().into_text().unwrap();
        assert_eq!(text, "300234010753370");
    }

    #[tokio::test]
    async fn modem_error_is_protocol_error_with_raw_text() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CSQ\r\n", b"ERROR\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_signal_quality()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert!(matches!(err, Error::ModemError { ref raw } if raw == "ERROR"));
    }

    #[tokio::test]
    async fn grammar_mismatch_is_protocol_error() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CSQ\r\n", b"+CSQF:4\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_signal_quality()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(err.received(), Some(&b"+CSQF:4"[..]));
    }

    #[tokio::test]
    async fn message_reading_ok_consumes_the_real_result_code() {
        let mock = MockTransport::new();
        mock.expect_chunks(
            b"AT+SBDRT\r\n",
            &[b"+SBDRT:\r\n", b"OK\r\n", b"\r\n", b"OK\r\n"],
        );
        mock.expect(b"AT+CSQ\r\n", b"+CSQ:5\r\n\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let reply = io.execute(&cmd_read_text()).await.unwrap();
        assert_eq!(reply, Reply::Text("OK".into()));
        assert_eq!(mock.pending_input(), 0);

        let fields = io.execute(&cmd_signal_quality()).await.unwrap().into_fields().unwrap();
        assert_eq!(fields, vec![Field::Int(5)]);
    }

    #[tokio::test]
    async fn message_reading_error_is_content() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRT\r\n", b"+SBDRT:\r\nERROR\r\n\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let reply = io.execute(&cmd_read_text()).await.unwrap();
        assert_eq!(reply, Reply::Text("ERROR".into()));
    }

    #[tokio::test]
    async fn message_refused_is_modem_error() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRT\r\n", b"ERROR\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_text()).await.unwrap_err();
        assert!(matches!(err, Error::ModemError { ref raw } if raw == "ERROR"));
    }

    #[tokio::test]
    async fn message_without_prefix_is_protocol_error() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRT\r\n", b"+SBDRB:\r\nhi\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_text()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn silent_modem_times_out() {
        let mock = MockTransport::new();
        mock.expect_silence(b"AT+CSQ\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_signal_quality()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { ref received } if received.is_empty()));
    }

    #[tokio::test]
    async fn half_line_times_out_with_partial_bytes() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CSQ\r\n", b"+CSQ:");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_signal_quality()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(err.received(), Some(&b"+CSQ:"[..]));
    }

    #[tokio::test]
    async fn ack_accepts_silence() {
        let mock = MockTransport::new();
        mock.expect_silence(b"AT+CIER=0\r\n");
        let mut io = transceiver(&mock);

        let reply = io.execute(&cmd_event_reporting(false)).await.unwrap();
        assert_eq!(reply, Reply::Text(String::new()));
    }

    #[tokio::test]
    async fn ack_accepts_ok() {
        let mock = MockTransport::new();
        mock.expect(b"AT+CIER=1,1,1\r\n", b"\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let reply = io.execute(&cmd_event_reporting(true)).await.unwrap();
        assert_eq!(reply, Reply::Text(String::new()));
    }

    #[tokio::test]
    async fn send_failure_is_io_failure() {
        let mock = MockTransport::new();
        mock.fail_next_send(std::io::ErrorKind::BrokenPipe);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_signal_quality()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[tokio::test]
    async fn oversized_text_reply_is_rejected() {
        let mock = MockTransport::new();
        let junk = vec![b'A'; MAX_REPLY + 1];
        mock.expect(b"AT+CGSN\r\n", &junk);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_imei()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }

    #[tokio::test]
    async fn session_waits_past_command_timeout() {
        let mock = MockTransport::new();
        // 80 quiet ticks before any data: longer than command_timeout at
        // 1ms per tick but well within session_timeout.
        let mut chunks: Vec<&[u8]> = vec![b""; 80];
        chunks.push(b"+SBDIX: 0, 12, 0, 0, 0, 0\r\n");
        mock.expect_chunks(b"AT+SBDIX\r\n", &chunks);
        let mut io = AtTransceiver::new(
            Box::new(mock.clone()),
            IoConfig {
                session_timeout: Duration::from_secs(5),
                ..test_config()
            },
        );

        let text = io
            .execute(&cmd_initiate_session())
            .await
            .unwrap()
            .into_text()
            .unwrap();
        assert_eq!(text, "+SBDIX: 0, 12, 0, 0, 0, 0");
    }

    // =======================================================================
    // Binary replies
    // =======================================================================

    #[tokio::test]
    async fn binary_read_restores_text_mode() {
        let mock = MockTransport::new();
        let mut reply = encode_frame(b"HELLO").unwrap();
        reply.extend_from_slice(b"\r\nOK\r\n");
        mock.expect(b"AT+SBDRB\r\n", &reply);
        let mut io = transceiver(&mock);

        let payload = io
            .execute(&cmd_read_binary())
            .await
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(payload, b"HELLO".to_vec());
        assert_eq!(mock.mode_log(), vec![LineMode::Binary, LineMode::Text]);
        assert_eq!(io.mode(), LineMode::Text);
        // Trailer was drained, not left for the next command.
        assert_eq!(mock.pending_input(), 0);
    }

    #[tokio::test]
    async fn binary_read_one_byte_at_a_time() {
        let mock = MockTransport::new();
        let wire = encode_frame(b"HELLO").unwrap();
        let chunks: Vec<&[u8]> = wire.chunks(1).collect();
        mock.expect_chunks(b"AT+SBDRB\r\n", &chunks);
        let mut io = transceiver(&mock);

        let payload = io
            .execute(&cmd_read_binary())
            .await
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(payload, b"HELLO".to_vec());
    }

    #[tokio::test]
    async fn binary_read_does_not_overread_into_trailer() {
        let mock = MockTransport::new();
        // Frame and trailer in one chunk: the reader asks for at most the
        // bytes the frame still needs.
        let mut reply = encode_frame(b"AB").unwrap();
        reply.extend_from_slice(b"\r\nOK\r\n");
        mock.expect(b"AT+SBDRB\r\n", &reply);
        let mut io = transceiver(&mock);

        let payload = io.execute(&cmd_read_binary()).await.unwrap();
        assert_eq!(payload, Reply::Binary(b"AB".to_vec()));
    }

    #[tokio::test]
    async fn binary_read_empty_mt_buffer() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRB\r\n", &[0x00, 0x00, 0x00, 0x00]);
        let mut io = transceiver(&mock);

        let payload = io.execute(&cmd_read_binary()).await.unwrap();
        assert_eq!(payload, Reply::Binary(Vec::new()));
    }

    #[tokio::test]
    async fn binary_checksum_mismatch_restores_text_mode() {
        let mock = MockTransport::new();
        let mut wire = encode_frame(b"HELLO").unwrap();
        wire[4] ^= 0x01;
        mock.expect(b"AT+SBDRB\r\n", &wire);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert_eq!(io.mode(), LineMode::Text);
    }

    #[tokio::test]
    async fn truncated_frame_times_out_in_text_mode() {
        let mock = MockTransport::new();
        let wire = encode_frame(b"HELLO").unwrap();
        mock.expect(b"AT+SBDRB\r\n", &wire[..6]);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(err.received(), Some(&wire[..6]));
        assert_eq!(mock.mode_log(), vec![LineMode::Binary, LineMode::Text]);
    }

    #[tokio::test]
    async fn impossible_length_is_protocol_error() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRB\r\n", b"ERROR\r\n");
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert_eq!(io.mode(), LineMode::Text);
    }

    #[tokio::test]
    async fn binary_switch_failure_is_io_failure() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRB\r\n", &encode_frame(b"HI").unwrap());
        mock.fail_next_set_mode(LineMode::Binary);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(io.mode(), LineMode::Text);
    }

    #[tokio::test]
    async fn restore_failure_after_good_frame_is_io_failure() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRB\r\n", &encode_frame(b"HI").unwrap());
        mock.fail_next_set_mode(LineMode::Text);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[tokio::test]
    async fn restore_failure_keeps_read_error() {
        let mock = MockTransport::new();
        mock.expect(b"AT+SBDRB\r\n", &[0x00, 0x05, 0x48]);
        mock.fail_next_set_mode(LineMode::Text);
        let mut io = transceiver(&mock);

        let err = io.execute(&cmd_read_binary()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(err.received(), Some(&[0x00, 0x05, 0x48][..]));
    }

    // =======================================================================
    // Payload phase
    // =======================================================================

    #[tokio::test]
    async fn binary_payload_sent_in_raw_mode() {
        let mock = MockTransport::new();
        let frame = Frame::new(b"HELLO".to_vec()).unwrap();
        mock.expect(&frame.encode_body(), b"0\r\n\r\nOK\r\n");
        let mut io = transceiver(&mock);

        let reply = io
            .send_payload(Payload::Binary(&frame), ResponseShape::Structured(&RESULT_CODE))
            .await
            .unwrap();
        assert_eq!(reply.into_fields().unwrap(), vec![Field::Int(0)]);
        assert_eq!(mock.sent_modes(), vec![LineMode::Binary]);
        assert_eq!(io.mode(), LineMode::Text);
    }

    #[tokio::test]
    async fn text_payload_ends_with_carriage_return() {
        let mock = MockTransport::new();
        mock.expect(b"hello\r", b"0\r\n");
        let mut io = transceiver(&mock);

        let reply = io
            .send_payload(Payload::Text(b"hello"), ResponseShape::PlainText)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text("0".into()));
        assert_eq!(mock.sent_modes(), vec![LineMode::Text]);
    }

    #[tokio::test]
    async fn payload_result_gets_session_budget() {
        let mock = MockTransport::new();
        let mut chunks = vec![&b""[..]; 10];
        chunks.push(&b"0\r\n"[..]);
        mock.expect_chunks(b"hello\r", &chunks);
        let config = IoConfig {
            read_timeout: Duration::from_millis(10),
            max_idle_reads: 3,
            command_timeout: Duration::from_millis(60),
            session_timeout: Duration::from_secs(2),
        };
        let mut io = AtTransceiver::new(Box::new(mock.clone()), config);

        let reply = io
            .send_payload(Payload::Text(b"hello"), ResponseShape::PlainText)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text("0".into()));
    }
}
