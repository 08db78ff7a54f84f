//! Text reply handling: completion detection and normalization.
//!
//! Text replies are line-oriented. With the init string in effect the modem
//! runs in quiet mode (`Q1`), so an information line may or may not be
//! followed by the `OK` result code; [`reply_status`] reports enough for the
//! transceiver to stop either on a final token or on a quiet window after a
//! complete line.

use sbdlink_core::{Error, Result};

/// Success token.
pub const OK: &str = "OK";

/// Failure token.
pub const ERROR: &str = "ERROR";

/// Prompt sent before the modem accepts message data.
pub const READY: &str = "READY";

/// A token that ends a text reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalToken {
    Ok,
    Error,
    Ready,
}

impl FinalToken {
    fn from_line(line: &str) -> Option<Self> {
        match line.trim() {
            OK => Some(FinalToken::Ok),
            ERROR => Some(FinalToken::Error),
            READY => Some(FinalToken::Ready),
            _ => None,
        }
    }
}

/// How far a text reply has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// No complete non-empty line yet.
    Incomplete,
    /// At least one complete line, none of them a final token.
    Lines,
    /// The last complete line is a final token.
    Final(FinalToken),
}

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

/// Complete, non-blank lines in `buf`. A trailing partial line is skipped.
fn complete_lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let end = buf
        .iter()
        .rposition(|&b| is_terminator(b))
        .map_or(0, |i| i + 1);
    buf[..end]
        .split(|&b| is_terminator(b))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
}

/// Classify the bytes received so far for a text reply.
pub fn reply_status(buf: &[u8]) -> ReplyStatus {
    match complete_lines(buf).last() {
        None => ReplyStatus::Incomplete,
        Some(line) => match std::str::from_utf8(line).ok().and_then(FinalToken::from_line) {
            Some(token) => ReplyStatus::Final(token),
            None => ReplyStatus::Lines,
        },
    }
}

/// Whether any complete line of `buf` is the failure token.
pub fn contains_error(buf: &[u8]) -> bool {
    complete_lines(buf).any(|line| {
        std::str::from_utf8(line).ok().and_then(FinalToken::from_line) == Some(FinalToken::Error)
    })
}

/// The error reported when the modem answers with the failure token.
pub fn modem_error(raw: &[u8]) -> Error {
    Error::ModemError {
        raw: String::from_utf8_lossy(raw).trim().to_string(),
    }
}

/// Reduce a text reply to a single clean line.
///
/// Line terminators are removed and blank lines dropped. A final line
/// consisting solely of `OK` is the result code and is removed; any other
/// `OK` is content and stays. A reply that reduces to exactly `OK` carries
/// no information and becomes empty. The output contains no NUL, CR or LF
/// bytes, and `normalize(normalize(x)) == normalize(x)`.
///
/// Input containing NUL bytes or invalid UTF-8 is a protocol error.
///
/// ```
/// use sbdlink_at::text::normalize;
///
/// assert_eq!(normalize(b"+CSQ:4\r\n\r\nOK\r\n").unwrap(), "+CSQ:4");
/// assert_eq!(normalize(b"BOOKS\r\nOK\r\n").unwrap(), "BOOKS");
/// ```
pub fn normalize(raw: &[u8]) -> Result<String> {
    if raw.contains(&0) {
        return Err(Error::protocol("NUL byte in text reply", raw));
    }
    let text =
        std::str::from_utf8(raw).map_err(|_| Error::protocol("text reply is not UTF-8", raw))?;

    let mut lines: Vec<&str> = text
        .split(|c: char| c == '\r' || c == '\n')
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.last().is_some_and(|line| line.trim() == OK) {
        lines.pop();
    }

    let joined = lines.concat();
    if joined.trim() == OK {
        return Ok(String::new());
    }
    Ok(joined)
}

// ---------------------------------------------------------------------------
// Message replies
// ---------------------------------------------------------------------------

/// Position of the message in a `<prefix>` reply such as `+SBDRT:`.
#[derive(Debug, PartialEq, Eq)]
enum MessageScan<'a> {
    /// The reply does not open with the prefix.
    NoPrefix,
    /// The message line has not been terminated yet.
    Partial,
    /// `body` is the message line; `rest` starts at its terminator.
    Body { body: &'a [u8], rest: &'a [u8] },
}

/// Locate the message line of a `<prefix><CR><LF><message><CR><LF>` reply.
///
/// The message is found by position, so its content never counts as a
/// result code. A message on the prefix line itself is accepted as well.
fn scan_message<'a>(buf: &'a [u8], prefix: &str) -> MessageScan<'a> {
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    let buf = &buf[start..];
    let prefix = prefix.as_bytes();
    if buf.len() < prefix.len() {
        return if prefix.starts_with(buf) {
            MessageScan::Partial
        } else {
            MessageScan::NoPrefix
        };
    }
    if !buf.starts_with(prefix) {
        return MessageScan::NoPrefix;
    }

    let body = match &buf[prefix.len()..] {
        [] | [b'\r'] => return MessageScan::Partial,
        [b'\r', b'\n', tail @ ..] => tail,
        [b'\r' | b'\n', tail @ ..] => tail,
        line => line,
    };
    match body.iter().position(|&b| is_terminator(b)) {
        Some(end) => MessageScan::Body {
            body: &body[..end],
            rest: &body[end..],
        },
        None => MessageScan::Partial,
    }
}

/// Classify a message reply.
///
/// Once the message line is terminated the reply has [`ReplyStatus::Lines`]
/// and becomes final only on a result token after the message. A reply
/// without the prefix (the modem refused the command) is classified like
/// any other text reply.
pub fn message_status(buf: &[u8], prefix: &str) -> ReplyStatus {
    match scan_message(buf, prefix) {
        MessageScan::NoPrefix => reply_status(buf),
        MessageScan::Partial => ReplyStatus::Incomplete,
        MessageScan::Body { rest, .. } => match reply_status(rest) {
            ReplyStatus::Incomplete => ReplyStatus::Lines,
            status => status,
        },
    }
}

/// Extract the message from a completed message reply, verbatim.
///
/// Returns `None` if the reply does not carry the prefix. An `ERROR` after
/// the message is a modem error; the message itself may be any text,
/// including `OK` or `ERROR`.
pub fn message_body(raw: &[u8], prefix: &str) -> Result<Option<String>> {
    let MessageScan::Body { body, rest } = scan_message(raw, prefix) else {
        return Ok(None);
    };
    if contains_error(rest) {
        return Err(modem_error(raw));
    }
    if body.contains(&0) {
        return Err(Error::protocol("NUL byte in text message", raw));
    }
    let text =
        std::str::from_utf8(body).map_err(|_| Error::protocol("text message is not UTF-8", raw))?;
    Ok(Some(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // normalize
    // -----------------------------------------------------------------------

    #[test]
    fn normalize_signal_reply() {
        assert_eq!(normalize(b"+CSQ:4\r\n\r\nOK\r\n").unwrap(), "+CSQ:4");
    }

    #[test]
    fn normalize_status_reply() {
        assert_eq!(
            normalize(b"+SBDSX: 1, 7, 0, -1, 0, 2\r\n\r\nOK\r\n").unwrap(),
            "+SBDSX: 1, 7, 0, -1, 0, 2"
        );
    }

    #[test]
    fn normalize_without_ok() {
        assert_eq!(normalize(b"300234010753370\r\n").unwrap(), "300234010753370");
    }

    #[test]
    fn normalize_keeps_ok_inside_content() {
        assert_eq!(normalize(b"LOOK OK THEN\r\nOK\r\n").unwrap(), "LOOK OK THEN");
        assert_eq!(normalize(b"+SBDRT:\r\nBOOK\r\n").unwrap(), "+SBDRT:BOOK");
        assert_eq!(normalize(b"TOKEN OK").unwrap(), "TOKEN OK");
    }

    #[test]
    fn normalize_strips_only_the_final_ok() {
        assert_eq!(normalize(b"0\r\nOK\r\nOK\r\n").unwrap(), "0OK");
        assert_eq!(normalize(b"+SBDRT:\r\nOK\r\n\r\nOK\r\n").unwrap(), "+SBDRT:OK");
    }

    #[test]
    fn normalize_bare_ok_is_empty() {
        assert_eq!(normalize(b"OK\r\n").unwrap(), "");
        assert_eq!(normalize(b"\r\n").unwrap(), "");
        assert_eq!(normalize(b"").unwrap(), "");
    }

    #[test]
    fn normalize_joins_multiline_reply() {
        assert_eq!(
            normalize(b"Call Processor Version: TA16005\r\nModem DSP Version: 1.7\r\n").unwrap(),
            "Call Processor Version: TA16005Modem DSP Version: 1.7"
        );
    }

    #[test]
    fn normalize_rejects_nul() {
        let err = normalize(b"+CSQ:\x004\r\n").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn normalize_rejects_invalid_utf8() {
        assert!(normalize(&[0xFF, 0xFE, b'\r', b'\n']).is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples: &[&[u8]] = &[
            b"+CSQ:4\r\n\r\nOK\r\n",
            b"O\r\nK\r\n",
            b" O\r\nK",
            b"OK OK\r\nOK",
            b"READY\r\n",
            b"\r\n\r\n",
            b"a\rb\nc\r\n",
            b"OK\r\nOK\r\n",
            b"0\r\nOK\r\nOK\r\n",
            b"SBDTC: Outbound SBD Copied to Inbound SBD: size = 5\r\nOK\r\n",
        ];
        for raw in samples {
            let once = normalize(raw).unwrap();
            let twice = normalize(once.as_bytes()).unwrap();
            assert_eq!(once, twice, "input {:?}", String::from_utf8_lossy(raw));
            assert!(!once.contains(|c: char| matches!(c, '\r' | '\n' | '\0')));
        }
    }

    // -----------------------------------------------------------------------
    // reply_status
    // -----------------------------------------------------------------------

    #[test]
    fn status_incomplete_without_full_line() {
        assert_eq!(reply_status(b""), ReplyStatus::Incomplete);
        assert_eq!(reply_status(b"\r\n"), ReplyStatus::Incomplete);
        assert_eq!(reply_status(b"+CSQ:"), ReplyStatus::Incomplete);
    }

    #[test]
    fn status_lines_after_information_line() {
        assert_eq!(reply_status(b"+CSQ:4\r\n"), ReplyStatus::Lines);
        assert_eq!(reply_status(b"+CSQ:4\r\n\r\nO"), ReplyStatus::Lines);
    }

    #[test]
    fn status_final_tokens() {
        assert_eq!(
            reply_status(b"+CSQ:4\r\n\r\nOK\r\n"),
            ReplyStatus::Final(FinalToken::Ok)
        );
        assert_eq!(
            reply_status(b"ERROR\r\n"),
            ReplyStatus::Final(FinalToken::Error)
        );
        assert_eq!(
            reply_status(b"READY\r\n"),
            ReplyStatus::Final(FinalToken::Ready)
        );
    }

    #[test]
    fn status_ok_inside_line_is_not_final() {
        assert_eq!(reply_status(b"NOT OK\r\n"), ReplyStatus::Lines);
    }

    #[test]
    fn error_detection() {
        assert!(contains_error(b"\r\nERROR\r\n"));
        assert!(!contains_error(b"+SBDGW: ERRORS\r\n"));
        assert!(!contains_error(b"ERROR"));
    }

    // -----------------------------------------------------------------------
    // message replies
    // -----------------------------------------------------------------------

    const PREFIX: &str = "+SBDRT:";

    #[test]
    fn message_waits_for_terminated_body() {
        assert_eq!(message_status(b"", PREFIX), ReplyStatus::Incomplete);
        assert_eq!(message_status(b"+SBD", PREFIX), ReplyStatus::Incomplete);
        assert_eq!(message_status(b"+SBDRT:\r", PREFIX), ReplyStatus::Incomplete);
        assert_eq!(message_status(b"+SBDRT:\r\n", PREFIX), ReplyStatus::Incomplete);
        assert_eq!(message_status(b"+SBDRT:\r\nhel", PREFIX), ReplyStatus::Incomplete);
        assert_eq!(message_status(b"+SBDRT:\r\nhello\r\n", PREFIX), ReplyStatus::Lines);
    }

    #[test]
    fn message_body_ok_is_not_a_result_code() {
        assert_eq!(message_status(b"+SBDRT:\r\nOK\r\n", PREFIX), ReplyStatus::Lines);
        assert_eq!(message_status(b"+SBDRT:\r\nOK\r\n\r\n", PREFIX), ReplyStatus::Lines);
        assert_eq!(
            message_status(b"+SBDRT:\r\nOK\r\n\r\nOK\r\n", PREFIX),
            ReplyStatus::Final(FinalToken::Ok)
        );
        assert_eq!(
            message_body(b"+SBDRT:\r\nOK\r\n\r\nOK\r\n", PREFIX).unwrap(),
            Some("OK".to_string())
        );
    }

    #[test]
    fn message_body_error_is_content() {
        assert_eq!(message_status(b"+SBDRT:\r\nERROR\r\n", PREFIX), ReplyStatus::Lines);
        assert_eq!(
            message_body(b"+SBDRT:\r\nERROR\r\n\r\nOK\r\n", PREFIX).unwrap(),
            Some("ERROR".to_string())
        );
    }

    #[test]
    fn message_refused_by_modem() {
        assert_eq!(
            message_status(b"ERROR\r\n", PREFIX),
            ReplyStatus::Final(FinalToken::Error)
        );
        assert_eq!(message_body(b"ERROR\r\n", PREFIX).unwrap(), None);
        let err = message_body(b"+SBDRT:\r\nhi\r\nERROR\r\n", PREFIX).unwrap_err();
        assert!(matches!(err, Error::ModemError { .. }));
    }

    #[test]
    fn message_body_is_verbatim() {
        assert_eq!(
            message_body(b"\r\n+SBDRT:\r\n  hi, OK there \r\n", PREFIX).unwrap(),
            Some("  hi, OK there ".to_string())
        );
        assert_eq!(
            message_body(b"+SBDRT:\r\n\r\n\r\nOK\r\n", PREFIX).unwrap(),
            Some(String::new())
        );
        assert_eq!(
            message_body(b"+SBDRT: inline\r\n", PREFIX).unwrap(),
            Some(" inline".to_string())
        );
        assert_eq!(
            message_body(b"+SBDRT:\rbare cr\r", PREFIX).unwrap(),
            Some("bare cr".to_string())
        );
    }

    #[test]
    fn message_body_rejects_nul() {
        assert!(message_body(b"+SBDRT:\r\na\x00b\r\n", PREFIX).is_err());
    }
}
