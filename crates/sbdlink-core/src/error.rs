//! Error types for sbdlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Line-level, framing, and modem-level
//! failures are all captured here and never abort the process; the caller
//! decides whether to retry, report, or close the link.

/// The five outcome classes a command cycle can fail with.
///
/// Several [`Error`] variants collapse onto the same class; use
/// [`Error::kind`] to branch on the class rather than the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device could not be opened, read, or written.
    IoFailure,
    /// No terminator or complete frame arrived within the budget.
    TimedOut,
    /// A binary frame trailer disagreed with the computed sum.
    ChecksumMismatch,
    /// The reply did not match the expected grammar, or the modem refused.
    ProtocolError,
    /// A payload outside the size invariant was rejected before any I/O.
    LengthError,
}

/// The error type for all sbdlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (device open or configuration failed).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for a reply from the modem.
    ///
    /// `received` holds every byte accumulated before the budget ran out,
    /// so a truncated frame or half line can be inspected.
    #[error("timeout waiting for response ({} bytes received)", .received.len())]
    Timeout { received: Vec<u8> },

    /// A binary frame's checksum trailer disagreed with the payload sum.
    ///
    /// `calculated` is `None` when the disagreement was reported by the
    /// modem about a frame we sent. The payload is kept for diagnostics and
    /// must not be trusted.
    #[error(
        "checksum mismatch: trailer {trailer:#06x}, calculated {}",
        .calculated.map_or_else(|| "by modem".to_string(), |c| format!("{c:#06x}"))
    )]
    ChecksumMismatch {
        trailer: u16,
        calculated: Option<u16>,
        payload: Vec<u8>,
    },

    /// The reply did not fit the expected shape.
    #[error("protocol error: {message}")]
    Protocol { message: String, raw: Vec<u8> },

    /// The modem answered with its own `ERROR` token.
    #[error("modem returned error: {raw:?}")]
    ModemError { raw: String },

    /// A payload length outside the accepted range.
    #[error("invalid length: {len} bytes (allowed 1..={max})")]
    Length { len: usize, max: usize },

    /// No connection to the modem has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::Protocol`] that carries the raw reply bytes.
    pub fn protocol(message: impl Into<String>, raw: &[u8]) -> Self {
        Error::Protocol {
            message: message.into(),
            raw: raw.to_vec(),
        }
    }

    /// The outcome class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::NotConnected | Error::ConnectionLost | Error::Io(_) => {
                ErrorKind::IoFailure
            }
            Error::Timeout { .. } => ErrorKind::TimedOut,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::Protocol { .. } | Error::ModemError { .. } => ErrorKind::ProtocolError,
            Error::Length { .. } => ErrorKind::LengthError,
        }
    }

    /// Whether repeating the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TimedOut | ErrorKind::ChecksumMismatch
        )
    }

    /// Whether the link is unusable and should be closed.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::IoFailure
    }

    /// Raw bytes the modem sent before this error was raised, if any.
    pub fn received(&self) -> Option<&[u8]> {
        match self {
            Error::Timeout { received } => Some(received),
            Error::ChecksumMismatch { payload, .. } => Some(payload),
            Error::Protocol { raw, .. } => Some(raw),
            Error::ModemError { raw } => Some(raw.as_bytes()),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
