//! Core types used throughout sbdlink.
//!
//! These are the typed results handed back to callers once a modem reply has
//! been read, normalized, and parsed against its grammar.

use std::fmt;
use std::str::FromStr;

/// Line discipline of the serial device.
///
/// `Text` delivers input line by line (canonical); `Binary` delivers raw
/// bytes and the reader counts them itself. Every binary phase of a command
/// cycle is bracketed by a switch to `Binary` and back to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineMode {
    #[default]
    Text,
    Binary,
}

impl fmt::Display for LineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineMode::Text => write!(f, "text"),
            LineMode::Binary => write!(f, "binary"),
        }
    }
}

/// Which modem message buffer(s) an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Mobile-originated (outbound) buffer.
    Mo,
    /// Mobile-terminated (inbound) buffer.
    Mt,
    /// Both buffers.
    Both,
}

impl BufferTarget {
    /// The `+SBDD` argument selecting this target.
    pub fn code(self) -> u8 {
        match self {
            BufferTarget::Mo => 0,
            BufferTarget::Mt => 1,
            BufferTarget::Both => 2,
        }
    }
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BufferTarget::Mo => "MO",
            BufferTarget::Mt => "MT",
            BufferTarget::Both => "MO+MT",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`BufferTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBufferTargetError(String);

impl fmt::Display for ParseBufferTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown buffer: {} (expected mo, mt, or all)", self.0)
    }
}

impl std::error::Error for ParseBufferTargetError {}

impl FromStr for BufferTarget {
    type Err = ParseBufferTargetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mo" => Ok(BufferTarget::Mo),
            "mt" => Ok(BufferTarget::Mt),
            "all" | "both" => Ok(BufferTarget::Both),
            _ => Err(ParseBufferTargetError(s.to_string())),
        }
    }
}

/// MO/MT buffer state as reported by `+SBDS` / `+SBDSX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbdStatus {
    /// A message is waiting in the MO buffer.
    pub mo_flag: bool,
    /// Sequence number of the next MO message.
    pub momsn: u16,
    /// A message is waiting in the MT buffer.
    pub mt_flag: bool,
    /// Sequence number of the MT message, `-1` when the buffer is empty.
    pub mtmsn: i32,
    /// Ring alert pending. `None` for the short `+SBDS` form.
    pub ring_alert: Option<bool>,
    /// Messages queued at the gateway. `None` for the short `+SBDS` form.
    pub queued: Option<u16>,
}

/// Outcome of an `+SBDIX` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionResult {
    /// MO status code, 0–36.
    pub mo_status: u8,
    pub momsn: u16,
    /// MT status: 0 no message, 1 message received, 2 mailbox check failed.
    pub mt_status: u8,
    pub mtmsn: u16,
    /// Length of the received MT message in bytes.
    pub mt_length: u16,
    /// MT messages still queued at the gateway.
    pub mt_queued: u16,
}

impl SessionResult {
    /// Codes 0–4 mean the MO message was delivered to the gateway.
    pub fn mo_succeeded(&self) -> bool {
        self.mo_status <= 4
    }

    /// Whether an MT message was downloaded into the MT buffer.
    pub fn mt_received(&self) -> bool {
        self.mt_status == 1
    }

    /// Human-readable meaning of [`mo_status`](Self::mo_status).
    pub fn mo_status_text(&self) -> &'static str {
        mo_status_text(self.mo_status)
    }
}

/// Meaning of an `+SBDIX` MO status code.
pub fn mo_status_text(code: u8) -> &'static str {
    match code {
        0 => "MO message transferred successfully",
        1 => "MO message transferred, MT message too big to receive",
        2 => "MO message transferred, location update not accepted",
        3 | 4 => "MO message transferred",
        10 => "gateway reported that the call did not complete in time",
        11 => "MO message queue at the gateway is full",
        12 => "MO message has too many segments",
        13 => "gateway reported that the session did not complete",
        14 => "invalid segment size",
        15 => "access denied",
        16 => "transceiver is locked and may not make SBD calls",
        17 => "gateway not responding (local session timeout)",
        18 => "connection lost (RF drop)",
        32 => "no network service, unable to initiate call",
        33 => "antenna fault, unable to initiate call",
        34 => "radio is disabled, unable to initiate call",
        35 => "transceiver is busy",
        _ => "MO session failed",
    }
}

/// Geolocation grid position reported by `-MSGEO`.
///
/// `x`, `y`, `z` are earth-centred Cartesian coordinates in kilometres
/// (range ±6376, resolution 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geolocation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// System time of the fix, in 90 ms ticks.
    pub timestamp: u32,
}

/// Everything `info` collects from the modem in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemInfo {
    pub firmware: String,
    pub hardware: String,
    pub hardware_spec: String,
    pub imei: String,
    /// Signal quality, 0 (none) to 5 (best).
    pub signal: u8,
    pub gateway: String,
    /// `None` when the modem has no fix.
    pub geolocation: Option<Geolocation>,
    /// `None` when the modem has no network time.
    pub system_time: Option<u32>,
    pub status: SbdStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_mode_default_is_text() {
        assert_eq!(LineMode::default(), LineMode::Text);
    }

    #[test]
    fn line_mode_display() {
        assert_eq!(LineMode::Text.to_string(), "text");
        assert_eq!(LineMode::Binary.to_string(), "binary");
    }

    #[test]
    fn buffer_target_codes() {
        assert_eq!(BufferTarget::Mo.code(), 0);
        assert_eq!(BufferTarget::Mt.code(), 1);
        assert_eq!(BufferTarget::Both.code(), 2);
    }

    #[test]
    fn buffer_target_from_str() {
        assert_eq!("mo".parse::<BufferTarget>().unwrap(), BufferTarget::Mo);
        assert_eq!("MT".parse::<BufferTarget>().unwrap(), BufferTarget::Mt);
        assert_eq!("all".parse::<BufferTarget>().unwrap(), BufferTarget::Both);
        assert_eq!("both".parse::<BufferTarget>().unwrap(), BufferTarget::Both);
        assert!("mx".parse::<BufferTarget>().is_err());
    }

    #[test]
    fn session_result_classification() {
        let mut r = SessionResult {
            mo_status: 0,
            momsn: 12,
            mt_status: 1,
            mtmsn: 3,
            mt_length: 20,
            mt_queued: 0,
        };
        assert!(r.mo_succeeded());
        assert!(r.mt_received());

        r.mo_status = 4;
        assert!(r.mo_succeeded());

        r.mo_status = 32;
        assert!(!r.mo_succeeded());
        assert_eq!(r.mo_status_text(), "no network service, unable to initiate call");
    }

    #[test]
    fn mo_status_reserved_codes() {
        assert_eq!(mo_status_text(7), "MO session failed");
        assert_eq!(mo_status_text(36), "MO session failed");
        assert_eq!(mo_status_text(3), "MO message transferred");
    }
}
