//! AT command builders and response grammars.
//!
//! Every supported AT verb is built by one `cmd_*` function that returns a
//! [`Command`]: the command text plus the [`ResponseShape`] the transceiver
//! must use to read the reply. Structured replies are described by a
//! [`Grammar`] (prefix, ordered typed fields, delimiter) and parsed by one
//! generic function, [`Grammar::parse`]; the `parse_*` functions lift the
//! parsed fields into the typed results from `sbdlink-core`.
//!
//! All functions are pure. Parsers take the normalized reply text (see
//! [`normalize`](crate::text::normalize)).

use sbdlink_core::{BufferTarget, Error, Geolocation, Result, SbdStatus, SessionResult};

use crate::frame::validate_length;

/// Line terminator appended to every command.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Echo off, verbose codes, no flow control, quiet mode.
pub const INIT: &str = "ATE0V1&K0Q1";

/// Prefix line of a `+SBDRT` reply; the MT message follows on the next line.
pub const READ_TEXT_PREFIX: &str = "+SBDRT:";

const MISMATCH: &str = "field count/format mismatch";

// ---------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------

/// Type of one field in a structured reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed decimal integer.
    Int,
    /// Hexadecimal integer, no `0x` prefix.
    Hex,
    /// Free text. Only valid as the last field; it keeps the rest of the line.
    Text,
}

/// One parsed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Int(i64),
    Text(String),
}

impl Field {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s.as_str()),
            Field::Int(_) => None,
        }
    }
}

/// Shape of a structured text reply: `<prefix><field><delim><field>...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    pub prefix: &'static str,
    pub fields: &'static [FieldKind],
    pub delimiter: char,
}

impl Grammar {
    /// Parse `text` into exactly `self.fields.len()` typed fields.
    ///
    /// Whitespace around numeric fields is ignored. Any deviation from the
    /// grammar yields `Error::Protocol("field count/format mismatch")` with
    /// the text attached.
    pub fn parse(&self, text: &str) -> Result<Vec<Field>> {
        let mismatch = || Error::protocol(MISMATCH, text.as_bytes());

        let body = text.strip_prefix(self.prefix).ok_or_else(mismatch)?;
        let parts: Vec<&str> = body.splitn(self.fields.len(), self.delimiter).collect();
        if parts.len() != self.fields.len() {
            return Err(mismatch());
        }

        self.fields
            .iter()
            .zip(parts)
            .map(|(kind, part)| match kind {
                FieldKind::Int => part.trim().parse().map(Field::Int).map_err(|_| mismatch()),
                FieldKind::Hex => i64::from_str_radix(part.trim(), 16)
                    .map(Field::Int)
                    .map_err(|_| mismatch()),
                FieldKind::Text => Ok(Field::Text(part.to_string())),
            })
            .collect()
    }
}

use FieldKind::{Hex, Int, Text};

pub static SIGNAL_QUALITY: Grammar = Grammar {
    prefix: "+CSQ:",
    fields: &[Int],
    delimiter: ',',
};

pub static STATUS: Grammar = Grammar {
    prefix: "+SBDS:",
    fields: &[Int, Int, Int, Int],
    delimiter: ',',
};

pub static EXTENDED_STATUS: Grammar = Grammar {
    prefix: "+SBDSX:",
    fields: &[Int, Int, Int, Int, Int, Int],
    delimiter: ',',
};

pub static SESSION: Grammar = Grammar {
    prefix: "+SBDIX:",
    fields: &[Int, Int, Int, Int, Int, Int],
    delimiter: ',',
};

pub static GEOLOCATION: Grammar = Grammar {
    prefix: "-MSGEO:",
    fields: &[Int, Int, Int, Hex],
    delimiter: ',',
};

pub static SYSTEM_TIME: Grammar = Grammar {
    prefix: "-MSSTM:",
    fields: &[Hex],
    delimiter: ',',
};

pub static GATEWAY: Grammar = Grammar {
    prefix: "+SBDGW:",
    fields: &[Text],
    delimiter: ',',
};

/// Bare numeric result code, as returned by `+SBDD`, `+SBDC`, and the data
/// phase of `+SBDWT` / `+SBDWB`.
pub static RESULT_CODE: Grammar = Grammar {
    prefix: "",
    fields: &[Int],
    delimiter: ',',
};

pub static COPY_MO_TO_MT: Grammar = Grammar {
    prefix: "SBDTC: Outbound SBD Copied to Inbound SBD: size =",
    fields: &[Int],
    delimiter: ',',
};

// ---------------------------------------------------------------
// Commands
// ---------------------------------------------------------------

/// How the transceiver reads the reply to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// No information text; `OK`, or nothing at all in quiet mode.
    Ack,
    /// Free-form text, returned normalized.
    PlainText,
    /// Text parsed against a grammar.
    Structured(&'static Grammar),
    /// A prefix line followed by one line of message text. The message is
    /// taken by position and returned verbatim.
    Message(&'static str),
    /// A length-prefixed binary frame read in raw mode.
    Binary,
}

/// One AT command and the reply shape it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    expects: ResponseShape,
    long_running: bool,
}

impl Command {
    fn new(text: impl Into<String>, expects: ResponseShape) -> Self {
        Command {
            text: text.into(),
            expects,
            long_running: false,
        }
    }

    fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Command text without the terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expects(&self) -> ResponseShape {
        self.expects
    }

    /// Whether the reply waits on a satellite session rather than the modem
    /// alone; such commands get the session timeout.
    pub fn is_long_running(&self) -> bool {
        self.long_running
    }

    /// Wire bytes, terminator included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.text.len() + TERMINATOR.len());
        out.extend_from_slice(self.text.as_bytes());
        out.extend_from_slice(TERMINATOR);
        out
    }
}

/// Line setup sent once after opening the port.
pub fn cmd_init() -> Command {
    Command::new(INIT, ResponseShape::Ack)
}

/// Firmware revision (`ATI3`).
pub fn cmd_firmware_revision() -> Command {
    Command::new("ATI3", ResponseShape::PlainText)
}

/// Product family / hardware identity (`ATI4`).
pub fn cmd_product_family() -> Command {
    Command::new("ATI4", ResponseShape::PlainText)
}

/// Hardware specification (`ATI7`).
pub fn cmd_hardware_spec() -> Command {
    Command::new("ATI7", ResponseShape::PlainText)
}

/// Serial number / IMEI (`AT+CGSN`).
pub fn cmd_imei() -> Command {
    Command::new("AT+CGSN", ResponseShape::PlainText)
}

pub fn cmd_signal_quality() -> Command {
    Command::new("AT+CSQ", ResponseShape::Structured(&SIGNAL_QUALITY))
}

pub fn cmd_gateway() -> Command {
    Command::new("AT+SBDGW", ResponseShape::Structured(&GATEWAY))
}

pub fn cmd_geolocation() -> Command {
    Command::new("AT-MSGEO", ResponseShape::Structured(&GEOLOCATION))
}

/// Iridium system time. Replies either with a hex tick count or with
/// `no network service`, so the reply is read as plain text.
pub fn cmd_system_time() -> Command {
    Command::new("AT-MSSTM", ResponseShape::PlainText)
}

pub fn cmd_status() -> Command {
    Command::new("AT+SBDS", ResponseShape::Structured(&STATUS))
}

pub fn cmd_extended_status() -> Command {
    Command::new("AT+SBDSX", ResponseShape::Structured(&EXTENDED_STATUS))
}

/// Start an SBD session (`AT+SBDIX`).
pub fn cmd_initiate_session() -> Command {
    Command::new("AT+SBDIX", ResponseShape::Structured(&SESSION)).long_running()
}

/// Announce a text message; the modem answers `READY`.
pub fn cmd_write_text() -> Command {
    Command::new("AT+SBDWT", ResponseShape::PlainText)
}

/// Announce a binary message of `len` bytes; the modem answers `READY`.
///
/// Lengths outside `1..=340` are rejected here, before any I/O.
pub fn cmd_write_binary(len: usize) -> Result<Command> {
    validate_length(len)?;
    Ok(Command::new(
        format!("AT+SBDWB={len}"),
        ResponseShape::PlainText,
    ))
}

pub fn cmd_read_text() -> Command {
    Command::new("AT+SBDRT", ResponseShape::Message(READ_TEXT_PREFIX))
}

pub fn cmd_read_binary() -> Command {
    Command::new("AT+SBDRB", ResponseShape::Binary)
}

/// Clear the MO buffer, the MT buffer, or both (`AT+SBDDn`).
pub fn cmd_clear_buffers(target: BufferTarget) -> Command {
    Command::new(
        format!("AT+SBDD{}", target.code()),
        ResponseShape::Structured(&RESULT_CODE),
    )
}

/// Reset the MO sequence number (`AT+SBDC`).
pub fn cmd_clear_mo_sequence() -> Command {
    Command::new("AT+SBDC", ResponseShape::Structured(&RESULT_CODE))
}

/// Copy the MO buffer into the MT buffer (`AT+SBDTC`).
pub fn cmd_copy_mo_to_mt() -> Command {
    Command::new("AT+SBDTC", ResponseShape::Structured(&COPY_MO_TO_MT))
}

/// Enable or disable unsolicited indicator reporting (`AT+CIER`).
pub fn cmd_event_reporting(on: bool) -> Command {
    let text = if on { "AT+CIER=1,1,1" } else { "AT+CIER=0" };
    Command::new(text, ResponseShape::Ack)
}

// ---------------------------------------------------------------
// Typed response parsers
// ---------------------------------------------------------------

fn int_at(fields: &[Field], index: usize, text: &str) -> Result<i64> {
    fields
        .get(index)
        .and_then(Field::as_int)
        .ok_or_else(|| Error::protocol(MISMATCH, text.as_bytes()))
}

fn narrow<T: TryFrom<i64>>(value: i64, text: &str) -> Result<T> {
    T::try_from(value).map_err(|_| Error::protocol(MISMATCH, text.as_bytes()))
}

fn flag(value: i64, text: &str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::protocol(MISMATCH, text.as_bytes())),
    }
}

/// Parse `+CSQ:<n>` into a signal quality of 0 to 5.
pub fn parse_signal_quality(text: &str) -> Result<u8> {
    let fields = SIGNAL_QUALITY.parse(text)?;
    let value = int_at(&fields, 0, text)?;
    if !(0..=5).contains(&value) {
        return Err(Error::protocol(
            format!("signal quality {value} out of range 0..=5"),
            text.as_bytes(),
        ));
    }
    narrow(value, text)
}

/// Parse `+SBDS:` (four fields) or `+SBDSX:` (six fields).
pub fn parse_status(text: &str) -> Result<SbdStatus> {
    let extended = text.starts_with(EXTENDED_STATUS.prefix);
    let fields = if extended {
        EXTENDED_STATUS.parse(text)?
    } else {
        STATUS.parse(text)?
    };

    let int = |i| int_at(&fields, i, text);
    let mtmsn = int(3)?;
    Ok(SbdStatus {
        mo_flag: flag(int(0)?, text)?,
        momsn: narrow(int(1)?, text)?,
        mt_flag: flag(int(2)?, text)?,
        mtmsn: narrow(mtmsn, text)?,
        ring_alert: if extended {
            Some(flag(int(4)?, text)?)
        } else {
            None
        },
        queued: if extended {
            Some(narrow(int(5)?, text)?)
        } else {
            None
        },
    })
}

/// Parse `+SBDIX:<mo>,<momsn>,<mt>,<mtmsn>,<mtlen>,<queued>`.
pub fn parse_session(text: &str) -> Result<SessionResult> {
    let fields = SESSION.parse(text)?;
    let int = |i| int_at(&fields, i, text);
    Ok(SessionResult {
        mo_status: narrow(int(0)?, text)?,
        momsn: narrow(int(1)?, text)?,
        mt_status: narrow(int(2)?, text)?,
        mtmsn: narrow(int(3)?, text)?,
        mt_length: narrow(int(4)?, text)?,
        mt_queued: narrow(int(5)?, text)?,
    })
}

/// Parse `-MSGEO:<x>,<y>,<z>,<time_hex>`.
///
/// An all-zero position means the modem has no fix and yields `None`.
pub fn parse_geolocation(text: &str) -> Result<Option<Geolocation>> {
    let fields = GEOLOCATION.parse(text)?;
    let int = |i| int_at(&fields, i, text);
    let geo = Geolocation {
        x: narrow(int(0)?, text)?,
        y: narrow(int(1)?, text)?,
        z: narrow(int(2)?, text)?,
        timestamp: narrow(int(3)?, text)?,
    };
    if geo.x == 0 && geo.y == 0 && geo.z == 0 {
        return Ok(None);
    }
    Ok(Some(geo))
}

/// Parse `-MSSTM:<time_hex>`; `None` when the modem has no network time.
pub fn parse_system_time(text: &str) -> Result<Option<u32>> {
    if text.contains("no network service") {
        return Ok(None);
    }
    let fields = SYSTEM_TIME.parse(text)?;
    narrow(int_at(&fields, 0, text)?, text).map(Some)
}

/// Parse `+SBDGW:<name>`, trimmed.
pub fn parse_gateway(text: &str) -> Result<String> {
    let fields = GATEWAY.parse(text)?;
    Ok(fields
        .first()
        .and_then(Field::as_text)
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// Parse a bare numeric result code.
pub fn parse_result_code(text: &str) -> Result<i64> {
    let fields = RESULT_CODE.parse(text)?;
    int_at(&fields, 0, text)
}

/// Parse the `+SBDTC` confirmation into the number of bytes copied.
pub fn parse_copy_size(text: &str) -> Result<usize> {
    let fields = COPY_MO_TO_MT.parse(text)?;
    narrow(int_at(&fields, 0, text)?, text)
}
