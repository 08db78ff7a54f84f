//! AT command transceiver and SBD modem verbs for sbdlink.
//!
//! This crate implements the command/response protocol spoken by Iridium
//! short-burst-data modems over a half-duplex serial line. It provides:
//!
//! - **Frame codec** ([`frame`]) -- encode and incrementally decode the
//!   length-prefixed, checksum-trailed binary frames used by `+SBDWB` and
//!   `+SBDRB`.
//! - **Text handling** ([`text`]) -- detect when a line-oriented reply is
//!   complete and normalize it into a single clean line.
//! - **Command table** ([`commands`]) -- build AT commands together with the
//!   shape of their reply, and parse structured replies through a
//!   declarative grammar.
//! - **Transceiver** ([`io`]) -- drive one write-then-read cycle per
//!   command, switching the line into raw mode around binary phases.
//! - **SbdModem** ([`modem`]) -- the modem verbs (query, session, write,
//!   read, clear, copy) with retry policy.
//! - **ModemBuilder** ([`builder`]) -- fluent builder with serial and
//!   timing settings.
//!
//! # Example
//!
//! ```
//! use sbdlink_at::frame::{decode_frame, encode_frame, Decoded};
//! use sbdlink_at::commands::parse_signal_quality;
//! use sbdlink_at::text::normalize;
//!
//! let wire = encode_frame(b"HELLO").unwrap();
//! assert_eq!(wire, vec![0x00, 0x05, 0x48, 0x45, 0x4C, 0x4C, 0x4F, 0x02, 0x1C]);
//! if let Decoded::Complete { payload, .. } = decode_frame(&wire).unwrap() {
//!     assert_eq!(payload, b"HELLO");
//! }
//!
//! let text = normalize(b"+CSQ:4\r\n\r\nOK\r\n").unwrap();
//! assert_eq!(parse_signal_quality(&text).unwrap(), 4);
//! ```

pub mod builder;
pub mod commands;
pub mod frame;
pub mod io;
pub mod modem;
pub mod text;

pub use builder::ModemBuilder;
pub use io::{AtTransceiver, IoConfig, Reply};
pub use modem::SbdModem;
