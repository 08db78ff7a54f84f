//! SBD binary frame encoder/decoder.
//!
//! Binary writes (`+SBDWB`) and binary reads (`+SBDRB`) move the message as a
//! length-prefixed, checksum-trailed frame. This module handles the pure
//! byte-level encoding and the incremental decoding of such frames.
//!
//! # Frame format
//!
//! ```text
//! <len_hi> <len_lo> <payload...> <sum_hi> <sum_lo>
//! ```
//!
//! - `len`: payload length, big-endian `u16`
//! - `payload`: `len` message bytes
//! - `sum`: low 16 bits of the arithmetic sum of the payload bytes, big-endian
//!
//! A complete frame never exceeds [`MAX_FRAME`] bytes.
//!
//! On the write side only `payload` and `sum` go on the wire; the length
//! travels in the command text (`AT+SBDWB=<len>`).

use bytes::{BufMut, BytesMut};
use sbdlink_core::{Error, Result};

/// Largest frame the modem exchanges, header and trailer included.
pub const MAX_FRAME: usize = 350;

/// Largest payload accepted for an outbound message.
pub const MAX_PAYLOAD: usize = 340;

/// Largest payload length a received frame may declare (`L + 4 <= MAX_FRAME`).
pub const MAX_DECLARED: usize = MAX_FRAME - 4;

/// Bytes taken by the length prefix.
pub const HEADER_LEN: usize = 2;

/// Bytes taken by the checksum trailer.
pub const TRAILER_LEN: usize = 2;

/// Low 16 bits of the sum of all bytes in `payload`.
///
/// ```
/// use sbdlink_at::frame::checksum;
///
/// assert_eq!(checksum(b"HELLO"), 0x021C);
/// ```
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Check an outbound payload length against `1..=MAX_PAYLOAD`.
pub fn validate_length(len: usize) -> Result<()> {
    if len == 0 || len > MAX_PAYLOAD {
        return Err(Error::Length {
            len,
            max: MAX_PAYLOAD,
        });
    }
    Ok(())
}

/// An outbound SBD frame.
///
/// Constructing a `Frame` validates the payload size, so a value of this
/// type can always be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
    checksum: u16,
}

impl Frame {
    /// Build a frame around `payload`, rejecting empty or oversized payloads
    /// with [`Error::Length`].
    pub fn new(payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        validate_length(payload.len())?;
        let checksum = checksum(&payload);
        Ok(Frame { payload, checksum })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always `false`; an empty frame cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// The full wire frame: length prefix, payload, checksum trailer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.len() + TRAILER_LEN);
        // len() <= MAX_PAYLOAD, always fits.
        buf.put_u16(self.len() as u16);
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum);
        buf.to_vec()
    }

    /// Payload followed by the checksum trailer, as sent after `+SBDWB`.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.len() + TRAILER_LEN);
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum);
        buf.to_vec()
    }
}

/// Encode `payload` into a complete wire frame.
///
/// # Example
///
/// ```
/// use sbdlink_at::frame::encode_frame;
///
/// let bytes = encode_frame(b"HELLO").unwrap();
/// assert_eq!(bytes, vec![0x00, 0x05, 0x48, 0x45, 0x4C, 0x4C, 0x4F, 0x02, 0x1C]);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    Ok(Frame::new(payload)?.encode())
}

/// Result of feeding bytes into a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The frame is not complete yet; `needed` more bytes are expected.
    Incomplete { needed: usize },
    /// The frame verified. `consumed` is how many of the bytes passed to
    /// the final `feed` call were used; anything after that is not part of
    /// the frame.
    Complete { payload: Vec<u8>, consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitLength,
    AwaitBody { declared: usize },
    Done,
}

/// Incremental decoder for one inbound frame.
///
/// Bytes may be fed in chunks of any size, including empty ones. The
/// decoder reads the two-byte length first, then exactly `declared + 2`
/// more bytes, then verifies the trailer. It never consumes bytes past the
/// end of the frame.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecodeState,
    buf: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            state: DecodeState::AwaitLength,
            buf: Vec::with_capacity(MAX_FRAME),
        }
    }

    /// Bytes still required before the current stage completes.
    ///
    /// While the length is unknown this is the size of the length prefix;
    /// afterwards it is the rest of the frame. Zero once done.
    pub fn remaining(&self) -> usize {
        match self.state {
            DecodeState::AwaitLength => HEADER_LEN - self.buf.len(),
            DecodeState::AwaitBody { declared } => {
                HEADER_LEN + declared + TRAILER_LEN - self.buf.len()
            }
            DecodeState::Done => 0,
        }
    }

    /// Everything accumulated so far, header included.
    pub fn received(&self) -> &[u8] {
        &self.buf
    }

    /// Payload length announced by the frame header, once known.
    pub fn declared_len(&self) -> Option<usize> {
        match self.state {
            DecodeState::AwaitBody { declared } => Some(declared),
            _ if self.buf.len() >= HEADER_LEN => {
                Some(usize::from(u16::from_be_bytes([self.buf[0], self.buf[1]])))
            }
            _ => None,
        }
    }

    /// Feed newly read bytes.
    ///
    /// Returns [`Error::Protocol`] if the header declares an impossible
    /// length and [`Error::ChecksumMismatch`] (carrying the payload) if the
    /// trailer disagrees with the sum. Feeding after completion is a
    /// protocol error.
    pub fn feed(&mut self, data: &[u8]) -> Result<Decoded> {
        let mut consumed = 0;

        loop {
            match self.state {
                DecodeState::Done => {
                    return Err(Error::protocol("frame already decoded", data));
                }
                DecodeState::AwaitLength => {
                    let take = self.remaining().min(data.len() - consumed);
                    self.buf.extend_from_slice(&data[consumed..consumed + take]);
                    consumed += take;
                    if self.buf.len() < HEADER_LEN {
                        return Ok(Decoded::Incomplete {
                            needed: self.remaining(),
                        });
                    }

                    let declared = usize::from(u16::from_be_bytes([self.buf[0], self.buf[1]]));
                    if declared > MAX_DECLARED {
                        return Err(Error::protocol(
                            format!(
                                "declared frame length {declared} exceeds maximum {MAX_DECLARED}"
                            ),
                            &self.buf,
                        ));
                    }
                    self.state = DecodeState::AwaitBody { declared };
                }
                DecodeState::AwaitBody { declared } => {
                    let take = self.remaining().min(data.len() - consumed);
                    self.buf.extend_from_slice(&data[consumed..consumed + take]);
                    consumed += take;
                    if self.remaining() > 0 {
                        return Ok(Decoded::Incomplete {
                            needed: self.remaining(),
                        });
                    }

                    self.state = DecodeState::Done;
                    let body = &self.buf[HEADER_LEN..];
                    let payload = &body[..declared];
                    let trailer = u16::from_be_bytes([body[declared], body[declared + 1]]);
                    let calculated = checksum(payload);
                    if trailer != calculated {
                        return Err(Error::ChecksumMismatch {
                            trailer,
                            calculated: Some(calculated),
                            payload: payload.to_vec(),
                        });
                    }
                    return Ok(Decoded::Complete {
                        payload: payload.to_vec(),
                        consumed,
                    });
                }
            }
        }
    }
}

/// Decode a complete frame held in `buf`.
///
/// Convenience wrapper around [`FrameDecoder`] for buffers that already hold
/// the whole frame. Returns `Decoded::Incomplete` if `buf` is short.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded> {
    FrameDecoder::new().feed(buf)
}
