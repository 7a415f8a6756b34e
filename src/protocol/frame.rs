//! Binary frame codec.
//!
//! Pure transformation between a byte buffer and a structured [`Frame`];
//! no I/O. Decoding assumes the buffer holds exactly one complete frame —
//! partial frames are not buffered across calls and fragmented messages
//! are not reassembled.
//!
//! Wire layout (big-endian):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |  Masking-key, if MASK set to 1  |          Payload Data       |
//! +---------------------------------+-----------------------------+
//! ```
//!
//! Text payloads are decoded byte-per-code-unit (each payload byte becomes
//! one character), not as UTF-8. This matches the peer's `charCodeAt`-style
//! framing and is kept for wire compatibility.

use crate::error::FrameDecodeError;
use crate::protocol::opcode::Opcode;

/// Default upper bound on a declared payload length (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: u64 = 16 * 1024 * 1024;

/// Raw length-field marker selecting the 16-bit extended regime.
const PAYLOAD_LEN_EXT16: u8 = 126;
/// Raw length-field marker selecting the 64-bit extended regime.
const PAYLOAD_LEN_EXT64: u8 = 127;

/// One decoded unit of wire transfer.
///
/// Constructed fresh per inbound chunk by [`Frame::decode`]; immutable
/// once decoded; discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// True if this frame completes the message.
    pub fin: bool,
    /// The opcode bits exactly as received. Values outside the enumerated
    /// set are preserved here but match none of the classifiers.
    pub raw_opcode: u8,
    /// True when the payload bytes are masked (mandatory client → server).
    pub masked: bool,
    /// 4-byte masking key, present only when `masked`.
    pub masking_key: Option<[u8; 4]>,
    /// Logical payload length declared by the header.
    pub payload_length: u64,
    /// Payload bytes exactly as received (still masked, if masked).
    pub raw_payload: Vec<u8>,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
    /// Byte-per-code-unit decoding of `payload`, populated for Text frames.
    pub text: Option<String>,
}

impl Frame {
    /// Decodes a single frame from `buf`.
    ///
    /// The buffer is assumed to contain exactly one frame; trailing bytes
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FrameDecodeError::Truncated`] if the buffer ends before
    /// the declared frame does, and [`FrameDecodeError::PayloadTooLarge`]
    /// if the declared length exceeds `max_payload`.
    pub fn decode(buf: &[u8], max_payload: u64) -> Result<Self, FrameDecodeError> {
        let byte0 = byte_at(buf, 0)?;
        let byte1 = byte_at(buf, 1)?;

        let fin = byte0 & 0x80 != 0;
        let raw_opcode = byte0 & 0x0F;
        let masked = byte1 & 0x80 != 0;

        let (payload_length, key_offset) = match byte1 & 0x7F {
            PAYLOAD_LEN_EXT16 => (extended_length(buf, 2)?, 4),
            PAYLOAD_LEN_EXT64 => (extended_length(buf, 8)?, 10),
            short => (u64::from(short), 2),
        };

        if payload_length > max_payload {
            return Err(FrameDecodeError::PayloadTooLarge {
                length: payload_length,
                max: max_payload,
            });
        }
        let payload_len = usize::try_from(payload_length).map_err(|_| {
            FrameDecodeError::PayloadTooLarge {
                length: payload_length,
                max: max_payload,
            }
        })?;

        let (masking_key, payload_start) = if masked {
            let key = [
                byte_at(buf, key_offset)?,
                byte_at(buf, key_offset + 1)?,
                byte_at(buf, key_offset + 2)?,
                byte_at(buf, key_offset + 3)?,
            ];
            (Some(key), key_offset + 4)
        } else {
            (None, key_offset)
        };

        let payload_end = payload_start + payload_len;
        let raw_payload = buf
            .get(payload_start..payload_end)
            .ok_or(FrameDecodeError::Truncated {
                needed: payload_end - buf.len(),
            })?
            .to_vec();

        let payload = match masking_key {
            Some(key) => apply_mask(&raw_payload, key),
            None => raw_payload.clone(),
        };

        let text = if Opcode::from_bits(raw_opcode) == Some(Opcode::Text) {
            Some(payload.iter().map(|&b| char::from(b)).collect())
        } else {
            None
        };

        Ok(Self {
            fin,
            raw_opcode,
            masked,
            masking_key,
            payload_length,
            raw_payload,
            payload,
            text,
        })
    }

    /// Encodes `msg` as a single unmasked, final, Text-opcode frame.
    ///
    /// Server → client frames are never masked in this protocol variant.
    /// Each character contributes its code value truncated to one payload
    /// byte, mirroring the byte-per-code-unit decode; round-trips exactly
    /// for strings of single-byte-representable characters.
    #[must_use]
    pub fn encode_text(msg: &str) -> Vec<u8> {
        let payload: Vec<u8> = msg.chars().map(|c| (u32::from(c) & 0xFF) as u8).collect();
        let len = payload.len();

        let mut frame = Vec::with_capacity(len + 10);
        frame.push(0x80 | Opcode::Text.bits());

        // The mask bit stays 0 in every regime: the three markers below
        // are all < 0x80.
        if len < usize::from(PAYLOAD_LEN_EXT16) {
            frame.push(len as u8);
        } else if len <= usize::from(u16::MAX) {
            frame.push(PAYLOAD_LEN_EXT16);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            frame.push(PAYLOAD_LEN_EXT64);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }

        frame.extend_from_slice(&payload);
        frame
    }

    /// Returns the decoded opcode, or `None` for reserved values.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_bits(self.raw_opcode)
    }

    /// True for Text frames.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode() == Some(Opcode::Text)
    }

    /// True for Binary frames.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.opcode() == Some(Opcode::Binary)
    }

    /// True for Close frames.
    #[must_use]
    pub fn is_close(&self) -> bool {
        self.opcode() == Some(Opcode::Close)
    }

    /// True for protocol-level Ping frames.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.opcode() == Some(Opcode::Ping)
    }

    /// True for protocol-level Pong frames.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.opcode() == Some(Opcode::Pong)
    }
}

/// XORs `data` with the repeating 4-byte `key`.
///
/// Masking is its own inverse: applying it twice with the same key yields
/// the original bytes.
#[must_use]
pub fn apply_mask(data: &[u8], key: [u8; 4]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// Reads the byte at `index`, reporting how far short the buffer fell.
fn byte_at(buf: &[u8], index: usize) -> Result<u8, FrameDecodeError> {
    buf.get(index)
        .copied()
        .ok_or(FrameDecodeError::Truncated {
            needed: index + 1 - buf.len(),
        })
}

/// Decodes a big-endian extended length of `count` bytes starting at
/// offset 2, summing each byte shifted by its byte position.
fn extended_length(buf: &[u8], count: usize) -> Result<u64, FrameDecodeError> {
    let mut length = 0u64;
    for i in 0..count {
        length = (length << 8) | u64::from(byte_at(buf, 2 + i)?);
    }
    Ok(length)
}
