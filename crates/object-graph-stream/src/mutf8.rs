//! Modified UTF-8 string codec.
//!
//! # Format
//!
//! Strings on the wire are encoded per UTF-16 code unit:
//! - `0x0001..=0x007F` as one byte
//! - `0x0000` and `0x0080..=0x07FF` as two bytes
//! - everything else as three bytes
//!
//! Characters outside the Basic Multilingual Plane therefore travel as a
//! surrogate pair, six bytes total. Encoding `0x0000` as the two-byte
//! sequence `0xC0 0x80` keeps raw `0x00` out of encoded text, though the
//! decoder accepts a bare `0x00` from peers that never apply the escape.

use object_graph_core::StreamError;
use thiserror::Error;

/// A malformed modified-UTF-8 byte sequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Mutf8Error {
    /// A continuation or leading byte did not match any valid pattern.
    #[error("Invalid modified UTF-8 byte {byte:#04x} at offset {offset}")]
    InvalidByte { byte: u8, offset: usize },

    /// The input ended inside a multi-byte sequence.
    #[error("Truncated modified UTF-8 sequence at offset {offset}")]
    Truncated { offset: usize },

    /// The decoded code units contained an unpaired surrogate.
    #[error("Unpaired surrogate in decoded text")]
    UnpairedSurrogate,
}

impl From<Mutf8Error> for StreamError {
    fn from(e: Mutf8Error) -> Self {
        StreamError::Corrupt {
            context: "string data",
            details: e.to_string(),
        }
    }
}

/// Number of bytes `s` occupies once encoded.
#[must_use]
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Encode `s` into a fresh byte buffer.
#[must_use]
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(s));
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}

/// Decode a modified-UTF-8 byte buffer.
///
/// # Errors
///
/// Returns [`Mutf8Error`] on malformed sequences or when the decoded code
/// units contain an unpaired surrogate.
pub fn decode(bytes: &[u8]) -> Result<String, Mutf8Error> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or(Mutf8Error::Truncated { offset: i })?;
            if b2 & 0xC0 != 0x80 {
                return Err(Mutf8Error::InvalidByte {
                    byte: b2,
                    offset: i + 1,
                });
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            if i + 2 >= bytes.len() {
                return Err(Mutf8Error::Truncated { offset: i });
            }
            let (b2, b3) = (bytes[i + 1], bytes[i + 2]);
            if b2 & 0xC0 != 0x80 {
                return Err(Mutf8Error::InvalidByte {
                    byte: b2,
                    offset: i + 1,
                });
            }
            if b3 & 0xC0 != 0x80 {
                return Err(Mutf8Error::InvalidByte {
                    byte: b3,
                    offset: i + 2,
                });
            }
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return Err(Mutf8Error::InvalidByte { byte: b, offset: i });
        }
    }
    String::from_utf16(&units).map_err(|_| Mutf8Error::UnpairedSurrogate)
}
