//! Wire-level constants.
//!
//! # Format
//!
//! Every stream opens with a four-byte header: `STREAM_MAGIC` then
//! `STREAM_VERSION`, both big-endian `u16`. After the header the stream is
//! a sequence of tagged entities interleaved with framed block data. Tags
//! occupy one byte in the `0x60..=0x6D` range so that a desynchronized
//! reader fails fast on an [`InvalidTag`] instead of misparsing payload
//! bytes as structure.
//!
//! Back-references do not repeat a tag-specific payload: the four bytes
//! after [`TAG_BACKREF`] carry `BASE_WIRE_HANDLE + handle`, where `handle`
//! is the zero-based assignment index on the writing side. Offsetting by
//! `BASE_WIRE_HANDLE` keeps the on-wire value well clear of the tag range,
//! which makes corrupted streams cheap to spot.
//!
//! [`InvalidTag`]: object_graph_core::StreamError::InvalidTag

use object_graph_core::{FieldKind, PrimKind, StreamError, StreamResult};

/// Stream signature, written big-endian as the first two bytes.
pub const STREAM_MAGIC: u16 = 0x4F47;

/// Wire protocol version, written big-endian after the magic.
pub const STREAM_VERSION: u16 = 0x0001;

/// A null reference.
pub const TAG_NULL: u8 = 0x60;

/// A back-reference to an already-assigned handle; followed by `u32`.
pub const TAG_BACKREF: u8 = 0x61;

/// An inline type descriptor definition.
pub const TAG_DESCRIPTOR: u8 = 0x62;

/// An inline proxy descriptor definition.
pub const TAG_PROXY_DESC: u8 = 0x63;

/// A record (new object) entity.
pub const TAG_RECORD: u8 = 0x64;

/// A string entity with a `u16` byte-length prefix.
pub const TAG_STRING: u8 = 0x65;

/// A string entity with a `u64` byte-length prefix, used above 65535 bytes.
pub const TAG_LONG_STRING: u8 = 0x66;

/// An array entity.
pub const TAG_ARRAY: u8 = 0x67;

/// An enum constant entity.
pub const TAG_ENUM: u8 = 0x68;

/// A block-data frame of up to 255 bytes; followed by a `u8` length.
pub const TAG_BLOCK_SHORT: u8 = 0x69;

/// A block-data frame longer than 255 bytes; followed by a `u32` length.
pub const TAG_BLOCK_LONG: u8 = 0x6A;

/// Terminates the custom-data section of one descriptor level.
pub const TAG_END_BLOCK: u8 = 0x6B;

/// Clears both peers' handle tables.
pub const TAG_RESET: u8 = 0x6C;

/// The writer failed mid-stream; followed by a diagnostic string.
pub const TAG_ERROR: u8 = 0x6D;

/// Added to a handle before it is written after [`TAG_BACKREF`].
pub const BASE_WIRE_HANDLE: u32 = 0x0010_0000;

/// Field-kind code for `bool`.
pub const KIND_BOOL: u8 = 0x01;
/// Field-kind code for `i8`.
pub const KIND_I8: u8 = 0x02;
/// Field-kind code for `i16`.
pub const KIND_I16: u8 = 0x03;
/// Field-kind code for a UTF-16 code unit.
pub const KIND_CHAR: u8 = 0x04;
/// Field-kind code for `i32`.
pub const KIND_I32: u8 = 0x05;
/// Field-kind code for `i64`.
pub const KIND_I64: u8 = 0x06;
/// Field-kind code for `f32`.
pub const KIND_F32: u8 = 0x07;
/// Field-kind code for `f64`.
pub const KIND_F64: u8 = 0x08;
/// Field-kind code for a reference field.
pub const KIND_REF: u8 = 0x10;

/// Or-ed into a field-kind byte when the field opts out of sharing.
pub const FIELD_UNSHARED_BIT: u8 = 0x80;

/// The code a primitive kind travels as.
#[inline]
#[must_use]
pub fn prim_code(kind: PrimKind) -> u8 {
    match kind {
        PrimKind::Bool => KIND_BOOL,
        PrimKind::I8 => KIND_I8,
        PrimKind::I16 => KIND_I16,
        PrimKind::Char => KIND_CHAR,
        PrimKind::I32 => KIND_I32,
        PrimKind::I64 => KIND_I64,
        PrimKind::F32 => KIND_F32,
        PrimKind::F64 => KIND_F64,
    }
}

/// Decode a primitive kind code, `None` for anything else.
#[inline]
#[must_use]
pub fn prim_from_code(code: u8) -> Option<PrimKind> {
    match code {
        KIND_BOOL => Some(PrimKind::Bool),
        KIND_I8 => Some(PrimKind::I8),
        KIND_I16 => Some(PrimKind::I16),
        KIND_CHAR => Some(PrimKind::Char),
        KIND_I32 => Some(PrimKind::I32),
        KIND_I64 => Some(PrimKind::I64),
        KIND_F32 => Some(PrimKind::F32),
        KIND_F64 => Some(PrimKind::F64),
        _ => None,
    }
}

/// Encode a field's kind-and-flags byte.
#[inline]
#[must_use]
pub fn encode_field_kind(kind: FieldKind, unshared: bool) -> u8 {
    let code = match kind {
        FieldKind::Prim(p) => prim_code(p),
        FieldKind::Ref => KIND_REF,
    };
    if unshared {
        code | FIELD_UNSHARED_BIT
    } else {
        code
    }
}

/// Decode a field's kind-and-flags byte into `(kind, unshared)`.
///
/// # Errors
///
/// Returns [`StreamError::Corrupt`] on a code outside the defined set.
pub fn decode_field_kind(byte: u8) -> StreamResult<(FieldKind, bool)> {
    let unshared = byte & FIELD_UNSHARED_BIT != 0;
    let code = byte & !FIELD_UNSHARED_BIT;
    if code == KIND_REF {
        return Ok((FieldKind::Ref, unshared));
    }
    match prim_from_code(code) {
        Some(kind) => Ok((FieldKind::Prim(kind), unshared)),
        None => Err(StreamError::Corrupt {
            context: "field kind",
            details: format!("unknown field kind code {code:#04x}"),
        }),
    }
}

/// Human-readable tag name for log and error messages.
#[must_use]
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_NULL => "NULL",
        TAG_BACKREF => "BACKREF",
        TAG_DESCRIPTOR => "DESCRIPTOR",
        TAG_PROXY_DESC => "PROXY_DESC",
        TAG_RECORD => "RECORD",
        TAG_STRING => "STRING",
        TAG_LONG_STRING => "LONG_STRING",
        TAG_ARRAY => "ARRAY",
        TAG_ENUM => "ENUM",
        TAG_BLOCK_SHORT => "BLOCK_SHORT",
        TAG_BLOCK_LONG => "BLOCK_LONG",
        TAG_END_BLOCK => "END_BLOCK",
        TAG_RESET => "RESET",
        TAG_ERROR => "ERROR",
        _ => "UNKNOWN",
    }
}
