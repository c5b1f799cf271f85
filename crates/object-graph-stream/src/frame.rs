//! Block-data framing over raw byte streams.
//!
//! # Format
//!
//! The stream alternates between two modes. In raw mode bytes pass straight
//! through; tags and entity payloads are written this way. In block mode
//! data bytes are gathered into frames, each preceded by [`TAG_BLOCK_SHORT`]
//! plus a `u8` length (up to 255 bytes) or [`TAG_BLOCK_LONG`] plus a `u32`
//! length. Custom hook payloads travel as block data so a reader that knows
//! nothing about a hook can still skip its section frame by frame.
//!
//! The reader mirrors the writer's modes. A data read in block mode draws
//! from the current frame, opening the next frame when one ends; when the
//! byte after a frame is not a block tag the custom section is over and
//! data reads report [`StreamError::EndOfCustomData`] until the mode is
//! switched back to raw.

use std::io::{self, Read, Write};

use object_graph_core::{StreamError, StreamResult};

use crate::wire::{TAG_BLOCK_LONG, TAG_BLOCK_SHORT};

/// Framing state shared by both stream directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Bytes pass through unframed. Tags live here.
    Raw,
    /// Data bytes are buffered into length-prefixed block frames.
    Block,
}

fn map_eof(e: io::Error, context: &'static str) -> StreamError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StreamError::UnexpectedEof { context }
    } else {
        StreamError::Io(e)
    }
}

/// Mode-aware buffered writer for the wire format.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    inner: W,
    mode: StreamMode,
    buf: Vec<u8>,
    cap: usize,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap `inner`, buffering at most `cap` bytes per block frame.
    #[must_use]
    pub fn new(inner: W, cap: usize) -> Self {
        Self {
            inner,
            mode: StreamMode::Raw,
            buf: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Current framing mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Switch modes. Leaving block mode drains any buffered frame first.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from draining.
    pub fn set_mode(&mut self, mode: StreamMode) -> StreamResult<()> {
        if self.mode == StreamMode::Block && mode == StreamMode::Raw {
            self.drain()?;
        }
        self.mode = mode;
        Ok(())
    }

    /// Write a structural tag byte. Only valid in raw mode.
    pub fn write_tag(&mut self, tag: u8) -> StreamResult<()> {
        debug_assert_eq!(self.mode, StreamMode::Raw, "tag written in block mode");
        debug_assert!(self.buf.is_empty());
        self.inner.write_all(&[tag])?;
        Ok(())
    }

    /// Write data bytes through the current mode.
    pub fn write(&mut self, bytes: &[u8]) -> StreamResult<()> {
        match self.mode {
            StreamMode::Raw => self.inner.write_all(bytes)?,
            StreamMode::Block => {
                let mut rest = bytes;
                while !rest.is_empty() {
                    let room = self.cap - self.buf.len();
                    let take = room.min(rest.len());
                    self.buf.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    if self.buf.len() == self.cap {
                        self.drain()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush the buffered frame, if any, with its length prefix.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the underlying sink.
    pub fn drain(&mut self) -> StreamResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let len = self.buf.len();
        if len <= usize::from(u8::MAX) {
            self.inner.write_all(&[TAG_BLOCK_SHORT, len as u8])?;
        } else {
            self.inner.write_all(&[TAG_BLOCK_LONG])?;
            self.inner.write_all(&(len as u32).to_be_bytes())?;
        }
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> StreamResult<()> {
        self.write(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_bool(&mut self, v: bool) -> StreamResult<()> {
        self.write(&[u8::from(v)])
    }

    pub fn write_i8(&mut self, v: i8) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> StreamResult<()> {
        self.write(&v.to_be_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> StreamResult<()> {
        self.write_u32(v.to_bits())
    }

    pub fn write_f64(&mut self, v: f64) -> StreamResult<()> {
        self.write_u64(v.to_bits())
    }

    /// Drain, flush the sink, and hand it back.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from draining or flushing.
    pub fn finish(mut self) -> StreamResult<W> {
        self.drain()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Mode-aware reader for the wire format.
#[derive(Debug)]
pub struct FrameReader<R: Read> {
    inner: R,
    mode: StreamMode,
    peeked: Option<u8>,
    block_remaining: u64,
}

impl<R: Read> FrameReader<R> {
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            mode: StreamMode::Raw,
            peeked: None,
            block_remaining: 0,
        }
    }

    /// Current framing mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Bytes left in the currently open block frame.
    #[inline]
    #[must_use]
    pub fn block_remaining(&self) -> u64 {
        self.block_remaining
    }

    /// Give back the underlying reader, discarding framing state.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Switch modes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] when leaving block mode with
    /// frame bytes still unread; the caller must drain or consume them
    /// first, otherwise the next tag read would land inside payload data.
    pub fn set_mode(&mut self, mode: StreamMode) -> StreamResult<()> {
        if self.mode == StreamMode::Block
            && mode == StreamMode::Raw
            && self.block_remaining > 0
        {
            return Err(StreamError::Protocol {
                context: "framing",
                details: format!(
                    "left block mode with {} unread frame bytes",
                    self.block_remaining
                ),
            });
        }
        self.mode = mode;
        Ok(())
    }

    fn raw_byte(&mut self, context: &'static str) -> StreamResult<u8> {
        if let Some(b) = self.peeked.take() {
            return Ok(b);
        }
        let mut byte = [0u8; 1];
        self.inner
            .read_exact(&mut byte)
            .map_err(|e| map_eof(e, context))?;
        Ok(byte[0])
    }

    fn raw_exact(&mut self, buf: &mut [u8], context: &'static str) -> StreamResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            start = 1;
        }
        self.inner
            .read_exact(&mut buf[start..])
            .map_err(|e| map_eof(e, context))?;
        Ok(())
    }

    /// Look at the next byte without consuming it.
    ///
    /// Only meaningful between frames or in raw mode; inside a block frame
    /// the next byte is payload, not structure.
    pub fn peek_u8(&mut self) -> StreamResult<u8> {
        debug_assert_eq!(self.block_remaining, 0, "peek inside a block frame");
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let b = self.raw_byte("tag peek")?;
        self.peeked = Some(b);
        Ok(b)
    }

    /// Read a structural tag byte, bypassing block framing.
    pub fn read_tag(&mut self) -> StreamResult<u8> {
        debug_assert_eq!(self.block_remaining, 0, "tag read inside a block frame");
        self.raw_byte("tag")
    }

    /// Open the next block frame if one follows.
    ///
    /// Returns `false` without consuming anything when the next byte is not
    /// a block tag, which marks the end of the custom section.
    pub(crate) fn next_block(&mut self) -> StreamResult<bool> {
        debug_assert_eq!(self.block_remaining, 0);
        match self.peek_u8()? {
            TAG_BLOCK_SHORT => {
                self.peeked = None;
                let len = self.raw_byte("block length")?;
                self.block_remaining = u64::from(len);
                Ok(true)
            }
            TAG_BLOCK_LONG => {
                self.peeked = None;
                let mut len = [0u8; 4];
                self.raw_exact(&mut len, "block length")?;
                self.block_remaining = u64::from(u32::from_be_bytes(len));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Skip the rest of the currently open frame, if any.
    pub(crate) fn drain_current_block(&mut self) -> StreamResult<()> {
        while self.block_remaining > 0 {
            let mut scratch = [0u8; 256];
            let take = (self.block_remaining).min(scratch.len() as u64) as usize;
            self.raw_exact(&mut scratch[..take], "block data")?;
            self.block_remaining -= take as u64;
        }
        Ok(())
    }

    /// Fill `buf` with data bytes through the current mode.
    ///
    /// # Errors
    ///
    /// In block mode, returns [`StreamError::EndOfCustomData`] when the
    /// custom section ends before `buf` is full.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        match self.mode {
            StreamMode::Raw => self.raw_exact(buf, "stream data"),
            StreamMode::Block => {
                let mut filled = 0;
                while filled < buf.len() {
                    while self.block_remaining == 0 {
                        if !self.next_block()? {
                            return Err(StreamError::EndOfCustomData);
                        }
                    }
                    let take = (buf.len() - filled)
                        .min(usize::try_from(self.block_remaining).unwrap_or(usize::MAX));
                    self.raw_exact(&mut buf[filled..filled + take], "block data")?;
                    self.block_remaining -= take as u64;
                    filled += take;
                }
                Ok(())
            }
        }
    }

    pub fn read_u8(&mut self) -> StreamResult<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> StreamResult<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn read_u32(&mut self) -> StreamResult<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn read_u64(&mut self) -> StreamResult<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    pub fn read_bool(&mut self) -> StreamResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i8(&mut self) -> StreamResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> StreamResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> StreamResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> StreamResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> StreamResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> StreamResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(f: impl FnOnce(&mut FrameWriter<Vec<u8>>)) -> Vec<u8> {
        let mut w = FrameWriter::new(Vec::new(), 1024);
        f(&mut w);
        w.finish().unwrap()
    }

    #[test]
    fn test_raw_primitives_roundtrip() {
        let bytes = written(|w| {
            w.write_u16(0x4F47).unwrap();
            w.write_i32(-7).unwrap();
            w.write_f64(1.5).unwrap();
            w.write_bool(true).unwrap();
        });
        let mut r = FrameReader::new(Cursor::new(bytes));
        assert_eq!(r.read_u16().unwrap(), 0x4F47);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_f64().unwrap(), 1.5);
        assert!(r.read_bool().unwrap());
    }

    #[test]
    fn test_small_block_uses_short_frame() {
        let bytes = written(|w| {
            w.set_mode(StreamMode::Block).unwrap();
            w.write_i32(42).unwrap();
            w.set_mode(StreamMode::Raw).unwrap();
        });
        assert_eq!(bytes[0], TAG_BLOCK_SHORT);
        assert_eq!(bytes[1], 4);
        assert_eq!(bytes.len(), 2 + 4);
    }

    #[test]
    fn test_large_block_uses_long_frame() {
        let payload = vec![0xABu8; 300];
        let bytes = written(|w| {
            w.set_mode(StreamMode::Block).unwrap();
            w.write(&payload).unwrap();
            w.set_mode(StreamMode::Raw).unwrap();
        });
        assert_eq!(bytes[0], TAG_BLOCK_LONG);
        assert_eq!(u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 300);
    }

    #[test]
    fn test_capacity_splits_into_multiple_frames() {
        let mut w = FrameWriter::new(Vec::new(), 100);
        w.set_mode(StreamMode::Block).unwrap();
        w.write(&[7u8; 250]).unwrap();
        w.set_mode(StreamMode::Raw).unwrap();
        let bytes = w.finish().unwrap();

        // Two full 100-byte frames and one 50-byte tail.
        assert_eq!(bytes.len(), 3 * 2 + 250);
        assert_eq!(bytes[0], TAG_BLOCK_SHORT);
        assert_eq!(bytes[1], 100);
        assert_eq!(bytes[102], TAG_BLOCK_SHORT);
        assert_eq!(bytes[103], 100);
        assert_eq!(bytes[204], TAG_BLOCK_SHORT);
        assert_eq!(bytes[205], 50);
    }

    #[test]
    fn test_reader_spans_frames_transparently() {
        let mut w = FrameWriter::new(Vec::new(), 8);
        w.set_mode(StreamMode::Block).unwrap();
        for i in 0..10i32 {
            w.write_i32(i).unwrap();
        }
        w.set_mode(StreamMode::Raw).unwrap();
        w.write_tag(0x6B).unwrap();
        let bytes = w.finish().unwrap();

        let mut r = FrameReader::new(Cursor::new(bytes));
        r.set_mode(StreamMode::Block).unwrap();
        for i in 0..10i32 {
            assert_eq!(r.read_i32().unwrap(), i);
        }
        assert!(matches!(
            r.read_u8().unwrap_err(),
            StreamError::EndOfCustomData
        ));
        r.set_mode(StreamMode::Raw).unwrap();
        assert_eq!(r.read_tag().unwrap(), 0x6B);
    }

    #[test]
    fn test_leaving_block_mode_with_unread_bytes_rejected() {
        let bytes = written(|w| {
            w.set_mode(StreamMode::Block).unwrap();
            w.write_i64(99).unwrap();
            w.set_mode(StreamMode::Raw).unwrap();
        });
        let mut r = FrameReader::new(Cursor::new(bytes));
        r.set_mode(StreamMode::Block).unwrap();
        let _ = r.read_i32().unwrap();
        let err = r.set_mode(StreamMode::Raw).unwrap_err();
        assert!(matches!(err, StreamError::Protocol { .. }));
    }

    #[test]
    fn test_drain_current_block_skips_payload() {
        let bytes = written(|w| {
            w.set_mode(StreamMode::Block).unwrap();
            w.write(&[1u8; 600]).unwrap();
            w.set_mode(StreamMode::Raw).unwrap();
            w.write_tag(0x6B).unwrap();
        });
        let mut r = FrameReader::new(Cursor::new(bytes));
        r.set_mode(StreamMode::Block).unwrap();
        let _ = r.read_u8().unwrap();
        r.drain_current_block().unwrap();
        assert!(!r.next_block().unwrap());
        r.set_mode(StreamMode::Raw).unwrap();
        assert_eq!(r.read_tag().unwrap(), 0x6B);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut r = FrameReader::new(Cursor::new(vec![0x64u8, 0x01]));
        assert_eq!(r.peek_u8().unwrap(), 0x64);
        assert_eq!(r.peek_u8().unwrap(), 0x64);
        assert_eq!(r.read_tag().unwrap(), 0x64);
        assert_eq!(r.read_tag().unwrap(), 0x01);
    }

    #[test]
    fn test_truncated_stream_reports_eof() {
        let mut r = FrameReader::new(Cursor::new(vec![0x00u8]));
        let err = r.read_u32().unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEof { .. }));
    }
}
