//! Custom encode and decode hooks.
//!
//! Types flagged with a custom capability replace the engine's default
//! field walk for one inheritance level (or for the whole object, for
//! external types) with their own logic. A hook receives a context that
//! exposes the stream primitives it is allowed to touch; everything else
//! about the stream stays out of reach so a hook cannot corrupt framing
//! or handle state.
//!
//! # Contract
//!
//! The two sides must be symmetric: whatever a custom encode hook writes,
//! the matching decode hook must consume in the same order. Each side may
//! call its `default_write` / `default_read` at most once, and only before
//! any other write or read on the context. An external type never calls
//! the defaults because it has no engine-managed fields.

use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::error::StreamResult;
use crate::value::Value;

/// Per-type custom encoding logic.
///
/// Implementations are shared across streams through the registry, so they
/// must be `Send + Sync` and keep per-object state out of `self`.
pub trait EncodeHook: Send + Sync {
    /// Produce the custom payload for one level of the current object.
    ///
    /// # Errors
    ///
    /// Any error aborts the stream write; the engine surfaces it to the
    /// caller after emitting an abort marker.
    fn encode(&self, ctx: &mut dyn EncodeContext) -> StreamResult<()>;
}

/// Per-type custom decoding logic.
pub trait DecodeHook: Send + Sync {
    /// Consume the custom payload for one level of the current object.
    ///
    /// # Errors
    ///
    /// Any error surfaces to the caller. Reading past the end of the
    /// custom section yields [`crate::error::StreamError::EndOfCustomData`],
    /// which a hook may treat as "older payload, data absent".
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()>;
}

/// Stream surface available to an [`EncodeHook`].
pub trait EncodeContext {
    /// The object being encoded.
    fn current(&self) -> Value;

    /// The descriptor level this hook is encoding.
    fn descriptor(&self) -> &Arc<TypeDescriptor>;

    /// Write this level's fields exactly as the default walk would.
    ///
    /// # Errors
    ///
    /// Fails if called twice, or after any other write on this context.
    fn default_write(&mut self) -> StreamResult<()>;

    /// Write a reference value (identity and back-references apply).
    ///
    /// # Errors
    ///
    /// Rejects [`Value::Prim`]; primitives go through the typed writers.
    fn write_value(&mut self, value: &Value) -> StreamResult<()>;

    /// Write a primitive into the custom payload.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the underlying sink.
    fn write_bool(&mut self, v: bool) -> StreamResult<()>;
    fn write_i8(&mut self, v: i8) -> StreamResult<()>;
    fn write_i16(&mut self, v: i16) -> StreamResult<()>;
    fn write_i32(&mut self, v: i32) -> StreamResult<()>;
    fn write_i64(&mut self, v: i64) -> StreamResult<()>;
    fn write_f32(&mut self, v: f32) -> StreamResult<()>;
    fn write_f64(&mut self, v: f64) -> StreamResult<()>;

    /// Write one UTF-16 code unit.
    fn write_char(&mut self, v: u16) -> StreamResult<()>;

    /// Write raw bytes into the custom payload.
    fn write_bytes(&mut self, bytes: &[u8]) -> StreamResult<()>;

    /// Write a length-prefixed string into the custom payload.
    ///
    /// Unlike [`EncodeContext::write_value`] with a string, this does not
    /// assign a handle; the text is plain payload data.
    ///
    /// # Errors
    ///
    /// Fails if the encoded text exceeds the 16-bit length prefix.
    fn write_str(&mut self, s: &str) -> StreamResult<()>;
}

/// Stream surface available to a [`DecodeHook`].
pub trait DecodeContext {
    /// The descriptor level this hook is decoding, as written by the peer.
    fn descriptor(&self) -> &Arc<TypeDescriptor>;

    /// Read this level's fields exactly as the default walk would.
    ///
    /// # Errors
    ///
    /// Fails if called twice, or after any other read on this context.
    fn default_read(&mut self) -> StreamResult<()>;

    /// Read a reference value (back-references resolve through the handle
    /// table).
    fn read_value(&mut self) -> StreamResult<Value>;

    /// Read a primitive from the custom payload.
    ///
    /// # Errors
    ///
    /// Yields [`crate::error::StreamError::EndOfCustomData`] when the
    /// custom section is exhausted.
    fn read_bool(&mut self) -> StreamResult<bool>;
    fn read_i8(&mut self) -> StreamResult<i8>;
    fn read_i16(&mut self) -> StreamResult<i16>;
    fn read_i32(&mut self) -> StreamResult<i32>;
    fn read_i64(&mut self) -> StreamResult<i64>;
    fn read_f32(&mut self) -> StreamResult<f32>;
    fn read_f64(&mut self) -> StreamResult<f64>;

    /// Read one UTF-16 code unit.
    fn read_char(&mut self) -> StreamResult<u16>;

    /// Fill `buf` from the custom payload.
    fn read_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()>;

    /// Read a length-prefixed string written by
    /// [`EncodeContext::write_str`].
    fn read_str(&mut self) -> StreamResult<String>;

    /// Queue a callback to run once the whole graph has been decoded.
    ///
    /// Callbacks run after the top-level `read_value` returns internally,
    /// ordered by descending `priority`; ties run in registration order.
    /// The first failing callback abandons the rest and surfaces its error.
    fn register_validation(&mut self, callback: Box<dyn ValidationCallback>, priority: i32);
}

/// A deferred graph-completeness check.
///
/// Registered during decode via [`DecodeContext::register_validation`]; there
/// is deliberately no way to queue one outside a decode in progress.
pub trait ValidationCallback {
    /// Check the decoded graph.
    ///
    /// # Errors
    ///
    /// A failure aborts the remaining queued callbacks and surfaces from
    /// the top-level decode call.
    fn validate(&self) -> StreamResult<()>;
}

impl<F> ValidationCallback for F
where
    F: Fn() -> StreamResult<()>,
{
    fn validate(&self) -> StreamResult<()> {
        self()
    }
}
