//! Graph encoder: turns [`Value`] graphs into the self-describing wire form.
//!
//! # Architecture
//!
//! The encoder is a recursive-descent walker over the value graph. Every
//! entity (string, array, enum, record, descriptor) passes through the
//! encode handle table before its body is emitted: a hit becomes a
//! back-reference, a miss is assigned the next handle and written inline.
//! Assignment happens before the entity's own references are descended
//! into, which is what makes cyclic graphs terminate.
//!
//! Custom sections run inside block framing. The encoder switches the
//! [`FrameWriter`] to block mode around each hook invocation and seals the
//! section with an end-of-block tag, so a decoder that has no matching
//! hook can skip the payload without understanding it.
//!
//! A failure below the top-level record aborts the record: the encoder
//! clears its handle table, writes a terminal error marker carrying the
//! failure message, and clears again so the next top-level write starts
//! from a clean numbering. I/O failures are not recoverable and get no
//! marker.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use object_graph_core::{
    ArrayValue, EnumValue, FieldKind, PrimValue, RecordValue, StreamConfig, StreamError,
    StreamResult, TypeDescriptor, TypeRegistry, Value,
};

use crate::binding::chain_arcs;
use crate::frame::{FrameWriter, StreamMode};
use crate::handles::{EncodeEntity, EncodeHandleTable};
use crate::mutf8;
use crate::wire::{
    self, BASE_WIRE_HANDLE, TAG_ARRAY, TAG_BACKREF, TAG_DESCRIPTOR, TAG_END_BLOCK, TAG_ENUM,
    TAG_ERROR, TAG_LONG_STRING, TAG_NULL, TAG_PROXY_DESC, TAG_RECORD, TAG_RESET, TAG_STRING,
};

/// Longest failure message carried by a terminal error marker. Messages are
/// diagnostics for the peer, not data; anything longer is cut.
const ABORT_MESSAGE_LIMIT: usize = 512;

/// Streaming encoder for value graphs.
///
/// Writes the stream header on construction, then one entity graph per
/// [`Encoder::write_value`] call. The handle table persists across calls,
/// so a value written twice in the same session costs one back-reference
/// the second time. [`Encoder::reset`] severs that sharing explicitly.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use object_graph_core::TypeRegistry;
/// use object_graph_stream::Encoder;
///
/// let registry = Arc::new(TypeRegistry::new());
/// let mut encoder = Encoder::new(Vec::new(), registry)?;
/// encoder.write_value(&"hello".into())?;
/// let bytes = encoder.finish()?;
/// assert_eq!(&bytes[..2], &[0x4F, 0x47]);
/// # Ok::<(), object_graph_core::StreamError>(())
/// ```
pub struct Encoder<W: Write> {
    out: FrameWriter<W>,
    handles: EncodeHandleTable,
    registry: Arc<TypeRegistry>,
    config: StreamConfig,
    depth: usize,
    session: Uuid,
}

impl<W: Write> Encoder<W> {
    /// Creates an encoder with the default configuration and writes the
    /// stream header.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] if the header cannot be written.
    pub fn new(sink: W, registry: Arc<TypeRegistry>) -> StreamResult<Self> {
        Self::with_config(sink, registry, StreamConfig::default())
    }

    /// Creates an encoder with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] if the configuration is invalid
    /// and [`StreamError::Io`] if the header cannot be written.
    pub fn with_config(
        sink: W,
        registry: Arc<TypeRegistry>,
        config: StreamConfig,
    ) -> StreamResult<Self> {
        config.validate().map_err(|e| StreamError::Protocol {
            context: "config",
            details: e.to_string(),
        })?;
        let mut out = FrameWriter::new(sink, config.block_capacity);
        out.write_u16(wire::STREAM_MAGIC)?;
        out.write_u16(wire::STREAM_VERSION)?;
        let session = Uuid::new_v4();
        debug!(session = %session, "encode stream opened");
        Ok(Self {
            out,
            handles: EncodeHandleTable::new(),
            registry,
            config,
            depth: 0,
            session,
        })
    }

    /// Writes one top-level value graph.
    ///
    /// On any failure other than I/O the record is aborted in place: a
    /// terminal error marker is written and the handle table is cleared on
    /// both sides of it, mirroring what the decoder does when it reads the
    /// marker. The original error is returned either way.
    ///
    /// # Errors
    ///
    /// Propagates the failure that aborted the record.
    pub fn write_value(&mut self, value: &Value) -> StreamResult<()> {
        self.write_top_level(value, false)
    }

    /// Writes one top-level value graph without recording it in the handle
    /// table, so no later write can back-reference it.
    ///
    /// # Errors
    ///
    /// Propagates the failure that aborted the record.
    pub fn write_unshared(&mut self, value: &Value) -> StreamResult<()> {
        self.write_top_level(value, true)
    }

    fn write_top_level(&mut self, value: &Value, unshared: bool) -> StreamResult<()> {
        debug_assert_eq!(self.depth, 0, "top-level write re-entered");
        match self.write_entity(value, unshared) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e, StreamError::Io(_)) => Err(e),
            Err(e) => {
                warn!(session = %self.session, error = %e, "record aborted");
                if let Err(marker_err) = self.emit_abort(&e) {
                    warn!(session = %self.session, error = %marker_err,
                        "abort marker write failed");
                }
                Err(e)
            }
        }
    }

    /// Emits the terminal error marker for an aborted record. The handle
    /// table is cleared before and after so handle numbering stays in step
    /// with a decoder that clears on reading the marker.
    fn emit_abort(&mut self, cause: &StreamError) -> StreamResult<()> {
        self.handles.clear();
        self.out.set_mode(StreamMode::Raw)?;
        self.out.write_tag(TAG_ERROR)?;
        let message: String = cause.to_string().chars().take(ABORT_MESSAGE_LIMIT).collect();
        self.write_mutf8_u16(&message, "abort message")?;
        self.handles.clear();
        Ok(())
    }

    /// Writes a reset marker and clears the handle table. Values written
    /// after a reset never back-reference values written before it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] if called while an entity write is
    /// in progress, [`StreamError::Io`] on write failure.
    pub fn reset(&mut self) -> StreamResult<()> {
        if self.depth != 0 {
            return Err(StreamError::Protocol {
                context: "reset",
                details: "reset attempted inside an entity write".into(),
            });
        }
        self.out.write_tag(TAG_RESET)?;
        self.handles.clear();
        debug!(session = %self.session, "handle table reset");
        Ok(())
    }

    /// Drains buffered data, flushes, and returns the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] if the flush fails.
    pub fn finish(self) -> StreamResult<W> {
        self.out.finish()
    }

    /// Writes one entity at a reference position: a tag, then either the
    /// entity body or a back-reference. The frame mode is forced to raw for
    /// the duration and restored afterwards so custom sections can embed
    /// whole entities mid-block.
    fn write_entity(&mut self, value: &Value, unshared: bool) -> StreamResult<()> {
        if self.depth >= self.config.max_depth {
            return Err(StreamError::DepthLimit {
                limit: self.config.max_depth,
            });
        }
        let old_mode = self.out.mode();
        self.out.set_mode(StreamMode::Raw)?;
        self.depth += 1;
        let result = self.write_entity_body(value, unshared);
        self.depth -= 1;
        if result.is_ok() {
            self.out.set_mode(old_mode)?;
        }
        result
    }

    fn write_entity_body(&mut self, value: &Value, unshared: bool) -> StreamResult<()> {
        match value {
            Value::Null => self.out.write_tag(TAG_NULL),
            Value::Prim(p) => Err(StreamError::Protocol {
                context: "reference position",
                details: format!(
                    "{} primitive cannot stand alone, only inside a field, array, or custom payload",
                    p.kind().name()
                ),
            }),
            Value::Str(s) => self.write_string(s, unshared),
            Value::Array(a) => self.write_array(a, unshared),
            Value::Enum(e) => self.write_enum(e, unshared),
            Value::Record(r) => self.write_record(r, unshared),
        }
    }

    fn write_backref(&mut self, handle: u32) -> StreamResult<()> {
        self.out.write_tag(TAG_BACKREF)?;
        self.out.write_u32(BASE_WIRE_HANDLE + handle)
    }

    fn write_string(&mut self, s: &Rc<str>, unshared: bool) -> StreamResult<()> {
        let entity = EncodeEntity::Str(Rc::clone(s));
        if !unshared {
            if let Some(handle) = self.handles.lookup(&entity) {
                return self.write_backref(handle);
            }
        }
        let bytes = mutf8::encode(s);
        if bytes.len() <= usize::from(u16::MAX) {
            self.out.write_tag(TAG_STRING)?;
            self.assign(entity, unshared);
            self.out.write_u16(bytes.len() as u16)?;
        } else {
            self.out.write_tag(TAG_LONG_STRING)?;
            self.assign(entity, unshared);
            self.out.write_u64(bytes.len() as u64)?;
        }
        self.out.write(&bytes)
    }

    fn write_enum(&mut self, ev: &Rc<EnumValue>, unshared: bool) -> StreamResult<()> {
        let entity = EncodeEntity::Enum(Rc::clone(ev));
        if !unshared {
            if let Some(handle) = self.handles.lookup(&entity) {
                return self.write_backref(handle);
            }
        }
        self.out.write_tag(TAG_ENUM)?;
        self.write_descriptor_ref(ev.descriptor())?;
        self.assign(entity, unshared);
        // The constant is a string entity of its own so two enum values of
        // different types can still share it.
        let constant: Rc<str> = Rc::from(ev.constant());
        self.write_string(&constant, false)
    }

    fn write_array(&mut self, arr: &Rc<RefCell<ArrayValue>>, unshared: bool) -> StreamResult<()> {
        let entity = EncodeEntity::Array(Rc::clone(arr));
        if !unshared {
            if let Some(handle) = self.handles.lookup(&entity) {
                return self.write_backref(handle);
            }
        }
        self.out.write_tag(TAG_ARRAY)?;
        self.assign(entity, unshared);
        // Element payload is written while the borrow is held for primitive
        // arrays; reference elements are snapshotted first because a nested
        // hook may mutate the array mid-walk.
        let refs = {
            let a = arr.borrow();
            self.out
                .write_u8(wire::encode_field_kind(a.elem_kind(), false))?;
            let len = u32::try_from(a.len()).map_err(|_| StreamError::Protocol {
                context: "array",
                details: format!("length {} exceeds the 32-bit wire limit", a.len()),
            })?;
            self.out.write_u32(len)?;
            match &*a {
                ArrayValue::Bool(v) => {
                    for &x in v {
                        self.out.write_bool(x)?;
                    }
                    None
                }
                ArrayValue::I8(v) => {
                    for &x in v {
                        self.out.write_i8(x)?;
                    }
                    None
                }
                ArrayValue::I16(v) => {
                    for &x in v {
                        self.out.write_i16(x)?;
                    }
                    None
                }
                ArrayValue::I32(v) => {
                    for &x in v {
                        self.out.write_i32(x)?;
                    }
                    None
                }
                ArrayValue::I64(v) => {
                    for &x in v {
                        self.out.write_i64(x)?;
                    }
                    None
                }
                ArrayValue::F32(v) => {
                    for &x in v {
                        self.out.write_f32(x)?;
                    }
                    None
                }
                ArrayValue::F64(v) => {
                    for &x in v {
                        self.out.write_f64(x)?;
                    }
                    None
                }
                ArrayValue::Char(v) => {
                    for &x in v {
                        self.out.write_u16(x)?;
                    }
                    None
                }
                ArrayValue::Ref(values) => Some(values.clone()),
            }
        };
        if let Some(values) = refs {
            for element in &values {
                self.write_entity(element, false)?;
            }
        }
        Ok(())
    }

    fn write_record(
        &mut self,
        record: &Rc<RefCell<RecordValue>>,
        unshared: bool,
    ) -> StreamResult<()> {
        let entity = EncodeEntity::Record(Rc::clone(record));
        if !unshared {
            if let Some(handle) = self.handles.lookup(&entity) {
                return self.write_backref(handle);
            }
        }
        let desc = Arc::clone(record.borrow().descriptor());
        self.out.write_tag(TAG_RECORD)?;
        self.write_descriptor_ref(&desc)?;
        self.assign(entity, unshared);

        if desc.is_external() {
            // The whole object is one custom section; there is no field
            // walk and no supertype traversal.
            let hook = self
                .registry
                .get(desc.name())
                .and_then(|reg| reg.encode_hook().cloned())
                .ok_or_else(|| StreamError::HookMissing {
                    type_name: desc.name().to_string(),
                })?;
            self.out.set_mode(StreamMode::Block)?;
            let mut ctx = HookEncodeContext {
                enc: &mut *self,
                record: Rc::clone(record),
                level: Arc::clone(&desc),
                level_base: 0,
                external: true,
                default_done: false,
                wrote_any: false,
            };
            hook.encode(&mut ctx)?;
            self.out.set_mode(StreamMode::Raw)?;
            self.out.write_tag(TAG_END_BLOCK)?;
            return Ok(());
        }

        // Field data is written supertype-first so a decoder can bind each
        // level as it arrives.
        let mut base = 0;
        for level in chain_arcs(&desc) {
            let field_count = level.fields().len();
            if level.has_custom_encode() {
                let hook = self
                    .registry
                    .get(level.name())
                    .and_then(|reg| reg.encode_hook().cloned())
                    .ok_or_else(|| StreamError::HookMissing {
                        type_name: level.name().to_string(),
                    })?;
                self.out.set_mode(StreamMode::Block)?;
                let mut ctx = HookEncodeContext {
                    enc: &mut *self,
                    record: Rc::clone(record),
                    level: Arc::clone(&level),
                    level_base: base,
                    external: false,
                    default_done: false,
                    wrote_any: false,
                };
                hook.encode(&mut ctx)?;
                self.out.set_mode(StreamMode::Raw)?;
                self.out.write_tag(TAG_END_BLOCK)?;
            } else {
                self.write_level_fields(record, &level, base)?;
            }
            base += field_count;
        }
        Ok(())
    }

    /// Writes one descriptor level's worth of field values in declaration
    /// order: primitives as raw big-endian payload, references as nested
    /// entities.
    fn write_level_fields(
        &mut self,
        record: &Rc<RefCell<RecordValue>>,
        level: &Arc<TypeDescriptor>,
        base: usize,
    ) -> StreamResult<()> {
        // Snapshot the slice so no borrow is held while nested reference
        // writes run arbitrary hook code.
        let snapshot: Vec<Value> = {
            let rec = record.borrow();
            rec.values()[base..base + level.fields().len()].to_vec()
        };
        for (spec, value) in level.fields().iter().zip(&snapshot) {
            match (spec.kind(), value) {
                (FieldKind::Prim(kind), Value::Prim(p)) if p.kind() == kind => {
                    self.write_prim(p)?;
                }
                (FieldKind::Prim(kind), other) => {
                    return Err(StreamError::Protocol {
                        context: "field data",
                        details: format!(
                            "field '{}' declared {} holds {}",
                            spec.name(),
                            kind.name(),
                            other.kind_name()
                        ),
                    });
                }
                (FieldKind::Ref, v) => {
                    self.write_entity(v, spec.is_unshared())?;
                }
            }
        }
        Ok(())
    }

    fn write_prim(&mut self, p: &PrimValue) -> StreamResult<()> {
        match *p {
            PrimValue::Bool(v) => self.out.write_bool(v),
            PrimValue::I8(v) => self.out.write_i8(v),
            PrimValue::I16(v) => self.out.write_i16(v),
            PrimValue::I32(v) => self.out.write_i32(v),
            PrimValue::I64(v) => self.out.write_i64(v),
            PrimValue::F32(v) => self.out.write_f32(v),
            PrimValue::F64(v) => self.out.write_f64(v),
            PrimValue::Char(v) => self.out.write_u16(v),
        }
    }

    /// Writes a descriptor reference: a back-reference when the descriptor
    /// was already emitted this session, its full body otherwise.
    fn write_descriptor_ref(&mut self, desc: &Arc<TypeDescriptor>) -> StreamResult<()> {
        let entity = EncodeEntity::Descriptor(Arc::clone(desc));
        if let Some(handle) = self.handles.lookup(&entity) {
            return self.write_backref(handle);
        }
        self.write_descriptor(desc)
    }

    fn write_descriptor(&mut self, desc: &Arc<TypeDescriptor>) -> StreamResult<()> {
        let entity = EncodeEntity::Descriptor(Arc::clone(desc));
        if desc.is_proxy() {
            self.out.write_tag(TAG_PROXY_DESC)?;
            let interfaces = desc.proxy_interfaces();
            let count = u16::try_from(interfaces.len()).map_err(|_| StreamError::Protocol {
                context: "descriptor",
                details: format!("proxy lists {} interfaces", interfaces.len()),
            })?;
            self.out.write_u16(count)?;
            for name in interfaces {
                self.write_mutf8_u16(name, "interface name")?;
            }
            self.handles.assign(entity);
        } else {
            self.out.write_tag(TAG_DESCRIPTOR)?;
            self.write_mutf8_u16(desc.name(), "type name")?;
            self.handles.assign(entity);
            self.out.write_u8(desc.flags())?;
            let fields = desc.fields();
            let count = u16::try_from(fields.len()).map_err(|_| StreamError::Protocol {
                context: "descriptor",
                details: format!("type '{}' declares {} fields", desc.name(), fields.len()),
            })?;
            self.out.write_u16(count)?;
            for spec in fields {
                self.out
                    .write_u8(wire::encode_field_kind(spec.kind(), spec.is_unshared()))?;
                self.write_mutf8_u16(spec.name(), "field name")?;
            }
        }
        match desc.supertype() {
            Some(sup) => self.write_descriptor_ref(sup),
            None => self.out.write_tag(TAG_NULL),
        }
    }

    /// Writes a 16-bit-length-prefixed modified-UTF-8 string in the current
    /// frame mode.
    fn write_mutf8_u16(&mut self, s: &str, context: &'static str) -> StreamResult<()> {
        let bytes = mutf8::encode(s);
        let len = u16::try_from(bytes.len()).map_err(|_| StreamError::Protocol {
            context,
            details: format!("encoded length {} exceeds the 16-bit prefix", bytes.len()),
        })?;
        self.out.write_u16(len)?;
        self.out.write(&bytes)
    }

    fn assign(&mut self, entity: EncodeEntity, unshared: bool) -> u32 {
        if unshared {
            // The handle number is burned but never matched, so later
            // writes of the same value cannot reference this occurrence.
            self.handles.assign_reserved()
        } else {
            self.handles.assign(entity)
        }
    }
}

impl<W: Write> std::fmt::Debug for Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("session", &self.session)
            .field("handles", &self.handles.len())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Encode-side view handed to custom hooks for one descriptor level.
struct HookEncodeContext<'a, W: Write> {
    enc: &'a mut Encoder<W>,
    record: Rc<RefCell<RecordValue>>,
    level: Arc<TypeDescriptor>,
    level_base: usize,
    external: bool,
    default_done: bool,
    wrote_any: bool,
}

impl<W: Write> object_graph_core::EncodeContext for HookEncodeContext<'_, W> {
    fn current(&self) -> Value {
        Value::Record(Rc::clone(&self.record))
    }

    fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.level
    }

    fn default_write(&mut self) -> StreamResult<()> {
        if self.external {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "external types have no default field section".into(),
            });
        }
        if self.default_done {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "default fields may be written at most once".into(),
            });
        }
        if self.wrote_any {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "default fields must precede any custom payload".into(),
            });
        }
        self.enc.out.set_mode(StreamMode::Raw)?;
        self.enc
            .write_level_fields(&self.record, &self.level, self.level_base)?;
        self.enc.out.set_mode(StreamMode::Block)?;
        self.default_done = true;
        self.wrote_any = true;
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.write_entity(value, false)
    }

    fn write_bool(&mut self, v: bool) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_bool(v)
    }

    fn write_i8(&mut self, v: i8) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_i8(v)
    }

    fn write_i16(&mut self, v: i16) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_i16(v)
    }

    fn write_i32(&mut self, v: i32) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_i32(v)
    }

    fn write_i64(&mut self, v: i64) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_i64(v)
    }

    fn write_f32(&mut self, v: f32) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_f32(v)
    }

    fn write_f64(&mut self, v: f64) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_f64(v)
    }

    fn write_char(&mut self, v: u16) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write_u16(v)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.out.write(bytes)
    }

    fn write_str(&mut self, s: &str) -> StreamResult<()> {
        self.wrote_any = true;
        self.enc.write_mutf8_u16(s, "custom string")
    }
}
