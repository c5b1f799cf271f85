//! Graph decoder: reconstructs [`Value`] graphs from the wire form.
//!
//! # Architecture
//!
//! The decoder is a tag dispatcher over a [`FrameReader`]. Every entity is
//! assigned a handle in stream order, exactly mirroring the encoder's
//! numbering, and container entities are assigned *before* their contents
//! are read so cyclic back-references land on a live, partially-filled
//! value.
//!
//! Wire descriptors are bound to local registrations as they arrive.
//! Binding failures do not abort the stream: the affected handle is
//! poisoned in the handle table, the entity's bytes are absorbed in
//! discard mode, and the failure surfaces as [`StreamError::Unresolved`]
//! only for top-level reads that transitively depend on the poisoned
//! handle. Sibling records decode normally.
//!
//! Recoverable errors ([`StreamError::Unresolved`],
//! [`StreamError::PeerAborted`], [`StreamError::ValidationFailed`]) leave
//! the stream positioned at a record boundary, so the next read proceeds.
//! Every other error poisons the session; callers should drop the decoder.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use object_graph_core::{
    ArrayValue, EnumValue, FieldKind, FieldSpec, PrimKind, PrimValue, RecordValue, ResolveError,
    StreamConfig, StreamError, StreamResult, TypeDescriptor, TypeRegistry, ValidationCallback,
    Value,
};

use crate::binding::{bind, BoundDescriptor, LevelPlan};
use crate::frame::{FrameReader, StreamMode};
use crate::handles::{DecodeEntity, DecodeHandleTable};
use crate::mutf8;
use crate::validation::ValidationList;
use crate::wire::{
    self, BASE_WIRE_HANDLE, TAG_ARRAY, TAG_BACKREF, TAG_BLOCK_LONG, TAG_BLOCK_SHORT,
    TAG_DESCRIPTOR, TAG_END_BLOCK, TAG_ENUM, TAG_ERROR, TAG_LONG_STRING, TAG_NULL, TAG_PROXY_DESC,
    TAG_RECORD, TAG_RESET, TAG_STRING,
};

/// Streaming decoder for value graphs.
///
/// Reads and verifies the stream header on construction, then one entity
/// graph per [`Decoder::read_value`] call. The handle table persists
/// across calls so identity established by the peer survives record
/// boundaries until a reset marker clears it.
pub struct Decoder<R: Read> {
    input: FrameReader<R>,
    handles: DecodeHandleTable,
    registry: Arc<TypeRegistry>,
    config: StreamConfig,
    depth: usize,
    vlist: ValidationList,
    /// One canonical instance per (local enum descriptor, constant).
    enum_cache: HashMap<(usize, String), Rc<EnumValue>>,
    session: Uuid,
}

impl<R: Read> Decoder<R> {
    /// Creates a decoder with the default configuration and verifies the
    /// stream header.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::BadMagic`] or [`StreamError::VersionMismatch`]
    /// when the header does not match, [`StreamError::Io`] or
    /// [`StreamError::UnexpectedEof`] on channel failure.
    pub fn new(source: R, registry: Arc<TypeRegistry>) -> StreamResult<Self> {
        Self::with_config(source, registry, StreamConfig::default())
    }

    /// Creates a decoder with an explicit configuration.
    ///
    /// # Errors
    ///
    /// As [`Decoder::new`], plus [`StreamError::Protocol`] for an invalid
    /// configuration.
    pub fn with_config(
        source: R,
        registry: Arc<TypeRegistry>,
        config: StreamConfig,
    ) -> StreamResult<Self> {
        config.validate().map_err(|e| StreamError::Protocol {
            context: "config",
            details: e.to_string(),
        })?;
        let mut input = FrameReader::new(source);
        let magic = input.read_u16()?;
        if magic != wire::STREAM_MAGIC {
            return Err(StreamError::BadMagic { found: magic });
        }
        let version = input.read_u16()?;
        if version != wire::STREAM_VERSION {
            return Err(StreamError::VersionMismatch {
                expected: wire::STREAM_VERSION,
                found: version,
            });
        }
        let session = Uuid::new_v4();
        debug!(session = %session, "decode stream opened");
        Ok(Self {
            input,
            handles: DecodeHandleTable::new(),
            registry,
            config,
            depth: 0,
            vlist: ValidationList::new(),
            enum_cache: HashMap::new(),
            session,
        })
    }

    /// Reads one top-level value graph.
    ///
    /// Deferred validation callbacks registered during the read run after
    /// the graph is complete, highest priority first. If the value
    /// transitively depends on a failed type resolution, the callbacks are
    /// dropped and the resolution failure is returned instead.
    ///
    /// # Errors
    ///
    /// [`StreamError::Unresolved`], [`StreamError::PeerAborted`], and
    /// [`StreamError::ValidationFailed`] leave the stream readable; any
    /// other error poisons the session.
    pub fn read_value(&mut self) -> StreamResult<Value> {
        self.read_top_level(false)
    }

    /// Reads one top-level value graph, rejecting a back-reference at the
    /// top position.
    ///
    /// # Errors
    ///
    /// As [`Decoder::read_value`].
    pub fn read_unshared(&mut self) -> StreamResult<Value> {
        self.read_top_level(true)
    }

    /// Gives back the underlying reader.
    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    fn read_top_level(&mut self, unshared: bool) -> StreamResult<Value> {
        debug_assert_eq!(self.depth, 0, "top-level read re-entered");
        let (value, handle) = self.read_entity(unshared)?;
        if let Some(err) = handle.and_then(|h| self.handles.lookup_exception(h)) {
            // The root itself is poisoned: validation callbacks belong to
            // a graph that never materialized.
            self.vlist.clear();
            warn!(session = %self.session, error = %err, "top-level value unresolved");
            return Err(StreamError::Unresolved(err));
        }
        self.vlist.run()?;
        Ok(value)
    }

    /// Reads one entity at a reference position. Returns the value and the
    /// handle it occupies, or `None` for null.
    fn read_entity(&mut self, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        if self.depth >= self.config.max_depth {
            return Err(StreamError::DepthLimit {
                limit: self.config.max_depth,
            });
        }
        let old_mode = self.input.mode();
        self.input.set_mode(StreamMode::Raw)?;
        let tag = loop {
            let tag = self.input.peek_u8()?;
            if tag != TAG_RESET {
                break tag;
            }
            self.input.read_u8()?;
            if self.depth != 0 || old_mode == StreamMode::Block {
                return Err(StreamError::Protocol {
                    context: "reset",
                    details: "reset marker inside an entity or custom section".into(),
                });
            }
            debug!(session = %self.session, "peer reset, clearing session tables");
            self.handles.clear();
            self.vlist.clear();
            self.enum_cache.clear();
        };
        self.depth += 1;
        let result = self.dispatch_entity(tag, unshared, old_mode);
        self.depth -= 1;
        // The mode is restored even on failure so recoverable signals
        // (end of custom data, unread block payload) leave the section
        // readable, mirroring the walker contract.
        if let Err(e) = self.input.set_mode(old_mode) {
            return result.and(Err(e));
        }
        result
    }

    fn dispatch_entity(
        &mut self,
        tag: u8,
        unshared: bool,
        old_mode: StreamMode,
    ) -> StreamResult<(Value, Option<u32>)> {
        match tag {
            TAG_NULL => {
                self.input.read_u8()?;
                Ok((Value::Null, None))
            }
            TAG_BACKREF => {
                self.input.read_u8()?;
                self.read_backref(unshared)
            }
            TAG_STRING => {
                self.input.read_u8()?;
                self.read_string(false, unshared)
            }
            TAG_LONG_STRING => {
                self.input.read_u8()?;
                self.read_string(true, unshared)
            }
            TAG_ARRAY => {
                self.input.read_u8()?;
                self.read_array(unshared)
            }
            TAG_ENUM => {
                self.input.read_u8()?;
                self.read_enum(unshared)
            }
            TAG_RECORD => {
                self.input.read_u8()?;
                self.read_record(unshared)
            }
            TAG_ERROR => {
                self.input.read_u8()?;
                self.read_peer_abort()
            }
            TAG_DESCRIPTOR | TAG_PROXY_DESC => Err(StreamError::InvalidTag {
                tag,
                context: "value position",
            }),
            TAG_END_BLOCK => {
                if old_mode == StreamMode::Block {
                    // Left unconsumed for the section walker.
                    Err(StreamError::EndOfCustomData)
                } else {
                    Err(StreamError::Corrupt {
                        context: "entity",
                        details: "end-of-block marker outside a custom section".into(),
                    })
                }
            }
            TAG_BLOCK_SHORT | TAG_BLOCK_LONG => {
                if old_mode == StreamMode::Block {
                    // Left unconsumed so the hook can still read it as
                    // primitive payload.
                    Err(StreamError::Protocol {
                        context: "custom section",
                        details: "unread primitive payload at a value position".into(),
                    })
                } else {
                    Err(StreamError::Corrupt {
                        context: "entity",
                        details: "block frame outside a custom section".into(),
                    })
                }
            }
            other => Err(StreamError::InvalidTag {
                tag: other,
                context: "entity",
            }),
        }
    }

    /// Translates a wire handle back to a table index, checking range.
    fn wire_handle(&mut self, context: &'static str) -> StreamResult<u32> {
        let raw = self.input.read_u32()?;
        let handle = raw
            .checked_sub(BASE_WIRE_HANDLE)
            .ok_or_else(|| StreamError::Corrupt {
                context,
                details: format!("wire handle {raw:#010X} below the assignment base"),
            })?;
        if handle as usize >= self.handles.len() {
            return Err(StreamError::Corrupt {
                context,
                details: format!(
                    "handle {handle} referenced before assignment ({} assigned)",
                    self.handles.len()
                ),
            });
        }
        Ok(handle)
    }

    fn read_backref(&mut self, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        let handle = self.wire_handle("back-reference")?;
        if unshared {
            return Err(StreamError::Protocol {
                context: "back-reference",
                details: "shared back-reference at an unshared position".into(),
            });
        }
        let value = self.handles.lookup_value(handle)?;
        Ok((value, Some(handle)))
    }

    fn read_peer_abort(&mut self) -> StreamResult<(Value, Option<u32>)> {
        let message = self.read_mutf8_u16()?;
        self.handles.clear();
        self.vlist.clear();
        self.enum_cache.clear();
        warn!(session = %self.session, message = %message, "peer aborted the record");
        Err(StreamError::PeerAborted { message })
    }

    /// Reads a 16-bit-length-prefixed modified-UTF-8 string in the current
    /// frame mode.
    fn read_mutf8_u16(&mut self) -> StreamResult<String> {
        let len = self.input.read_u16()?;
        let mut buf = vec![0u8; usize::from(len)];
        self.input.read_exact(&mut buf)?;
        Ok(mutf8::decode(&buf)?)
    }

    // ---- descriptors ----------------------------------------------------

    /// Reads a descriptor reference: null, a back-reference to an earlier
    /// descriptor, or a full descriptor body.
    fn read_descriptor_ref(&mut self) -> StreamResult<Option<Rc<BoundDescriptor>>> {
        let tag = self.input.read_u8()?;
        match tag {
            TAG_NULL => Ok(None),
            TAG_BACKREF => {
                let handle = self.wire_handle("descriptor reference")?;
                Ok(Some(self.handles.lookup_descriptor(handle)?))
            }
            TAG_DESCRIPTOR => self.read_new_descriptor().map(Some),
            TAG_PROXY_DESC => self.read_new_proxy_descriptor().map(Some),
            other => Err(StreamError::InvalidTag {
                tag: other,
                context: "descriptor",
            }),
        }
    }

    fn read_new_descriptor(&mut self) -> StreamResult<Rc<BoundDescriptor>> {
        let name = self.read_mutf8_u16()?;
        let handle = self.handles.assign(DecodeEntity::Pending, false);
        let flags = self.input.read_u8()?;
        let field_count = self.input.read_u16()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let kind_byte = self.input.read_u8()?;
            let (kind, unshared) = wire::decode_field_kind(kind_byte)?;
            let field_name = self.read_mutf8_u16()?;
            fields.push(FieldSpec::new(field_name, kind, unshared));
        }
        let supertype = self.read_descriptor_ref()?;
        let super_wire = supertype.map(|bound| Arc::clone(&bound.wire));
        let wire_desc = TypeDescriptor::from_wire(name, flags, fields, super_wire).map_err(|e| {
            StreamError::Corrupt {
                context: "descriptor",
                details: e.to_string(),
            }
        })?;
        self.finish_descriptor(wire_desc, handle)
    }

    fn read_new_proxy_descriptor(&mut self) -> StreamResult<Rc<BoundDescriptor>> {
        let count = self.input.read_u16()?;
        let mut interfaces = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            interfaces.push(self.read_mutf8_u16()?);
        }
        let handle = self.handles.assign(DecodeEntity::Pending, false);
        let supertype = self.read_descriptor_ref()?;
        let super_wire = supertype.map(|bound| Arc::clone(&bound.wire));
        let wire_desc = TypeDescriptor::proxy(interfaces, super_wire);
        self.finish_descriptor(wire_desc, handle)
    }

    /// Binds a freshly parsed wire descriptor against the registry and
    /// installs the result in its handle slot. A binding failure poisons
    /// the slot but keeps the descriptor resolvable, so every record using
    /// it picks up the same failure.
    fn finish_descriptor(
        &mut self,
        wire_desc: Arc<TypeDescriptor>,
        handle: u32,
    ) -> StreamResult<Rc<BoundDescriptor>> {
        let bound = Rc::new(bind(wire_desc, &self.registry, handle));
        if let Some(err) = &bound.resolve_error {
            debug!(
                session = %self.session,
                type_name = bound.wire.name(),
                error = %err,
                "descriptor bound with a resolution failure"
            );
            self.handles.mark_exception(handle, Arc::clone(err));
        }
        self.handles
            .set_entry(handle, DecodeEntity::Descriptor(Rc::clone(&bound)));
        self.handles.finish(handle)?;
        Ok(bound)
    }

    // ---- leaf entities --------------------------------------------------

    fn read_string(&mut self, long: bool, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        let byte_len = if long {
            self.input.read_u64()?
        } else {
            u64::from(self.input.read_u16()?)
        };
        if byte_len > self.config.max_alloc {
            return Err(StreamError::AllocationLimit {
                requested: byte_len,
                limit: self.config.max_alloc,
            });
        }
        let mut buf = vec![0u8; byte_len as usize];
        self.input.read_exact(&mut buf)?;
        let text = mutf8::decode(&buf)?;
        let value = Value::Str(Rc::from(text.as_str()));
        let handle = self.handles.assign(DecodeEntity::Value(value.clone()), unshared);
        self.handles.finish(handle)?;
        Ok((value, Some(handle)))
    }

    fn read_enum(&mut self, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        let Some(bound) = self.read_descriptor_ref()? else {
            return Err(StreamError::Corrupt {
                context: "enum",
                details: "null descriptor on an enum constant".into(),
            });
        };
        if !bound.wire.is_enum() {
            return Err(StreamError::Corrupt {
                context: "enum",
                details: format!("descriptor '{}' is not an enum type", bound.wire.name()),
            });
        }
        let handle = self.handles.assign(DecodeEntity::Pending, unshared);
        if let Some(err) = &bound.resolve_error {
            self.handles.mark_exception(handle, Arc::clone(err));
        }
        // The constant rides as a string entity with a handle of its own.
        let (constant_value, _) = self.read_entity(false)?;
        let Value::Str(constant) = constant_value else {
            return Err(StreamError::Corrupt {
                context: "enum",
                details: "enum constant is not a string entity".into(),
            });
        };
        let value = match bound.local.as_ref().filter(|_| !bound.is_excepted()) {
            Some(local) if local.has_constant(&constant) => {
                let desc = local.descriptor();
                let key = (Arc::as_ptr(desc) as usize, constant.to_string());
                let canonical = self
                    .enum_cache
                    .entry(key)
                    .or_insert_with(|| Rc::new(EnumValue::new(Arc::clone(desc), &*constant)))
                    .clone();
                Value::Enum(canonical)
            }
            Some(local) => {
                // Known enum, unknown constant: poison this handle only.
                let err = Arc::new(ResolveError::UnknownEnumConstant {
                    type_name: local.descriptor().name().to_string(),
                    constant: constant.to_string(),
                });
                warn!(session = %self.session, error = %err, "enum constant dropped");
                self.handles.mark_exception(handle, err);
                Value::Null
            }
            // Unresolved enum type: the slot is already poisoned.
            None => Value::Null,
        };
        self.handles
            .set_entry(handle, DecodeEntity::Value(value.clone()));
        self.handles.finish(handle)?;
        Ok((value, Some(handle)))
    }

    fn read_array(&mut self, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        let kind_byte = self.input.read_u8()?;
        let (kind, kind_unshared) = wire::decode_field_kind(kind_byte)?;
        if kind_unshared {
            return Err(StreamError::Corrupt {
                context: "array",
                details: "unshared marker on an element kind".into(),
            });
        }
        let len = self.input.read_u32()?;
        match kind {
            FieldKind::Prim(prim) => {
                let bytes = u64::from(len) * prim.wire_width() as u64;
                if bytes > self.config.max_alloc {
                    return Err(StreamError::AllocationLimit {
                        requested: bytes,
                        limit: self.config.max_alloc,
                    });
                }
                let array = self.read_prim_array(prim, len as usize)?;
                let value = Value::Array(Rc::new(RefCell::new(array)));
                let handle = self.handles.assign(DecodeEntity::Value(value.clone()), unshared);
                self.handles.finish(handle)?;
                Ok((value, Some(handle)))
            }
            FieldKind::Ref => {
                if u64::from(len) > self.config.max_alloc {
                    return Err(StreamError::AllocationLimit {
                        requested: u64::from(len),
                        limit: self.config.max_alloc,
                    });
                }
                let array = Rc::new(RefCell::new(ArrayValue::Ref(Vec::with_capacity(
                    len as usize,
                ))));
                let value = Value::Array(Rc::clone(&array));
                // Assigned before the elements so a self-referential array
                // resolves its own back-reference.
                let handle = self.handles.assign(DecodeEntity::Value(value.clone()), unshared);
                for _ in 0..len {
                    let (element, element_handle) = self.read_entity(false)?;
                    self.handles.mark_dependency(Some(handle), element_handle);
                    if let ArrayValue::Ref(items) = &mut *array.borrow_mut() {
                        items.push(element);
                    }
                }
                self.handles.finish(handle)?;
                Ok((value, Some(handle)))
            }
        }
    }

    fn read_prim_array(&mut self, prim: PrimKind, len: usize) -> StreamResult<ArrayValue> {
        Ok(match prim {
            PrimKind::Bool => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_bool()?);
                }
                ArrayValue::Bool(v)
            }
            PrimKind::I8 => {
                let mut buf = vec![0u8; len];
                self.input.read_exact(&mut buf)?;
                ArrayValue::I8(buf.into_iter().map(|b| b as i8).collect())
            }
            PrimKind::I16 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_i16()?);
                }
                ArrayValue::I16(v)
            }
            PrimKind::I32 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_i32()?);
                }
                ArrayValue::I32(v)
            }
            PrimKind::I64 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_i64()?);
                }
                ArrayValue::I64(v)
            }
            PrimKind::F32 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_f32()?);
                }
                ArrayValue::F32(v)
            }
            PrimKind::F64 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_f64()?);
                }
                ArrayValue::F64(v)
            }
            PrimKind::Char => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.input.read_u16()?);
                }
                ArrayValue::Char(v)
            }
        })
    }

    // ---- records --------------------------------------------------------

    fn read_record(&mut self, unshared: bool) -> StreamResult<(Value, Option<u32>)> {
        let Some(bound) = self.read_descriptor_ref()? else {
            return Err(StreamError::Corrupt {
                context: "record",
                details: "null descriptor on a record".into(),
            });
        };
        if bound.wire.is_enum() {
            return Err(StreamError::Corrupt {
                context: "record",
                details: format!(
                    "enum descriptor '{}' at a record position",
                    bound.wire.name()
                ),
            });
        }
        // The shell is built from the local layout; wire fields land in it
        // through each level's field plan. Unresolvable records walk in
        // discard mode with no shell at all.
        let record = if bound.is_excepted() {
            None
        } else {
            bound.local.as_ref().map(|local| {
                Rc::new(RefCell::new(RecordValue::new(Arc::clone(local.descriptor()))))
            })
        };
        let entity = match &record {
            Some(rc) => DecodeEntity::Value(Value::Record(Rc::clone(rc))),
            None => DecodeEntity::Value(Value::Null),
        };
        // Assigned before the field walk so cycles through this record
        // resolve; exceptions propagate through the same slot.
        let handle = self.handles.assign(entity, unshared);
        if let Some(err) = &bound.resolve_error {
            self.handles.mark_exception(handle, Arc::clone(err));
        }
        self.walk_record(&bound, record.as_ref(), handle)?;
        self.handles.finish(handle)?;
        let value = match record {
            Some(rc) => Value::Record(rc),
            None => Value::Null,
        };
        Ok((value, Some(handle)))
    }

    /// Walks the wire data of one record: a single custom section for
    /// external types, otherwise one section per descriptor level,
    /// supertype first.
    fn walk_record(
        &mut self,
        bound: &BoundDescriptor,
        record: Option<&Rc<RefCell<RecordValue>>>,
        handle: u32,
    ) -> StreamResult<()> {
        if bound.wire.is_external() {
            let hook = record
                .and(bound.local.as_ref())
                .and_then(|local| local.decode_hook().cloned());
            if let Some(hook) = hook {
                self.input.set_mode(StreamMode::Block)?;
                let level = &bound.levels[0];
                let mut ctx = HookDecodeContext {
                    dec: &mut *self,
                    record: record.cloned(),
                    level,
                    record_handle: handle,
                    external: true,
                    default_done: false,
                    read_any: false,
                };
                hook.decode(&mut ctx)?;
            }
            // Drains whatever the hook left behind, or the whole opaque
            // payload when there is no local hook.
            return self.skip_custom_data();
        }

        for level in &bound.levels {
            let hook = record
                .and(level.local.as_ref())
                .and_then(|local| local.decode_hook().cloned());
            match (level.custom, hook) {
                (true, Some(hook)) => {
                    self.input.set_mode(StreamMode::Block)?;
                    let mut ctx = HookDecodeContext {
                        dec: &mut *self,
                        record: record.cloned(),
                        level,
                        record_handle: handle,
                        external: false,
                        default_done: false,
                        read_any: false,
                    };
                    hook.decode(&mut ctx)?;
                    self.skip_custom_data()?;
                }
                (true, None) => {
                    // The peer wrote a custom section but nothing local
                    // consumes it: absorb the default fields, then skip the
                    // rest of the section.
                    self.read_level_fields(level, record, handle)?;
                    self.skip_custom_data()?;
                }
                (false, Some(hook)) => {
                    // Local type upgraded to a custom reader against a
                    // plain field section. Reads past the fields report
                    // end of custom data.
                    self.input.set_mode(StreamMode::Block)?;
                    let mut ctx = HookDecodeContext {
                        dec: &mut *self,
                        record: record.cloned(),
                        level,
                        record_handle: handle,
                        external: false,
                        default_done: false,
                        read_any: false,
                    };
                    hook.decode(&mut ctx)?;
                    let consumed_defaults = ctx.default_done;
                    self.input.set_mode(StreamMode::Raw)?;
                    if !consumed_defaults {
                        // Keep the stream aligned by discarding the field
                        // section the hook ignored.
                        self.read_level_fields(level, None, handle)?;
                    }
                }
                (false, None) => {
                    self.read_level_fields(level, record, handle)?;
                }
            }
        }
        Ok(())
    }

    /// Reads one level's field values. Fields with no slot in the local
    /// layout are consumed and dropped; dropped reference fields carry no
    /// dependency edge.
    fn read_level_fields(
        &mut self,
        level: &LevelPlan,
        record: Option<&Rc<RefCell<RecordValue>>>,
        record_handle: u32,
    ) -> StreamResult<()> {
        for (i, spec) in level.wire_level.fields().iter().enumerate() {
            let slot = level.plans[i];
            match spec.kind() {
                FieldKind::Prim(kind) => {
                    let prim = self.read_prim(kind)?;
                    if let (Some(idx), Some(rc)) = (slot, record) {
                        rc.borrow_mut().values_mut()[idx] = Value::Prim(prim);
                    }
                }
                FieldKind::Ref => {
                    let (element, element_handle) = self.read_entity(spec.is_unshared())?;
                    if let (Some(idx), Some(rc)) = (slot, record) {
                        self.handles
                            .mark_dependency(Some(record_handle), element_handle);
                        rc.borrow_mut().values_mut()[idx] = element;
                    }
                }
            }
        }
        Ok(())
    }

    fn read_prim(&mut self, kind: PrimKind) -> StreamResult<PrimValue> {
        Ok(match kind {
            PrimKind::Bool => PrimValue::Bool(self.input.read_bool()?),
            PrimKind::I8 => PrimValue::I8(self.input.read_i8()?),
            PrimKind::I16 => PrimValue::I16(self.input.read_i16()?),
            PrimKind::I32 => PrimValue::I32(self.input.read_i32()?),
            PrimKind::I64 => PrimValue::I64(self.input.read_i64()?),
            PrimKind::F32 => PrimValue::F32(self.input.read_f32()?),
            PrimKind::F64 => PrimValue::F64(self.input.read_f64()?),
            PrimKind::Char => PrimValue::Char(self.input.read_u16()?),
        })
    }

    /// Consumes a custom section up to and including its end-of-block
    /// marker: leftover block payload, stray frames, and whole entities
    /// embedded in the section. Embedded entities still claim their
    /// handles so later back-references stay valid.
    fn skip_custom_data(&mut self) -> StreamResult<()> {
        if self.input.mode() == StreamMode::Block {
            self.input.drain_current_block()?;
            self.input.set_mode(StreamMode::Raw)?;
        }
        loop {
            let tag = self.input.peek_u8()?;
            match tag {
                TAG_BLOCK_SHORT | TAG_BLOCK_LONG => {
                    self.input.set_mode(StreamMode::Block)?;
                    if self.input.next_block()? {
                        self.input.drain_current_block()?;
                    }
                    self.input.set_mode(StreamMode::Raw)?;
                }
                TAG_END_BLOCK => {
                    self.input.read_u8()?;
                    return Ok(());
                }
                _ => {
                    let _ = self.read_entity(false)?;
                }
            }
        }
    }
}

impl<R: Read> std::fmt::Debug for Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("session", &self.session)
            .field("handles", &self.handles.len())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Decode-side view handed to custom hooks for one descriptor level.
struct HookDecodeContext<'a, R: Read> {
    dec: &'a mut Decoder<R>,
    record: Option<Rc<RefCell<RecordValue>>>,
    level: &'a LevelPlan,
    record_handle: u32,
    external: bool,
    default_done: bool,
    read_any: bool,
}

impl<R: Read> object_graph_core::DecodeContext for HookDecodeContext<'_, R> {
    fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.level.wire_level
    }

    fn default_read(&mut self) -> StreamResult<()> {
        if self.external {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "external types have no default field section".into(),
            });
        }
        if self.default_done {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "default fields may be read at most once".into(),
            });
        }
        if self.read_any {
            return Err(StreamError::Protocol {
                context: "custom section",
                details: "default fields must be read before any custom payload".into(),
            });
        }
        self.dec.input.set_mode(StreamMode::Raw)?;
        let record = self.record.clone();
        self.dec
            .read_level_fields(self.level, record.as_ref(), self.record_handle)?;
        self.dec.input.set_mode(StreamMode::Block)?;
        self.default_done = true;
        self.read_any = true;
        Ok(())
    }

    fn read_value(&mut self) -> StreamResult<Value> {
        self.read_any = true;
        let (value, handle) = self.dec.read_entity(false)?;
        self.dec
            .handles
            .mark_dependency(Some(self.record_handle), handle);
        Ok(value)
    }

    fn read_bool(&mut self) -> StreamResult<bool> {
        self.read_any = true;
        self.dec.input.read_bool()
    }

    fn read_i8(&mut self) -> StreamResult<i8> {
        self.read_any = true;
        self.dec.input.read_i8()
    }

    fn read_i16(&mut self) -> StreamResult<i16> {
        self.read_any = true;
        self.dec.input.read_i16()
    }

    fn read_i32(&mut self) -> StreamResult<i32> {
        self.read_any = true;
        self.dec.input.read_i32()
    }

    fn read_i64(&mut self) -> StreamResult<i64> {
        self.read_any = true;
        self.dec.input.read_i64()
    }

    fn read_f32(&mut self) -> StreamResult<f32> {
        self.read_any = true;
        self.dec.input.read_f32()
    }

    fn read_f64(&mut self) -> StreamResult<f64> {
        self.read_any = true;
        self.dec.input.read_f64()
    }

    fn read_char(&mut self) -> StreamResult<u16> {
        self.read_any = true;
        self.dec.input.read_u16()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        self.read_any = true;
        self.dec.input.read_exact(buf)
    }

    fn read_str(&mut self) -> StreamResult<String> {
        self.read_any = true;
        self.dec.read_mutf8_u16()
    }

    fn register_validation(&mut self, callback: Box<dyn ValidationCallback>, priority: i32) {
        self.dec.vlist.register(callback, priority);
    }
}
