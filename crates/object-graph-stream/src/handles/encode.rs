//! Encode-side handle table.
//!
//! Identity is pointer identity: two values are the same entity exactly
//! when they share a heap allocation. The table therefore hashes the
//! allocation address, chains collisions through parallel index arrays,
//! and keeps a clone of every shared entity so no address can be freed
//! and reused for a different allocation while the table still maps it.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use object_graph_core::{ArrayValue, EnumValue, RecordValue, TypeDescriptor, Value};

const INITIAL_SPINE: usize = 16;
const LOAD_FACTOR: usize = 3;

/// An entity the encoder has assigned a handle to.
#[derive(Debug, Clone)]
pub(crate) enum EncodeEntity {
    Str(Rc<str>),
    Array(Rc<RefCell<ArrayValue>>),
    Enum(Rc<EnumValue>),
    Record(Rc<RefCell<RecordValue>>),
    Descriptor(Arc<TypeDescriptor>),
    /// A handle consumed by an unshared write. Never entered into the hash
    /// chains, so later lookups can never return it.
    Reserved,
}

impl EncodeEntity {
    /// The entity behind a reference value, `None` for null and primitives.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Prim(_) => None,
            Value::Str(s) => Some(Self::Str(Rc::clone(s))),
            Value::Array(a) => Some(Self::Array(Rc::clone(a))),
            Value::Enum(e) => Some(Self::Enum(Rc::clone(e))),
            Value::Record(r) => Some(Self::Record(Rc::clone(r))),
        }
    }

    fn addr(&self) -> usize {
        match self {
            Self::Str(s) => Rc::as_ptr(s) as *const u8 as usize,
            Self::Array(a) => Rc::as_ptr(a) as usize,
            Self::Enum(e) => Rc::as_ptr(e) as usize,
            Self::Record(r) => Rc::as_ptr(r) as usize,
            Self::Descriptor(d) => Arc::as_ptr(d) as usize,
            Self::Reserved => unreachable!("reserved slots are never hashed"),
        }
    }
}

/// Maps entity addresses to their assigned handles.
///
/// Handles are dense and start at zero; the next assignment is always
/// `len()`. The spine length stays a power of two so the hash can mask
/// instead of dividing.
#[derive(Debug)]
pub(crate) struct EncodeHandleTable {
    spine: Vec<i32>,
    next: Vec<i32>,
    entries: Vec<EncodeEntity>,
}

impl EncodeHandleTable {
    pub(crate) fn new() -> Self {
        Self {
            spine: vec![-1; INITIAL_SPINE],
            next: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Number of handles assigned so far.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn bucket(&self, addr: usize) -> usize {
        // Low bits of an allocation address are alignment padding; shift
        // them out before mixing.
        (addr >> 3).wrapping_mul(0x9E37_79B9_7F4A_7C15) as usize & (self.spine.len() - 1)
    }

    /// The handle previously assigned to this entity, if any.
    pub(crate) fn lookup(&self, entity: &EncodeEntity) -> Option<u32> {
        let addr = entity.addr();
        let mut slot = self.spine[self.bucket(addr)];
        while slot >= 0 {
            let idx = slot as usize;
            if !matches!(self.entries[idx], EncodeEntity::Reserved) && self.entries[idx].addr() == addr
            {
                return Some(slot as u32);
            }
            slot = self.next[idx];
        }
        None
    }

    /// Assign the next handle to `entity` and index it for lookup.
    pub(crate) fn assign(&mut self, entity: EncodeEntity) -> u32 {
        debug_assert!(!matches!(entity, EncodeEntity::Reserved));
        if self.entries.len() >= self.spine.len() * LOAD_FACTOR {
            self.grow();
        }
        let handle = self.entries.len() as u32;
        let bucket = self.bucket(entity.addr());
        self.entries.push(entity);
        self.next.push(self.spine[bucket]);
        self.spine[bucket] = handle as i32;
        handle
    }

    /// Burn the next handle number without indexing anything.
    ///
    /// Unshared writes consume a handle on the wire, but the entity must
    /// not be findable afterwards.
    pub(crate) fn assign_reserved(&mut self) -> u32 {
        let handle = self.entries.len() as u32;
        self.entries.push(EncodeEntity::Reserved);
        self.next.push(-1);
        handle
    }

    fn grow(&mut self) {
        let new_len = self.spine.len() * 2;
        self.spine = vec![-1; new_len];
        for slot in &mut self.next {
            *slot = -1;
        }
        for idx in 0..self.entries.len() {
            if matches!(self.entries[idx], EncodeEntity::Reserved) {
                continue;
            }
            let bucket = self.bucket(self.entries[idx].addr());
            self.next[idx] = self.spine[bucket];
            self.spine[bucket] = idx as i32;
        }
    }

    /// Forget every assignment. Handle numbering restarts at zero.
    pub(crate) fn clear(&mut self) {
        self.spine.clear();
        self.spine.resize(INITIAL_SPINE, -1);
        self.next.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_entity(s: &str) -> EncodeEntity {
        EncodeEntity::Str(Rc::from(s))
    }

    #[test]
    fn test_assign_then_lookup() {
        let mut table = EncodeHandleTable::new();
        let a = str_entity("a");
        let handle = table.assign(a.clone());
        assert_eq!(handle, 0);
        assert_eq!(table.lookup(&a), Some(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_allocations_are_distinct_entities() {
        let mut table = EncodeHandleTable::new();
        let a = str_entity("same");
        let b = str_entity("same");
        table.assign(a.clone());
        assert_eq!(table.lookup(&b), None);
        assert_eq!(table.assign(b.clone()), 1);
        assert_eq!(table.lookup(&a), Some(0));
        assert_eq!(table.lookup(&b), Some(1));
    }

    #[test]
    fn test_reserved_consumes_number_without_lookup() {
        let mut table = EncodeHandleTable::new();
        let a = str_entity("a");
        assert_eq!(table.assign_reserved(), 0);
        assert_eq!(table.assign(a.clone()), 1);
        assert_eq!(table.lookup(&a), Some(1));
    }

    #[test]
    fn test_survives_growth() {
        let mut table = EncodeHandleTable::new();
        let entities: Vec<EncodeEntity> = (0..200)
            .map(|i| str_entity(&format!("entity-{i}")))
            .collect();
        for (i, e) in entities.iter().enumerate() {
            assert_eq!(table.assign(e.clone()), i as u32);
        }
        for (i, e) in entities.iter().enumerate() {
            assert_eq!(table.lookup(e), Some(i as u32));
        }
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let mut table = EncodeHandleTable::new();
        let a = str_entity("a");
        table.assign(a.clone());
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.lookup(&a), None);
        assert_eq!(table.assign(a.clone()), 0);
    }

    #[test]
    fn test_table_keeps_entities_alive() {
        let mut table = EncodeHandleTable::new();
        let rc: Rc<str> = Rc::from("pinned");
        table.assign(EncodeEntity::Str(Rc::clone(&rc)));
        let weak = Rc::downgrade(&rc);
        drop(rc);
        // The table's clone must hold the allocation so the address cannot
        // be recycled for a different entity.
        assert!(weak.upgrade().is_some());
    }
}
