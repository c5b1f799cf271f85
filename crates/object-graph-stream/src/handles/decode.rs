//! Decode-side handle table.
//!
//! Rebuilt entities register here in assignment order so back-references
//! resolve by index. The table also owns exception tracking: a handle
//! whose type failed to resolve is marked, and every handle that stored a
//! reference to it is marked too, transitively, while unrelated handles
//! stay usable.
//!
//! Status moves through a small lattice. A handle starts `Unknown` while
//! its entity is being read, becomes `Ok` once the read completes with no
//! unresolved back-references, or becomes `Exception` and stays there.
//! Because a back-reference can point at a handle that is still open (a
//! cycle), resolution is batched: `finish` only promotes handles once no
//! earlier open handle could still poison them, tracked by the lowest
//! handle number with a pending dependency.

use std::rc::Rc;
use std::sync::Arc;

use object_graph_core::{ResolveError, StreamError, StreamResult, Value};

use crate::binding::BoundDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleStatus {
    Unknown,
    Ok,
    Exception,
}

/// What a decode handle resolves to.
#[derive(Debug)]
pub(crate) enum DecodeEntity {
    /// Assigned but not yet populated. Back-references resolve to null
    /// until the entity is set.
    Pending,
    Value(Value),
    Descriptor(Rc<BoundDescriptor>),
}

#[derive(Debug)]
struct Slot {
    status: HandleStatus,
    entity: DecodeEntity,
    unshared: bool,
    deps: Vec<u32>,
    err: Option<Arc<ResolveError>>,
}

/// Handle-indexed entity table with batched exception resolution.
#[derive(Debug)]
pub(crate) struct DecodeHandleTable {
    slots: Vec<Slot>,
    /// Lowest handle number some later handle recorded a dependency on,
    /// or -1 when none is pending.
    low_dep: i64,
    /// Handles assigned but not yet finished, in assignment order.
    open: Vec<u32>,
}

impl DecodeHandleTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            low_dep: -1,
            open: Vec::new(),
        }
    }

    /// Number of handles assigned so far.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Assign the next handle. The caller must pair this with exactly one
    /// [`DecodeHandleTable::finish`] after the entity's payload is read.
    pub(crate) fn assign(&mut self, entity: DecodeEntity, unshared: bool) -> u32 {
        let handle = self.slots.len() as u32;
        self.slots.push(Slot {
            status: HandleStatus::Unknown,
            entity,
            unshared,
            deps: Vec::new(),
            err: None,
        });
        self.open.push(handle);
        handle
    }

    /// Populate a handle assigned earlier in the same entity read.
    pub(crate) fn set_entry(&mut self, handle: u32, entity: DecodeEntity) {
        self.slots[handle as usize].entity = entity;
    }

    /// Record that `dependent` stored a reference resolved through
    /// `target`, so `target`'s failure must poison `dependent`.
    pub(crate) fn mark_dependency(&mut self, dependent: Option<u32>, target: Option<u32>) {
        let (Some(dep), Some(tgt)) = (dependent, target) else {
            return;
        };
        match self.slots[dep as usize].status {
            HandleStatus::Unknown => match self.slots[tgt as usize].status {
                HandleStatus::Ok => {}
                HandleStatus::Exception => {
                    if let Some(err) = self.slots[tgt as usize].err.clone() {
                        self.mark_exception(dep, err);
                    }
                }
                HandleStatus::Unknown => {
                    self.slots[tgt as usize].deps.push(dep);
                    if self.low_dep < 0 || self.low_dep > i64::from(tgt) {
                        self.low_dep = i64::from(tgt);
                    }
                }
            },
            HandleStatus::Exception => {}
            HandleStatus::Ok => {
                debug_assert!(false, "dependency recorded on a resolved handle");
            }
        }
    }

    /// Mark a handle failed and propagate to everything that depends on it.
    pub(crate) fn mark_exception(&mut self, handle: u32, err: Arc<ResolveError>) {
        let mut work = vec![handle];
        while let Some(h) = work.pop() {
            let slot = &mut self.slots[h as usize];
            match slot.status {
                HandleStatus::Unknown => {
                    slot.status = HandleStatus::Exception;
                    slot.err = Some(Arc::clone(&err));
                    work.append(&mut slot.deps);
                }
                HandleStatus::Exception => {}
                HandleStatus::Ok => {
                    debug_assert!(false, "exception marked on a resolved handle");
                }
            }
        }
    }

    /// Close a handle once its entity payload has been fully read.
    ///
    /// Promotion to `Ok` is deferred while any lower-numbered handle has a
    /// pending dependency, because that handle could still turn out to be
    /// poisoned and take this one with it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] if `handle` is not the most
    /// recently opened one; reads are strictly nested.
    pub(crate) fn finish(&mut self, handle: u32) -> StreamResult<()> {
        match self.open.pop() {
            Some(top) if top == handle => {}
            top => {
                debug_assert!(false, "finished handle {handle} while {top:?} was open");
                return Err(StreamError::Protocol {
                    context: "handle table",
                    details: format!("finished handle {handle} while {top:?} was open"),
                });
            }
        }
        let end = if self.low_dep < 0 {
            handle as usize + 1
        } else if self.low_dep >= i64::from(handle) {
            self.low_dep = -1;
            self.slots.len()
        } else {
            // An earlier handle still has pending dependencies; it will
            // sweep this span when it finishes.
            return Ok(());
        };
        for slot in &mut self.slots[handle as usize..end] {
            if slot.status == HandleStatus::Unknown {
                slot.status = HandleStatus::Ok;
                slot.deps = Vec::new();
            }
        }
        Ok(())
    }

    /// Resolve a back-reference to a value position.
    ///
    /// A poisoned handle resolves to null rather than failing: the caller
    /// records a dependency on it, so the damage is tracked precisely
    /// instead of aborting the whole stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] for unshared handles and for
    /// handles that name a descriptor.
    pub(crate) fn lookup_value(&self, handle: u32) -> StreamResult<Value> {
        let slot = &self.slots[handle as usize];
        if slot.unshared {
            return Err(StreamError::Protocol {
                context: "back-reference",
                details: format!("handle {handle} was written unshared"),
            });
        }
        if slot.status == HandleStatus::Exception {
            return Ok(Value::Null);
        }
        match &slot.entity {
            DecodeEntity::Value(v) => Ok(v.clone()),
            DecodeEntity::Pending => Ok(Value::Null),
            DecodeEntity::Descriptor(_) => Err(StreamError::Protocol {
                context: "back-reference",
                details: format!("handle {handle} names a descriptor, not a value"),
            }),
        }
    }

    /// Resolve a back-reference to a descriptor position.
    ///
    /// Poisoned descriptor handles still resolve; the binding carries its
    /// own resolution error, which each referencing record picks up.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] when the handle holds a value.
    pub(crate) fn lookup_descriptor(&self, handle: u32) -> StreamResult<Rc<BoundDescriptor>> {
        match &self.slots[handle as usize].entity {
            DecodeEntity::Descriptor(bound) => Ok(Rc::clone(bound)),
            _ => Err(StreamError::Protocol {
                context: "descriptor reference",
                details: format!("handle {handle} does not name a descriptor"),
            }),
        }
    }

    /// The resolution failure attached to a handle, if it is poisoned.
    pub(crate) fn lookup_exception(&self, handle: u32) -> Option<Arc<ResolveError>> {
        let slot = &self.slots[handle as usize];
        match slot.status {
            HandleStatus::Exception => slot.err.clone(),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn is_excepted(&self, handle: u32) -> bool {
        self.slots[handle as usize].status == HandleStatus::Exception
    }

    /// Forget every handle. Numbering restarts at zero.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.low_dep = -1;
        self.open.clear();
    }
}
