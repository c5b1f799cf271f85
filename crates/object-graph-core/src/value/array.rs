//! Array values.

use crate::descriptor::FieldKind;
use crate::value::PrimKind;

use super::Value;

/// A homogeneous array.
///
/// Primitive element kinds store their elements unboxed; on the wire they
/// travel as one bulk length-prefixed span. `Ref` arrays hold full values
/// element by element, each walked through the handle table like any other
/// reference.
#[derive(Debug, Clone)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// UTF-16 code units.
    Char(Vec<u16>),
    /// Reference elements: records, strings, arrays, enums, or nulls.
    Ref(Vec<Value>),
}

impl ArrayValue {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::I8(v) => v.len(),
            ArrayValue::I16(v) => v.len(),
            ArrayValue::I32(v) => v.len(),
            ArrayValue::I64(v) => v.len(),
            ArrayValue::F32(v) => v.len(),
            ArrayValue::F64(v) => v.len(),
            ArrayValue::Char(v) => v.len(),
            ArrayValue::Ref(v) => v.len(),
        }
    }

    /// True when the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element kind: a primitive kind, or `Ref` for value elements.
    #[must_use]
    pub fn elem_kind(&self) -> FieldKind {
        match self {
            ArrayValue::Bool(_) => FieldKind::Prim(PrimKind::Bool),
            ArrayValue::I8(_) => FieldKind::Prim(PrimKind::I8),
            ArrayValue::I16(_) => FieldKind::Prim(PrimKind::I16),
            ArrayValue::I32(_) => FieldKind::Prim(PrimKind::I32),
            ArrayValue::I64(_) => FieldKind::Prim(PrimKind::I64),
            ArrayValue::F32(_) => FieldKind::Prim(PrimKind::F32),
            ArrayValue::F64(_) => FieldKind::Prim(PrimKind::F64),
            ArrayValue::Char(_) => FieldKind::Prim(PrimKind::Char),
            ArrayValue::Ref(_) => FieldKind::Ref,
        }
    }

    /// An empty array of the given element kind.
    #[must_use]
    pub fn empty(kind: FieldKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    /// An empty array of the given element kind with reserved capacity.
    #[must_use]
    pub fn with_capacity(kind: FieldKind, capacity: usize) -> Self {
        match kind {
            FieldKind::Prim(PrimKind::Bool) => ArrayValue::Bool(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::I8) => ArrayValue::I8(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::I16) => ArrayValue::I16(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::I32) => ArrayValue::I32(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::I64) => ArrayValue::I64(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::F32) => ArrayValue::F32(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::F64) => ArrayValue::F64(Vec::with_capacity(capacity)),
            FieldKind::Prim(PrimKind::Char) => ArrayValue::Char(Vec::with_capacity(capacity)),
            FieldKind::Ref => ArrayValue::Ref(Vec::with_capacity(capacity)),
        }
    }
}
