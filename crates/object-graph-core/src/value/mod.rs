//! The dynamic value model the stream engine serializes.
//!
//! Values form arbitrary graphs: records and arrays hold further values, and
//! sharing the same `Rc` from two places expresses aliasing. The engine
//! preserves exactly that pointer identity across a round trip, which is also
//! what makes cycles representable: a record field may hold a clone of the
//! `Rc` of any ancestor, including the record itself.
//!
//! # Architecture
//!
//! - [`Value`]: the closed set of entity kinds the wire format knows.
//! - [`PrimValue`] / [`PrimKind`]: fixed-width primitives with bit-exact
//!   big-endian wire encodings.
//! - [`RecordValue`]: descriptor-shaped field storage, supertype-first.
//! - [`ArrayValue`]: homogeneous primitive vectors or reference vectors.
//! - [`EnumValue`]: a descriptor plus a constant name.
//!
//! Values are deliberately single-threaded (`Rc`, `RefCell`): one value graph
//! belongs to one stream session, which is single-threaded by contract.

mod array;
mod enum_value;
mod record;

pub use array::ArrayValue;
pub use enum_value::EnumValue;
pub use record::RecordValue;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;

/// Kind discriminator for the fixed-width primitives.
///
/// The wire widths are part of the format: `Bool` and `I8` occupy one byte,
/// `I16` and `Char` two, `I32` and `F32` four, `I64` and `F64` eight, all
/// big-endian. `Char` is a single UTF-16 code unit, not a Unicode scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
}

impl PrimKind {
    /// Number of bytes this kind occupies on the wire.
    #[inline]
    #[must_use]
    pub fn wire_width(self) -> usize {
        match self {
            PrimKind::Bool | PrimKind::I8 => 1,
            PrimKind::I16 | PrimKind::Char => 2,
            PrimKind::I32 | PrimKind::F32 => 4,
            PrimKind::I64 | PrimKind::F64 => 8,
        }
    }

    /// The zero value of this kind, used for defaulted fields.
    #[must_use]
    pub fn default_value(self) -> PrimValue {
        match self {
            PrimKind::Bool => PrimValue::Bool(false),
            PrimKind::I8 => PrimValue::I8(0),
            PrimKind::I16 => PrimValue::I16(0),
            PrimKind::I32 => PrimValue::I32(0),
            PrimKind::I64 => PrimValue::I64(0),
            PrimKind::F32 => PrimValue::F32(0.0),
            PrimKind::F64 => PrimValue::F64(0.0),
            PrimKind::Char => PrimValue::Char(0),
        }
    }

    /// Short lowercase name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Bool => "bool",
            PrimKind::I8 => "i8",
            PrimKind::I16 => "i16",
            PrimKind::I32 => "i32",
            PrimKind::I64 => "i64",
            PrimKind::F32 => "f32",
            PrimKind::F64 => "f64",
            PrimKind::Char => "char",
        }
    }
}

impl std::fmt::Display for PrimKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// A single UTF-16 code unit.
    Char(u16),
}

impl PrimValue {
    /// The kind of this value.
    #[inline]
    #[must_use]
    pub fn kind(self) -> PrimKind {
        match self {
            PrimValue::Bool(_) => PrimKind::Bool,
            PrimValue::I8(_) => PrimKind::I8,
            PrimValue::I16(_) => PrimKind::I16,
            PrimValue::I32(_) => PrimKind::I32,
            PrimValue::I64(_) => PrimKind::I64,
            PrimValue::F32(_) => PrimKind::F32,
            PrimValue::F64(_) => PrimKind::F64,
            PrimValue::Char(_) => PrimKind::Char,
        }
    }
}

/// One node in a value graph.
///
/// Cloning a `Value` is cheap and preserves identity: record, array, string,
/// and enum variants clone a reference-counted pointer, so the clone aliases
/// the original.
#[derive(Debug, Clone)]
pub enum Value {
    /// The null reference.
    Null,
    /// A primitive. Primitives have no identity and never occupy a handle;
    /// they appear only as record fields, array elements, or custom payload.
    Prim(PrimValue),
    /// A character string. Strings are entities with identity: two fields
    /// holding clones of the same `Rc` decode back to one shared string.
    Str(Rc<str>),
    /// An array, mutable in place.
    Array(Rc<RefCell<ArrayValue>>),
    /// An enumerated constant.
    Enum(Rc<EnumValue>),
    /// An ordinary record, mutable in place.
    Record(Rc<RefCell<RecordValue>>),
}

impl Value {
    /// Wrap a string slice.
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Create a record shell with all fields defaulted, ready for
    /// [`RecordValue::set`] calls.
    #[must_use]
    pub fn record(descriptor: Arc<TypeDescriptor>) -> Self {
        Value::Record(Rc::new(RefCell::new(RecordValue::new(descriptor))))
    }

    /// Wrap an array.
    #[must_use]
    pub fn array(array: ArrayValue) -> Self {
        Value::Array(Rc::new(RefCell::new(array)))
    }

    /// True for [`Value::Null`].
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The record behind this value, if it is one.
    #[inline]
    #[must_use]
    pub fn as_record(&self) -> Option<&Rc<RefCell<RecordValue>>> {
        match self {
            Value::Record(rc) => Some(rc),
            _ => None,
        }
    }

    /// The array behind this value, if it is one.
    #[inline]
    #[must_use]
    pub fn as_array(&self) -> Option<&Rc<RefCell<ArrayValue>>> {
        match self {
            Value::Array(rc) => Some(rc),
            _ => None,
        }
    }

    /// The enum constant behind this value, if it is one.
    #[inline]
    #[must_use]
    pub fn as_enum(&self) -> Option<&Rc<EnumValue>> {
        match self {
            Value::Enum(rc) => Some(rc),
            _ => None,
        }
    }

    /// The string behind this value, if it is one.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The primitive behind this value, if it is one.
    #[inline]
    #[must_use]
    pub fn as_prim(&self) -> Option<PrimValue> {
        match self {
            Value::Prim(p) => Some(*p),
            _ => None,
        }
    }

    /// Short kind name used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Prim(p) => p.kind().name(),
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Enum(_) => "enum",
            Value::Record(_) => "record",
        }
    }

    /// True when `self` and `other` are the same entity (pointer identity),
    /// or both null. Primitives have no identity and always compare false.
    #[must_use]
    pub fn same_entity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Enum(a), Value::Enum(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<PrimValue> for Value {
    fn from(p: PrimValue) -> Self {
        Value::Prim(p)
    }
}

macro_rules! prim_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Prim(PrimValue::$variant(v))
            }
        })*
    };
}

prim_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}
