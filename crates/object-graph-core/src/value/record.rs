//! Record values: descriptor-shaped field storage.

use std::sync::Arc;

use crate::descriptor::{FieldKind, TypeDescriptor};
use crate::error::{CoreError, CoreResult};

use super::Value;

/// A record instance shaped by a [`TypeDescriptor`].
///
/// Field values are stored flat in walk order: all fields of the most
/// general supertype first, then each more specific level in turn. That is
/// the exact order in which the stream engine writes and reads them, so the
/// engine can address fields by flat index without re-deriving the chain.
///
/// # Examples
///
/// ```rust
/// use object_graph_core::descriptor::TypeDescriptor;
/// use object_graph_core::value::{PrimKind, RecordValue, Value};
///
/// let desc = TypeDescriptor::builder("Point")
///     .prim_field("x", PrimKind::I32)
///     .prim_field("y", PrimKind::I32)
///     .build()
///     .unwrap();
///
/// let mut point = RecordValue::new(desc);
/// point.set("x", Value::from(3i32)).unwrap();
/// assert_eq!(point.get("x").unwrap().as_prim().unwrap().kind().name(), "i32");
/// ```
#[derive(Debug, Clone)]
pub struct RecordValue {
    descriptor: Arc<TypeDescriptor>,
    fields: Vec<Value>,
}

impl RecordValue {
    /// Create a record with every field set to its default
    /// (zero for primitives, null for references).
    #[must_use]
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        let mut fields = Vec::with_capacity(descriptor.total_field_count());
        for level in descriptor.chain() {
            for spec in level.fields() {
                fields.push(match spec.kind() {
                    FieldKind::Prim(kind) => Value::Prim(kind.default_value()),
                    FieldKind::Ref => Value::Null,
                });
            }
        }
        Self { descriptor, fields }
    }

    /// The descriptor that shapes this record.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Field values in walk order (supertype levels first).
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.fields
    }

    /// Mutable field values in walk order. The caller is responsible for
    /// keeping each slot compatible with its declared kind; [`RecordValue::set`]
    /// is the checked path.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.fields
    }

    /// Flat index of a named field, searching the most specific level first
    /// so subtype fields shadow supertype fields of the same name.
    #[must_use]
    pub fn flat_index(&self, name: &str) -> Option<usize> {
        let chain = self.descriptor.chain();
        let mut level_base: Vec<usize> = Vec::with_capacity(chain.len());
        let mut base = 0;
        for level in &chain {
            level_base.push(base);
            base += level.fields().len();
        }
        for (level, base) in chain.iter().zip(level_base.iter()).rev() {
            if let Some(pos) = level.fields().iter().position(|f| f.name() == name) {
                return Some(base + pos);
            }
        }
        None
    }

    /// Read a named field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownField`] if no level of the descriptor
    /// chain declares `name`.
    pub fn get(&self, name: &str) -> CoreResult<Value> {
        let idx = self.flat_index(name).ok_or_else(|| CoreError::UnknownField {
            type_name: self.descriptor.name().to_string(),
            field: name.to_string(),
        })?;
        Ok(self.fields[idx].clone())
    }

    /// Assign a named field, checking the value against the declared kind.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownField`] if the field does not exist
    /// - [`CoreError::KindMismatch`] if the value's kind is not accepted by
    ///   the field (a primitive field takes exactly its primitive kind; a
    ///   reference field takes anything except a bare primitive)
    pub fn set(&mut self, name: &str, value: Value) -> CoreResult<()> {
        let idx = self.flat_index(name).ok_or_else(|| CoreError::UnknownField {
            type_name: self.descriptor.name().to_string(),
            field: name.to_string(),
        })?;
        let spec = self
            .descriptor
            .flat_spec(idx)
            .expect("flat_index returned an in-range index");
        let accepted = match (spec.kind(), &value) {
            (FieldKind::Prim(expected), Value::Prim(p)) => p.kind() == expected,
            (FieldKind::Prim(_), _) => false,
            (FieldKind::Ref, Value::Prim(_)) => false,
            (FieldKind::Ref, _) => true,
        };
        if !accepted {
            return Err(CoreError::KindMismatch {
                type_name: self.descriptor.name().to_string(),
                field: name.to_string(),
                expected: spec.kind().to_string(),
                actual: value.kind_name().to_string(),
            });
        }
        self.fields[idx] = value;
        Ok(())
    }
}
