//! Validated descriptor construction.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::value::PrimKind;

use super::{
    FieldKind, FieldSpec, TypeDescriptor, FLAG_CUSTOM_DECODE, FLAG_CUSTOM_ENCODE, FLAG_EXTERNAL,
};

/// Builder for ordinary (non-enum, non-proxy) descriptors.
///
/// Enum and proxy descriptors have fixed shapes and are built through
/// [`TypeDescriptor::enumeration`] and [`TypeDescriptor::proxy`] instead.
///
/// # Examples
///
/// ```rust
/// use object_graph_core::descriptor::TypeDescriptor;
/// use object_graph_core::value::PrimKind;
///
/// let desc = TypeDescriptor::builder("ListNode")
///     .prim_field("weight", PrimKind::F64)
///     .ref_field("next")
///     .build()
///     .unwrap();
/// assert_eq!(desc.fields().len(), 2);
/// ```
#[derive(Debug)]
pub struct TypeDescriptorBuilder {
    name: String,
    flags: u8,
    fields: Vec<FieldSpec>,
    supertype: Option<Arc<TypeDescriptor>>,
}

impl TypeDescriptorBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: 0,
            fields: Vec::new(),
            supertype: None,
        }
    }

    /// Declare a primitive field.
    #[must_use]
    pub fn prim_field(mut self, name: impl Into<String>, kind: PrimKind) -> Self {
        self.fields
            .push(FieldSpec::new(name, FieldKind::Prim(kind), false));
        self
    }

    /// Declare a reference field.
    #[must_use]
    pub fn ref_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::new(name, FieldKind::Ref, false));
        self
    }

    /// Declare an unshared reference field: its value is written as a fresh
    /// entity every time and can never be the target of a back-reference.
    #[must_use]
    pub fn unshared_ref_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::new(name, FieldKind::Ref, true));
        self
    }

    /// Link the supertype descriptor.
    #[must_use]
    pub fn supertype(mut self, supertype: Arc<TypeDescriptor>) -> Self {
        self.supertype = Some(supertype);
        self
    }

    /// Mark the type as writing a custom section after its field data.
    /// Registration will require an encode hook.
    #[must_use]
    pub fn custom_encode(mut self) -> Self {
        self.flags |= FLAG_CUSTOM_ENCODE;
        self
    }

    /// Mark the type as consuming its custom section with a decode hook.
    /// Registration will require a decode hook.
    #[must_use]
    pub fn custom_decode(mut self) -> Self {
        self.flags |= FLAG_CUSTOM_DECODE;
        self
    }

    /// Mark the type as externally self-encoded: the whole object travels
    /// as one custom section and the descriptor carries no fields at all.
    #[must_use]
    pub fn external(mut self) -> Self {
        self.flags |= FLAG_EXTERNAL;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateField`] if two fields at this level share a name
    /// - [`CoreError::InvalidDescriptor`] if the shape contradicts the flags
    ///   (external with fields or a supertype, or a supertype that is an enum
    ///   or proxy descriptor)
    pub fn build(self) -> CoreResult<Arc<TypeDescriptor>> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name()) {
                return Err(CoreError::DuplicateField {
                    type_name: self.name,
                    field: field.name().to_string(),
                });
            }
        }

        if self.flags & FLAG_EXTERNAL != 0 {
            if !self.fields.is_empty() {
                return Err(CoreError::InvalidDescriptor {
                    type_name: self.name,
                    details: "externally encoded types carry no field structure".to_string(),
                });
            }
            if self.supertype.is_some() {
                return Err(CoreError::InvalidDescriptor {
                    type_name: self.name,
                    details: "externally encoded types carry no supertype".to_string(),
                });
            }
        }

        if let Some(supertype) = &self.supertype {
            if supertype.is_enum() || supertype.is_proxy() || supertype.is_external() {
                return Err(CoreError::InvalidDescriptor {
                    type_name: self.name,
                    details: format!(
                        "supertype {} cannot head a field-structured chain",
                        supertype.name()
                    ),
                });
            }
        }

        Ok(Arc::new(TypeDescriptor::from_parts(
            self.name,
            self.flags,
            self.fields,
            self.supertype,
            Vec::new(),
        )))
    }
}
