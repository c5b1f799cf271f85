//! Type descriptors: the per-type metadata the stream is described by.
//!
//! A [`TypeDescriptor`] names a type, lists its fields, links to its
//! supertype descriptor, and carries capability flags. Descriptors are
//! immutable once built and shared behind `Arc`; the stream engine writes
//! each distinct descriptor once per session and back-references it after
//! that, keyed by pointer identity.
//!
//! # Architecture
//!
//! - [`field`]: field declarations ([`FieldSpec`], [`FieldKind`])
//! - [`builder`]: validated construction ([`TypeDescriptorBuilder`])
//! - [`registry`]: name-to-type resolution plus hooks ([`TypeRegistry`])

pub mod builder;
pub mod field;
pub mod registry;

pub use builder::TypeDescriptorBuilder;
pub use field::{FieldKind, FieldSpec};
pub use registry::{RegisteredType, TypeRegistration, TypeRegistry};

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// Capability flag: the type writes a custom section after its field data.
pub const FLAG_CUSTOM_ENCODE: u8 = 0x01;
/// Capability flag: the type consumes its custom section with a decode hook.
pub const FLAG_CUSTOM_DECODE: u8 = 0x02;
/// Capability flag: the type encodes itself entirely through hooks and has
/// no field structure at all.
pub const FLAG_EXTERNAL: u8 = 0x04;
/// Capability flag: the type is an enumeration of named constants.
pub const FLAG_ENUM: u8 = 0x08;
/// Capability flag: the type is a dynamic proxy described by an interface
/// list instead of a name.
pub const FLAG_PROXY: u8 = 0x10;

/// Mask of all defined capability flags.
pub const FLAG_MASK: u8 =
    FLAG_CUSTOM_ENCODE | FLAG_CUSTOM_DECODE | FLAG_EXTERNAL | FLAG_ENUM | FLAG_PROXY;

/// Immutable per-type metadata: name, fields, supertype link, capability
/// flags, and (for proxies) the interface list.
///
/// # Examples
///
/// ```rust
/// use object_graph_core::descriptor::TypeDescriptor;
/// use object_graph_core::value::PrimKind;
///
/// let base = TypeDescriptor::builder("Shape")
///     .prim_field("id", PrimKind::I64)
///     .build()
///     .unwrap();
/// let circle = TypeDescriptor::builder("Circle")
///     .supertype(base)
///     .prim_field("radius", PrimKind::F64)
///     .build()
///     .unwrap();
///
/// assert_eq!(circle.chain().len(), 2);
/// assert_eq!(circle.total_field_count(), 2);
/// ```
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    flags: u8,
    fields: Vec<FieldSpec>,
    supertype: Option<Arc<TypeDescriptor>>,
    proxy_interfaces: Vec<String>,
}

impl TypeDescriptor {
    /// Start building an ordinary descriptor.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(name)
    }

    /// An enum descriptor: named constants, no fields, no supertype.
    #[must_use]
    pub fn enumeration(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            flags: FLAG_ENUM,
            fields: Vec::new(),
            supertype: None,
            proxy_interfaces: Vec::new(),
        })
    }

    /// A dynamic-proxy descriptor: an interface list plus an optional
    /// supertype whose fields carry the proxy's state.
    ///
    /// The name is synthesized from the interface list; it is local-only
    /// and never written to the wire.
    #[must_use]
    pub fn proxy(interfaces: Vec<String>, supertype: Option<Arc<TypeDescriptor>>) -> Arc<Self> {
        let name = format!("<proxy: {}>", interfaces.join(", "));
        Arc::new(Self {
            name,
            flags: FLAG_PROXY,
            fields: Vec::new(),
            supertype,
            proxy_interfaces: interfaces,
        })
    }

    /// Reconstruct a descriptor from decoded stream metadata.
    ///
    /// Local definitions go through [`TypeDescriptor::builder`]; this
    /// constructor exists for a decoder rebuilding what a peer declared,
    /// so it enforces the same structural rules without the builder's
    /// capability-oriented surface.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDescriptor`] for undefined flag bits,
    /// proxy flags (proxies have their own constructor), enums or external
    /// types carrying fields or a supertype, and unusable supertypes, or
    /// [`CoreError::DuplicateField`] for repeated field names.
    pub fn from_wire(
        name: String,
        flags: u8,
        fields: Vec<FieldSpec>,
        supertype: Option<Arc<TypeDescriptor>>,
    ) -> CoreResult<Arc<Self>> {
        if flags & !FLAG_MASK != 0 {
            return Err(CoreError::InvalidDescriptor {
                type_name: name,
                details: format!("undefined flag bits in {flags:#04x}"),
            });
        }
        if flags & FLAG_PROXY != 0 {
            return Err(CoreError::InvalidDescriptor {
                type_name: name,
                details: "proxy descriptors carry an interface list, not a name".to_string(),
            });
        }
        if flags & (FLAG_ENUM | FLAG_EXTERNAL) != 0 && !fields.is_empty() {
            return Err(CoreError::InvalidDescriptor {
                type_name: name,
                details: "enum and external types have no engine-managed fields".to_string(),
            });
        }
        if flags & (FLAG_ENUM | FLAG_EXTERNAL) != 0 && supertype.is_some() {
            return Err(CoreError::InvalidDescriptor {
                type_name: name,
                details: "enum and external types have no supertype".to_string(),
            });
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(CoreError::DuplicateField {
                    type_name: name,
                    field: field.name().to_string(),
                });
            }
        }
        if let Some(sup) = &supertype {
            if sup.is_enum() || sup.is_proxy() || sup.is_external() {
                return Err(CoreError::InvalidDescriptor {
                    type_name: name,
                    details: format!("{} cannot be used as a supertype", sup.name()),
                });
            }
        }
        Ok(Arc::new(Self::from_parts(
            name,
            flags,
            fields,
            supertype,
            Vec::new(),
        )))
    }

    pub(crate) fn from_parts(
        name: String,
        flags: u8,
        fields: Vec<FieldSpec>,
        supertype: Option<Arc<TypeDescriptor>>,
        proxy_interfaces: Vec<String>,
    ) -> Self {
        Self {
            name,
            flags,
            fields,
            supertype,
            proxy_interfaces,
        }
    }

    /// The type's name. For proxies this is a synthesized local label.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw capability flag byte.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Fields declared at this level only, excluding supertype levels.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The supertype descriptor, if any.
    #[inline]
    #[must_use]
    pub fn supertype(&self) -> Option<&Arc<TypeDescriptor>> {
        self.supertype.as_ref()
    }

    /// Interface names for proxy descriptors; empty otherwise.
    #[inline]
    #[must_use]
    pub fn proxy_interfaces(&self) -> &[String] {
        &self.proxy_interfaces
    }

    /// True when the type writes a custom section after its fields.
    #[inline]
    #[must_use]
    pub fn has_custom_encode(&self) -> bool {
        self.flags & FLAG_CUSTOM_ENCODE != 0
    }

    /// True when the type consumes its custom section with a decode hook.
    #[inline]
    #[must_use]
    pub fn has_custom_decode(&self) -> bool {
        self.flags & FLAG_CUSTOM_DECODE != 0
    }

    /// True when the type is encoded entirely through hooks.
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.flags & FLAG_EXTERNAL != 0
    }

    /// True for enum descriptors.
    #[inline]
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.flags & FLAG_ENUM != 0
    }

    /// True for dynamic-proxy descriptors.
    #[inline]
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        self.flags & FLAG_PROXY != 0
    }

    /// The descriptor chain in walk order: most general supertype first,
    /// this descriptor last.
    #[must_use]
    pub fn chain(&self) -> Vec<&TypeDescriptor> {
        let mut chain = Vec::new();
        let mut cursor = Some(self);
        while let Some(desc) = cursor {
            chain.push(desc);
            cursor = desc.supertype.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Total number of fields across the whole chain.
    #[must_use]
    pub fn total_field_count(&self) -> usize {
        self.chain().iter().map(|level| level.fields().len()).sum()
    }

    /// The field spec at a flat walk-order index, counting across the chain.
    #[must_use]
    pub fn flat_spec(&self, mut index: usize) -> Option<&FieldSpec> {
        for level in self.chain() {
            if index < level.fields().len() {
                return Some(&level.fields()[index]);
            }
            index -= level.fields().len();
        }
        None
    }
}
