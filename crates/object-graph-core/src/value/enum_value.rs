//! Enumerated constant values.

use std::sync::Arc;

use crate::descriptor::TypeDescriptor;

/// An enumerated constant: a descriptor plus the constant's name.
///
/// On the wire an enum travels as its name only, never as field data. The
/// decoder canonicalizes constants per session, so every occurrence of the
/// same constant of the same type decodes to one shared value. On the encode
/// side no such canonicalization exists; callers that want two fields to
/// alias one constant should clone the same `Rc`.
#[derive(Debug)]
pub struct EnumValue {
    descriptor: Arc<TypeDescriptor>,
    constant: String,
}

impl EnumValue {
    /// Pair a descriptor with a constant name.
    ///
    /// The name is not checked here; [`crate::descriptor::TypeRegistry::enum_value`]
    /// is the checked construction path.
    #[must_use]
    pub fn new(descriptor: Arc<TypeDescriptor>, constant: impl Into<String>) -> Self {
        Self {
            descriptor,
            constant: constant.into(),
        }
    }

    /// The enum's descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// The constant's name.
    #[inline]
    #[must_use]
    pub fn constant(&self) -> &str {
        &self.constant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_value_accessors() {
        let desc = TypeDescriptor::enumeration("Color");
        let v = EnumValue::new(desc, "RED");
        assert_eq!(v.constant(), "RED");
        assert_eq!(v.descriptor().name(), "Color");
        assert!(v.descriptor().is_enum());
    }
}
