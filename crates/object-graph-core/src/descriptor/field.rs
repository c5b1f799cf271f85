//! Field specifications.

use crate::value::PrimKind;

/// Declared kind of a record field or array element: one fixed-width
/// primitive, or a reference to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Prim(PrimKind),
    Ref,
}

impl FieldKind {
    /// Short name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Prim(kind) => kind.name(),
            FieldKind::Ref => "reference",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One field declaration inside a descriptor level.
///
/// The `unshared` flag is part of the wire contract: an unshared field's
/// value is written as a fresh entity every time and its handle slot is a
/// placeholder that no later back-reference may name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    unshared: bool,
}

impl FieldSpec {
    /// Declare a field.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind, unshared: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            unshared,
        }
    }

    /// The field's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's declared kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field opts out of back-reference sharing.
    #[inline]
    #[must_use]
    pub fn is_unshared(&self) -> bool {
        self.unshared
    }

    /// True for primitive kinds.
    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, FieldKind::Prim(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_spec_accessors() {
        let f = FieldSpec::new("next", FieldKind::Ref, true);
        assert_eq!(f.name(), "next");
        assert_eq!(f.kind(), FieldKind::Ref);
        assert!(f.is_unshared());
        assert!(!f.is_primitive());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FieldKind::Ref.to_string(), "reference");
        assert_eq!(FieldKind::Prim(PrimKind::F64).to_string(), "f64");
    }
}
