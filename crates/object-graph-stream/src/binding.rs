//! Wire-to-local descriptor binding.
//!
//! A decoded descriptor describes the peer's version of a type. Binding
//! matches it against the local registry once, at descriptor-read time,
//! and produces a per-level field plan every record of that type is then
//! decoded through. Plans absorb type evolution:
//!
//! - wire fields with no local counterpart are read and dropped
//! - local fields with no wire counterpart keep their defaults
//! - a field whose kind changed is dropped rather than misread
//! - inheritance levels match by name, so levels inserted into or removed
//!   from either chain do not shift the others
//!
//! Only shape-level disagreements (enum against record, external against
//! field-structured, a type or proxy binding missing entirely) poison the
//! records built from the binding; everything narrower stays localized to
//! the affected field.

use std::sync::Arc;

use tracing::{debug, warn};

use object_graph_core::{RegisteredType, ResolveError, TypeDescriptor, TypeRegistry};

/// One inheritance level of a binding: the peer's descriptor for the
/// level, where each of its fields lands locally, and what the walker
/// needs to know about the level's payload shape.
#[derive(Debug)]
pub(crate) struct LevelPlan {
    pub(crate) wire_level: Arc<TypeDescriptor>,
    /// Per wire field: flat index into the local record, or `None` to
    /// read and drop.
    pub(crate) plans: Vec<Option<usize>>,
    /// The peer wrote a custom section after this level's fields.
    pub(crate) custom: bool,
    /// The peer encoded this level as a single hook-produced section with
    /// no field structure.
    pub(crate) external: bool,
    /// Local registration for this level, when the level matched one.
    /// Supplies decode hooks.
    pub(crate) local: Option<Arc<RegisteredType>>,
}

/// A wire descriptor resolved against the local registry.
#[derive(Debug)]
pub(crate) struct BoundDescriptor {
    pub(crate) wire: Arc<TypeDescriptor>,
    /// Root-level local registration, when the type resolved.
    pub(crate) local: Option<Arc<RegisteredType>>,
    /// Walk plans, supertype first, one per wire inheritance level.
    pub(crate) levels: Vec<LevelPlan>,
    /// Why resolution failed, if it did. Records built from this binding
    /// are poisoned with it.
    pub(crate) resolve_error: Option<Arc<ResolveError>>,
    pub(crate) handle: u32,
}

impl BoundDescriptor {
    #[inline]
    pub(crate) fn is_excepted(&self) -> bool {
        self.resolve_error.is_some()
    }
}

pub(crate) fn chain_arcs(desc: &Arc<TypeDescriptor>) -> Vec<Arc<TypeDescriptor>> {
    let mut chain = Vec::new();
    let mut cursor = Some(Arc::clone(desc));
    while let Some(d) = cursor {
        cursor = d.supertype().cloned();
        chain.push(d);
    }
    chain.reverse();
    chain
}

fn levels_match(wire: &TypeDescriptor, local: &TypeDescriptor) -> bool {
    if wire.is_proxy() && local.is_proxy() {
        return true;
    }
    !wire.is_proxy() && !local.is_proxy() && wire.name() == local.name()
}

/// Resolve `wire` against `registry` and lay out the walk plans.
pub(crate) fn bind(
    wire: Arc<TypeDescriptor>,
    registry: &TypeRegistry,
    handle: u32,
) -> BoundDescriptor {
    let local = if wire.is_proxy() {
        registry.resolve_proxy(wire.proxy_interfaces())
    } else {
        registry.get(wire.name())
    };

    let mut resolve_error = match (&local, wire.is_proxy()) {
        (None, true) => Some(Arc::new(ResolveError::UnknownProxy {
            interfaces: wire.proxy_interfaces().to_vec(),
        })),
        (None, false) => Some(Arc::new(ResolveError::UnknownType {
            name: wire.name().to_string(),
        })),
        (Some(_), _) => None,
    };

    if let Some(local_reg) = &local {
        let local_desc = local_reg.descriptor();
        if wire.is_enum() != local_desc.is_enum() {
            resolve_error = Some(Arc::new(ResolveError::Incompatible {
                type_name: wire.name().to_string(),
                details: "one side declares an enum and the other does not".to_string(),
            }));
        } else if wire.is_external() != local_desc.is_external() {
            resolve_error = Some(Arc::new(ResolveError::Incompatible {
                type_name: wire.name().to_string(),
                details: "one side declares an external type and the other does not".to_string(),
            }));
        }
    }

    // Local chain and the flat-index base of each of its levels.
    let local_layout = local.as_ref().map(|reg| {
        let chain = chain_arcs(reg.descriptor());
        let mut bases = Vec::with_capacity(chain.len());
        let mut acc = 0;
        for level in &chain {
            bases.push(acc);
            acc += level.fields().len();
        }
        (chain, bases)
    });

    let wire_chain = chain_arcs(&wire);
    let mut levels = Vec::with_capacity(wire_chain.len());
    let mut local_cursor = 0;

    for wire_level in wire_chain {
        let mut plans = vec![None; wire_level.fields().len()];
        let mut level_local = None;

        if let Some((local_chain, bases)) = &local_layout {
            if let Some(j) = (local_cursor..local_chain.len())
                .find(|&j| levels_match(&wire_level, &local_chain[j]))
            {
                let local_level = &local_chain[j];
                local_cursor = j + 1;
                for (i, wire_field) in wire_level.fields().iter().enumerate() {
                    let found = local_level
                        .fields()
                        .iter()
                        .position(|f| f.name() == wire_field.name());
                    match found {
                        Some(k) if local_level.fields()[k].kind() == wire_field.kind() => {
                            plans[i] = Some(bases[j] + k);
                        }
                        Some(k) => {
                            let e = ResolveError::FieldKindMismatch {
                                type_name: wire_level.name().to_string(),
                                field: wire_field.name().to_string(),
                                wire: wire_field.kind().to_string(),
                                local: local_level.fields()[k].kind().to_string(),
                            };
                            warn!(error = %e, "field dropped during binding");
                        }
                        None => {
                            debug!(
                                type_name = %wire_level.name(),
                                field = %wire_field.name(),
                                "wire field has no local counterpart"
                            );
                        }
                    }
                }
                level_local = if wire_level.is_proxy() {
                    local.clone()
                } else {
                    registry.get(local_level.name())
                };
            } else {
                debug!(type_name = %wire_level.name(), "wire level has no local counterpart");
            }
        }

        levels.push(LevelPlan {
            custom: wire_level.has_custom_encode(),
            external: wire_level.is_external(),
            wire_level,
            plans,
            local: level_local,
        });
    }

    if let Some(e) = &resolve_error {
        warn!(type_name = %wire.name(), error = %e, "type resolution failed");
    } else {
        debug!(type_name = %wire.name(), levels = levels.len(), "descriptor bound");
    }

    BoundDescriptor {
        wire,
        local,
        levels,
        resolve_error,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_graph_core::{PrimKind, TypeRegistration};

    fn registry_with(descs: &[Arc<TypeDescriptor>]) -> TypeRegistry {
        let registry = TypeRegistry::new();
        for d in descs {
            registry
                .register(TypeRegistration::new(Arc::clone(d)))
                .unwrap();
        }
        registry
    }

    fn point(name: &str) -> Arc<TypeDescriptor> {
        TypeDescriptor::builder(name)
            .prim_field("x", PrimKind::I32)
            .prim_field("y", PrimKind::I32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_identical_shape_maps_every_field() {
        let desc = point("Point");
        let registry = registry_with(&[Arc::clone(&desc)]);
        let bound = bind(Arc::clone(&desc), &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert_eq!(bound.levels.len(), 1);
        assert_eq!(bound.levels[0].plans, vec![Some(0), Some(1)]);
        assert!(bound.levels[0].local.is_some());
    }

    #[test]
    fn test_unknown_type_poisons_but_keeps_walk_plan() {
        let registry = TypeRegistry::new();
        let bound = bind(point("Ghost"), &registry, 3);
        assert!(matches!(
            bound.resolve_error.as_deref(),
            Some(ResolveError::UnknownType { .. })
        ));
        assert_eq!(bound.levels.len(), 1);
        assert_eq!(bound.levels[0].plans, vec![None, None]);
        assert_eq!(bound.handle, 3);
    }

    #[test]
    fn test_dropped_wire_field_is_discarded() {
        // Peer still has "y"; local type dropped it.
        let wire = point("Point");
        let local = TypeDescriptor::builder("Point")
            .prim_field("x", PrimKind::I32)
            .build()
            .unwrap();
        let registry = registry_with(&[local]);
        let bound = bind(wire, &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert_eq!(bound.levels[0].plans, vec![Some(0), None]);
    }

    #[test]
    fn test_changed_kind_is_dropped_not_fatal() {
        let wire = point("Point");
        let local = TypeDescriptor::builder("Point")
            .prim_field("x", PrimKind::I64)
            .prim_field("y", PrimKind::I32)
            .build()
            .unwrap();
        let registry = registry_with(&[local]);
        let bound = bind(wire, &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert_eq!(bound.levels[0].plans, vec![None, Some(1)]);
    }

    #[test]
    fn test_inserted_local_supertype_shifts_flat_indices() {
        // Wire chain: Base -> Leaf. Local chain: Base -> Middle -> Leaf.
        let wire_base = TypeDescriptor::builder("Base")
            .prim_field("a", PrimKind::I32)
            .build()
            .unwrap();
        let wire_leaf = TypeDescriptor::builder("Leaf")
            .supertype(wire_base)
            .prim_field("z", PrimKind::I32)
            .build()
            .unwrap();

        let local_base = TypeDescriptor::builder("Base")
            .prim_field("a", PrimKind::I32)
            .build()
            .unwrap();
        let local_middle = TypeDescriptor::builder("Middle")
            .supertype(local_base)
            .prim_field("m1", PrimKind::I64)
            .prim_field("m2", PrimKind::I64)
            .build()
            .unwrap();
        let local_leaf = TypeDescriptor::builder("Leaf")
            .supertype(local_middle)
            .prim_field("z", PrimKind::I32)
            .build()
            .unwrap();

        let registry = registry_with(&[local_leaf]);
        let bound = bind(wire_leaf, &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert_eq!(bound.levels.len(), 2);
        assert_eq!(bound.levels[0].plans, vec![Some(0)]);
        // Leaf's "z" sits after Base(1) + Middle(2) fields locally.
        assert_eq!(bound.levels[1].plans, vec![Some(3)]);
    }

    #[test]
    fn test_removed_local_supertype_discards_wire_level() {
        // Wire chain: Base -> Leaf. Local chain: Leaf only.
        let wire_base = TypeDescriptor::builder("Base")
            .prim_field("a", PrimKind::I32)
            .build()
            .unwrap();
        let wire_leaf = TypeDescriptor::builder("Leaf")
            .supertype(wire_base)
            .prim_field("z", PrimKind::I32)
            .build()
            .unwrap();
        let local_leaf = TypeDescriptor::builder("Leaf")
            .prim_field("z", PrimKind::I32)
            .build()
            .unwrap();

        let registry = registry_with(&[local_leaf]);
        let bound = bind(wire_leaf, &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert_eq!(bound.levels[0].plans, vec![None]);
        assert!(bound.levels[0].local.is_none());
        assert_eq!(bound.levels[1].plans, vec![Some(0)]);
    }

    #[test]
    fn test_enum_shape_disagreement_is_incompatible() {
        let wire = point("Color");
        let registry = TypeRegistry::new();
        registry
            .register(
                TypeRegistration::new(TypeDescriptor::enumeration("Color"))
                    .with_constants(["RED"]),
            )
            .unwrap();
        let bound = bind(wire, &registry, 0);
        assert!(matches!(
            bound.resolve_error.as_deref(),
            Some(ResolveError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_proxy_binding_by_interface_set() {
        let registry = TypeRegistry::new();
        let local = TypeDescriptor::proxy(
            vec!["Flushable".to_string(), "Closeable".to_string()],
            None,
        );
        registry
            .register_proxy(TypeRegistration::new(local))
            .unwrap();

        // Peer lists the interfaces in a different order.
        let wire = TypeDescriptor::proxy(
            vec!["Closeable".to_string(), "Flushable".to_string()],
            None,
        );
        let bound = bind(wire, &registry, 0);
        assert!(bound.resolve_error.is_none());
        assert!(bound.levels.last().unwrap().local.is_some());
    }

    #[test]
    fn test_unknown_proxy_set_poisons() {
        let registry = TypeRegistry::new();
        let wire = TypeDescriptor::proxy(vec!["Closeable".to_string()], None);
        let bound = bind(wire, &registry, 0);
        assert!(matches!(
            bound.resolve_error.as_deref(),
            Some(ResolveError::UnknownProxy { .. })
        ));
    }
}
