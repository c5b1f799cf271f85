//! Name-to-type resolution.
//!
//! The [`TypeRegistry`] is the one piece of engine state shared across
//! streams: it maps wire-level type names to local descriptors, hook
//! implementations, and enum constants. Streams hold it behind `Arc` and
//! only ever read it, so a `parking_lot::RwLock` keeps registration cheap
//! and resolution contention-free.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::hooks::{DecodeHook, EncodeHook};
use crate::value::{EnumValue, Value};

use super::TypeDescriptor;

/// A registered local type: its descriptor plus everything resolution needs
/// that the descriptor itself does not carry.
pub struct RegisteredType {
    descriptor: Arc<TypeDescriptor>,
    enum_constants: Vec<String>,
    encode_hook: Option<Arc<dyn EncodeHook>>,
    decode_hook: Option<Arc<dyn DecodeHook>>,
}

impl RegisteredType {
    /// The local descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Valid constant names, non-empty only for enums.
    #[inline]
    #[must_use]
    pub fn enum_constants(&self) -> &[String] {
        &self.enum_constants
    }

    /// The encode hook, present when the descriptor claims one.
    #[inline]
    #[must_use]
    pub fn encode_hook(&self) -> Option<&Arc<dyn EncodeHook>> {
        self.encode_hook.as_ref()
    }

    /// The decode hook, present when the descriptor claims one.
    #[inline]
    #[must_use]
    pub fn decode_hook(&self) -> Option<&Arc<dyn DecodeHook>> {
        self.decode_hook.as_ref()
    }

    /// True when `constant` is a valid constant of this enum.
    #[must_use]
    pub fn has_constant(&self, constant: &str) -> bool {
        self.enum_constants.iter().any(|c| c == constant)
    }
}

impl std::fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredType")
            .field("name", &self.descriptor.name())
            .field("flags", &format_args!("{:#04x}", self.descriptor.flags()))
            .field("enum_constants", &self.enum_constants.len())
            .field("encode_hook", &self.encode_hook.is_some())
            .field("decode_hook", &self.decode_hook.is_some())
            .finish()
    }
}

/// One registration request: a descriptor plus optional hooks and constants.
///
/// # Examples
///
/// ```rust
/// use object_graph_core::descriptor::{TypeDescriptor, TypeRegistration, TypeRegistry};
///
/// let registry = TypeRegistry::new();
/// let color = TypeDescriptor::enumeration("Color");
/// registry
///     .register(TypeRegistration::new(color).with_constants(["RED", "GREEN", "BLUE"]))
///     .unwrap();
///
/// let value = registry.enum_value("Color", "GREEN").unwrap();
/// assert_eq!(value.as_enum().unwrap().constant(), "GREEN");
/// ```
pub struct TypeRegistration {
    descriptor: Arc<TypeDescriptor>,
    enum_constants: Vec<String>,
    encode_hook: Option<Arc<dyn EncodeHook>>,
    decode_hook: Option<Arc<dyn DecodeHook>>,
}

impl TypeRegistration {
    /// Start a registration for `descriptor`.
    #[must_use]
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            descriptor,
            enum_constants: Vec::new(),
            encode_hook: None,
            decode_hook: None,
        }
    }

    /// Attach the encode hook.
    #[must_use]
    pub fn with_encode_hook(mut self, hook: Arc<dyn EncodeHook>) -> Self {
        self.encode_hook = Some(hook);
        self
    }

    /// Attach the decode hook.
    #[must_use]
    pub fn with_decode_hook(mut self, hook: Arc<dyn DecodeHook>) -> Self {
        self.decode_hook = Some(hook);
        self
    }

    /// Attach the enum constant list.
    #[must_use]
    pub fn with_constants<I, S>(mut self, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_constants = constants.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> CoreResult<()> {
        let desc = &self.descriptor;
        let type_name = desc.name().to_string();

        if desc.is_enum() {
            if self.enum_constants.is_empty() {
                return Err(CoreError::InvalidDescriptor {
                    type_name,
                    details: "enum registration requires at least one constant".to_string(),
                });
            }
            if self.encode_hook.is_some() || self.decode_hook.is_some() {
                return Err(CoreError::HookMismatch {
                    type_name,
                    details: "enums are encoded as constant names and take no hooks",
                });
            }
            return Ok(());
        }

        if !self.enum_constants.is_empty() {
            return Err(CoreError::InvalidDescriptor {
                type_name,
                details: "constants are only valid on enum descriptors".to_string(),
            });
        }

        if desc.is_external() {
            if desc.has_custom_encode() || desc.has_custom_decode() {
                return Err(CoreError::HookMismatch {
                    type_name,
                    details: "external types use the external hook pair, not per-level custom flags",
                });
            }
            if self.encode_hook.is_none() || self.decode_hook.is_none() {
                return Err(CoreError::HookMismatch {
                    type_name,
                    details: "external types require both an encode and a decode hook",
                });
            }
            return Ok(());
        }

        if desc.has_custom_encode() != self.encode_hook.is_some() {
            return Err(CoreError::HookMismatch {
                type_name,
                details: "the custom-encode flag and the encode hook must be supplied together",
            });
        }
        if desc.has_custom_decode() != self.decode_hook.is_some() {
            return Err(CoreError::HookMismatch {
                type_name,
                details: "the custom-decode flag and the decode hook must be supplied together",
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<RegisteredType>>,
    // Proxy bindings keyed by their sorted interface list.
    proxies: HashMap<Vec<String>, Arc<RegisteredType>>,
}

/// Thread-safe name-to-type resolution shared by any number of streams.
///
/// Registration is write-once per name: replacing a live registration would
/// silently change the meaning of descriptors already handed out.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ordinary or enum type under its descriptor name.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateType`] if the name is already taken
    /// - [`CoreError::InvalidDescriptor`] for proxy descriptors (use
    ///   [`TypeRegistry::register_proxy`]) or contradictory constants
    /// - [`CoreError::HookMismatch`] if hooks and capability flags disagree
    pub fn register(&self, registration: TypeRegistration) -> CoreResult<()> {
        if registration.descriptor.is_proxy() {
            return Err(CoreError::InvalidDescriptor {
                type_name: registration.descriptor.name().to_string(),
                details: "proxy descriptors are registered by interface list".to_string(),
            });
        }
        registration.validate()?;

        let name = registration.descriptor.name().to_string();
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&name) {
            return Err(CoreError::DuplicateType { name });
        }
        inner.by_name.insert(
            name.clone(),
            Arc::new(RegisteredType {
                descriptor: registration.descriptor,
                enum_constants: registration.enum_constants,
                encode_hook: registration.encode_hook,
                decode_hook: registration.decode_hook,
            }),
        );
        debug!(type_name = %name, "registered type");
        Ok(())
    }

    /// Register a proxy binding, keyed by its interface list (order does not
    /// matter).
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidDescriptor`] if the descriptor is not a proxy
    ///   or the interface list is empty
    /// - [`CoreError::DuplicateType`] if the interface set is already bound
    pub fn register_proxy(&self, registration: TypeRegistration) -> CoreResult<()> {
        let desc = &registration.descriptor;
        if !desc.is_proxy() {
            return Err(CoreError::InvalidDescriptor {
                type_name: desc.name().to_string(),
                details: "register_proxy requires a proxy descriptor".to_string(),
            });
        }
        if desc.proxy_interfaces().is_empty() {
            return Err(CoreError::InvalidDescriptor {
                type_name: desc.name().to_string(),
                details: "proxy descriptors require at least one interface".to_string(),
            });
        }

        let mut key: Vec<String> = desc.proxy_interfaces().to_vec();
        key.sort();

        let mut inner = self.inner.write();
        if inner.proxies.contains_key(&key) {
            return Err(CoreError::DuplicateType {
                name: desc.name().to_string(),
            });
        }
        debug!(interfaces = ?key, "registered proxy binding");
        inner.proxies.insert(
            key,
            Arc::new(RegisteredType {
                descriptor: Arc::clone(desc),
                enum_constants: Vec::new(),
                encode_hook: registration.encode_hook,
                decode_hook: registration.decode_hook,
            }),
        );
        Ok(())
    }

    /// Resolve a type name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredType>> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Resolve a proxy interface set (order does not matter).
    #[must_use]
    pub fn resolve_proxy(&self, interfaces: &[String]) -> Option<Arc<RegisteredType>> {
        let mut key = interfaces.to_vec();
        key.sort();
        self.inner.read().proxies.get(&key).cloned()
    }

    /// True when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Number of registered names (proxy bindings not included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }

    /// Construct a checked enum value.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotRegistered`] if `type_name` is unknown
    /// - [`CoreError::NotAnEnum`] if the type is not an enum
    /// - [`CoreError::UnknownConstant`] if the constant is not declared
    pub fn enum_value(&self, type_name: &str, constant: &str) -> CoreResult<Value> {
        let registered = self.get(type_name).ok_or_else(|| CoreError::NotRegistered {
            name: type_name.to_string(),
        })?;
        if !registered.descriptor().is_enum() {
            return Err(CoreError::NotAnEnum {
                type_name: type_name.to_string(),
            });
        }
        if !registered.has_constant(constant) {
            return Err(CoreError::UnknownConstant {
                type_name: type_name.to_string(),
                constant: constant.to_string(),
            });
        }
        Ok(Value::Enum(Rc::new(EnumValue::new(
            Arc::clone(registered.descriptor()),
            constant,
        ))))
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TypeRegistry")
            .field("types", &inner.by_name.len())
            .field("proxies", &inner.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PrimKind;

    fn node_desc() -> Arc<TypeDescriptor> {
        TypeDescriptor::builder("Node")
            .prim_field("id", PrimKind::I32)
            .ref_field("next")
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = TypeRegistry::new();
        registry.register(TypeRegistration::new(node_desc())).unwrap();
        assert!(registry.contains("Node"));
        assert_eq!(registry.len(), 1);
        let resolved = registry.get("Node").unwrap();
        assert_eq!(resolved.descriptor().name(), "Node");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = TypeRegistry::new();
        registry.register(TypeRegistration::new(node_desc())).unwrap();
        let err = registry
            .register(TypeRegistration::new(node_desc()))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateType { .. }));
    }

    #[test]
    fn test_custom_flag_without_hook_rejected() {
        let desc = TypeDescriptor::builder("Custom")
            .ref_field("payload")
            .custom_encode()
            .build()
            .unwrap();
        let registry = TypeRegistry::new();
        let err = registry.register(TypeRegistration::new(desc)).unwrap_err();
        assert!(matches!(err, CoreError::HookMismatch { .. }));
    }

    #[test]
    fn test_enum_requires_constants() {
        let registry = TypeRegistry::new();
        let err = registry
            .register(TypeRegistration::new(TypeDescriptor::enumeration("Empty")))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_enum_value_checked() {
        let registry = TypeRegistry::new();
        registry
            .register(
                TypeRegistration::new(TypeDescriptor::enumeration("Color"))
                    .with_constants(["RED", "GREEN"]),
            )
            .unwrap();

        assert!(registry.enum_value("Color", "RED").is_ok());
        assert!(matches!(
            registry.enum_value("Color", "MAUVE").unwrap_err(),
            CoreError::UnknownConstant { .. }
        ));
        assert!(matches!(
            registry.enum_value("Ghost", "RED").unwrap_err(),
            CoreError::NotRegistered { .. }
        ));
    }

    #[test]
    fn test_proxy_resolution_ignores_order() {
        let registry = TypeRegistry::new();
        let desc = TypeDescriptor::proxy(
            vec!["Flushable".to_string(), "Closeable".to_string()],
            None,
        );
        registry.register_proxy(TypeRegistration::new(desc)).unwrap();

        let found = registry
            .resolve_proxy(&["Closeable".to_string(), "Flushable".to_string()])
            .unwrap();
        assert!(found.descriptor().is_proxy());
        assert!(registry.resolve_proxy(&["Closeable".to_string()]).is_none());
    }

    #[test]
    fn test_proxy_via_register_rejected() {
        let registry = TypeRegistry::new();
        let desc = TypeDescriptor::proxy(vec!["Closeable".to_string()], None);
        let err = registry.register(TypeRegistration::new(desc)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor { .. }));
    }
}
