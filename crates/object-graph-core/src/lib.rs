//! Object Graph Core Library
//!
//! Provides the domain model shared by every part of the object-graph
//! serialization engine: runtime values, type descriptors, the type
//! registry, custom-hook traits, error types, and stream configuration.
//!
//! # Architecture
//!
//! This crate defines:
//! - Runtime values (`Value`, `RecordValue`, `ArrayValue`, `EnumValue`)
//! - Type metadata (`TypeDescriptor`, `FieldSpec`, `TypeRegistry`)
//! - Hook traits for custom per-type encoding (`EncodeHook`, `DecodeHook`)
//! - Error types and result aliases
//! - Configuration structures
//!
//! The wire format itself lives in `object-graph-stream`; nothing in this
//! crate performs I/O.
//!
//! # Example
//!
//! ```
//! use object_graph_core::descriptor::TypeDescriptor;
//! use object_graph_core::value::{PrimKind, PrimValue, RecordValue, Value};
//!
//! let desc = TypeDescriptor::builder("Point")
//!     .prim_field("x", PrimKind::I32)
//!     .prim_field("y", PrimKind::I32)
//!     .build()
//!     .unwrap();
//!
//! let mut point = RecordValue::new(desc);
//! point.set("x", Value::from(3i32)).unwrap();
//! point.set("y", Value::from(4i32)).unwrap();
//! assert!(matches!(point.get("x").unwrap(), Value::Prim(p) if p == PrimValue::I32(3)));
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod value;

// Re-exports for convenience
pub use config::StreamConfig;
pub use descriptor::{
    FieldKind, FieldSpec, RegisteredType, TypeDescriptor, TypeDescriptorBuilder, TypeRegistration,
    TypeRegistry,
};
pub use error::{CoreError, CoreResult, ResolveError, StreamError, StreamResult};
pub use hooks::{DecodeContext, DecodeHook, EncodeContext, EncodeHook, ValidationCallback};
pub use value::{ArrayValue, EnumValue, PrimKind, PrimValue, RecordValue, Value};
