//! Object Graph Stream Library
//!
//! The wire format for the object-graph serialization engine: a compact,
//! self-describing binary stream that preserves value identity, survives
//! cyclic graphs, and absorbs type evolution between peers.
//!
//! # Architecture
//!
//! This crate provides:
//! - [`Encoder`]: walks a value graph and emits tagged entities, sharing
//!   every repeated entity through a handle table
//! - [`Decoder`]: reconstructs the graph, binding wire descriptors to
//!   local registrations and localizing resolution failures per handle
//! - `wire`: tag and kind constants of the format
//! - `frame`: block framing for custom hook payloads
//! - `mutf8`: the modified UTF-8 text encoding used for names and strings
//!
//! Handle numbering is symmetric: both sides assign handles to entities in
//! stream order, so a back-reference is just "entity number N again".
//! Descriptors travel in the stream itself, which is what lets a decoder
//! skip or remap data for types that changed shape locally.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use object_graph_core::{
//!     PrimKind, PrimValue, TypeDescriptor, TypeRegistration, TypeRegistry, Value,
//! };
//! use object_graph_stream::{Decoder, Encoder};
//!
//! let desc = TypeDescriptor::builder("geo.Point")
//!     .prim_field("x", PrimKind::I32)
//!     .prim_field("y", PrimKind::I32)
//!     .build()?;
//! let registry = Arc::new(TypeRegistry::new());
//! registry.register(TypeRegistration::new(Arc::clone(&desc)))?;
//!
//! let point = Value::record(Arc::clone(&desc));
//! if let Value::Record(record) = &point {
//!     record.borrow_mut().set("x", Value::from(3i32))?;
//!     record.borrow_mut().set("y", Value::from(4i32))?;
//! }
//!
//! let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry))?;
//! encoder.write_value(&point)?;
//! let bytes = encoder.finish()?;
//!
//! let mut decoder = Decoder::new(Cursor::new(bytes), registry)?;
//! let decoded = decoder.read_value()?;
//! if let Value::Record(record) = &decoded {
//!     let x = record.borrow().get("x")?;
//!     assert!(matches!(x, Value::Prim(p) if p == PrimValue::I32(3)));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod mutf8;
pub mod wire;

mod binding;
mod handles;
mod validation;

// Re-exports for convenience
pub use decoder::Decoder;
pub use encoder::Encoder;
