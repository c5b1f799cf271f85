//! Handle tables for both stream directions.
//!
//! Every entity an encoder emits is assigned the next handle number, and
//! the matching decoder assigns the same numbers by reading the same
//! sequence, so a handle never travels on the wire except inside a
//! back-reference. The two sides need very different bookkeeping:
//!
//! - [`encode::EncodeHandleTable`] answers "have I written this entity
//!   already" by pointer identity.
//! - [`decode::DecodeHandleTable`] rebuilds entities and tracks which of
//!   them depend on types that failed to resolve, so one broken subtree
//!   poisons exactly the values that reached into it and nothing else.

pub(crate) mod decode;
pub(crate) mod encode;

pub(crate) use decode::{DecodeEntity, DecodeHandleTable};
pub(crate) use encode::{EncodeEntity, EncodeHandleTable};
