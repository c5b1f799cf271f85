//! Error types for object-graph-core.
//!
//! Three error families live here:
//!
//! - [`CoreError`]: construction-time failures (descriptor building, type
//!   registration, value manipulation, configuration). These surface before
//!   any byte touches a stream.
//! - [`ResolveError`]: localized type-resolution failures raised while
//!   decoding. These are shared as `Arc<ResolveError>` so one failure can be
//!   attached cheaply to every handle it contaminates.
//! - [`StreamError`]: everything that can go wrong on an open stream. The
//!   [`StreamError::is_fatal`] split separates "discard this stream" failures
//!   (framing corruption, I/O) from localized ones after which further
//!   top-level records remain readable.
//!
//! # Examples
//!
//! ```rust
//! use object_graph_core::error::{CoreError, StreamError};
//!
//! let err = CoreError::DuplicateType {
//!     name: "Point".to_string(),
//! };
//! assert!(err.to_string().contains("Point"));
//!
//! let fatal = StreamError::BadMagic { found: 0xCAFE };
//! assert!(fatal.is_fatal());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while building descriptors, registering types, or
/// manipulating values. None of these involve an open stream.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A type name was registered twice.
    ///
    /// Registration is write-once per name; replacing a live registration
    /// would silently change the meaning of descriptors already handed out.
    #[error("Type already registered: {name}")]
    DuplicateType {
        /// The colliding type name
        name: String,
    },

    /// Two fields at the same descriptor level share a name.
    #[error("Duplicate field '{field}' in descriptor for {type_name}")]
    DuplicateField {
        /// Type being described
        type_name: String,
        /// The repeated field name
        field: String,
    },

    /// A descriptor's flags and shape contradict each other.
    ///
    /// # When This Occurs
    ///
    /// - Enum descriptor built with fields or a supertype
    /// - Externally-encoded descriptor built with fields
    /// - Proxy descriptor built with an empty interface list
    #[error("Invalid descriptor for {type_name}: {details}")]
    InvalidDescriptor {
        /// Type being described
        type_name: String,
        /// What was contradictory
        details: String,
    },

    /// Registration hooks do not match the descriptor's capability flags.
    ///
    /// The flags are a wire-level contract: a descriptor that claims a
    /// custom encode section must have an encode hook to produce it, and a
    /// hook without the flag would write data the descriptor never admits to.
    #[error("Hook mismatch for {type_name}: {details}")]
    HookMismatch {
        /// Type being registered
        type_name: String,
        /// Which flag/hook pairing was inconsistent
        details: &'static str,
    },

    /// A named field does not exist anywhere in a record's descriptor chain.
    #[error("No field '{field}' on {type_name}")]
    UnknownField {
        /// The record's type name
        type_name: String,
        /// The missing field name
        field: String,
    },

    /// A value was assigned to a field whose declared kind does not accept it.
    #[error("Kind mismatch for {type_name}.{field}: expected {expected}, got {actual}")]
    KindMismatch {
        /// The record's type name
        type_name: String,
        /// Field being assigned
        field: String,
        /// Declared field kind
        expected: String,
        /// Kind of the rejected value
        actual: String,
    },

    /// An enum constant name is not among the registered constants.
    #[error("Enum {type_name} has no constant '{constant}'")]
    UnknownConstant {
        /// The enum type name
        type_name: String,
        /// The unknown constant name
        constant: String,
    },

    /// An enum operation was applied to a type not registered as an enum.
    #[error("Type {type_name} is not an enum")]
    NotAnEnum {
        /// The offending type name
        type_name: String,
    },

    /// A lookup named a type with no registration.
    #[error("Type not registered: {name}")]
    NotRegistered {
        /// The unknown type name
        name: String,
    },

    /// Configuration is invalid.
    ///
    /// # When This Occurs
    ///
    /// - Zero block capacity or recursion limit
    /// - Allocation cap too small to hold a single length header
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A localized type-resolution failure observed while decoding.
///
/// Resolution failures never abort the stream by themselves. The decoder
/// records them against the affected handle and keeps walking structurally;
/// the error is only surfaced to the caller when a returned value
/// transitively depends on the failed handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The wire names a type with no local registration.
    #[error("Unknown type: {name}")]
    UnknownType {
        /// Type name as written on the wire
        name: String,
    },

    /// An enum constant on the wire has no local counterpart.
    #[error("Enum {type_name} has no constant '{constant}'")]
    UnknownEnumConstant {
        /// The enum type name
        type_name: String,
        /// Constant name as written on the wire
        constant: String,
    },

    /// A field exists on both sides under one name but with different kinds.
    #[error("Field kind mismatch for {type_name}.{field}: wire {wire}, local {local}")]
    FieldKindMismatch {
        /// Type whose field disagrees
        type_name: String,
        /// The disagreeing field
        field: String,
        /// Kind according to the wire descriptor
        wire: String,
        /// Kind according to the local descriptor
        local: String,
    },

    /// The wire and local descriptors disagree structurally
    /// (enum vs. record, external vs. field-structured).
    #[error("Incompatible descriptors for {type_name}: {details}")]
    Incompatible {
        /// The disagreeing type name
        type_name: String,
        /// What disagreed
        details: String,
    },

    /// A dynamic-proxy descriptor names an interface set with no local binding.
    #[error("No proxy binding for interfaces [{}]", .interfaces.join(", "))]
    UnknownProxy {
        /// Interface names as written on the wire
        interfaces: Vec<String>,
    },
}

/// Errors raised on an open encode or decode stream.
///
/// The variants follow the stream's failure taxonomy: framing corruption and
/// I/O are fatal, resolution failures are localized and retriable, and
/// [`StreamError::EndOfCustomData`] is a signal hooks use to detect the end
/// of their own data rather than a failure at all.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An underlying byte-channel failure. Always fatal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream does not start with the expected magic constant.
    #[error("Bad stream magic: expected 0x4F47, found {found:#06X}")]
    BadMagic {
        /// The two bytes actually read
        found: u16,
    },

    /// The stream header carries an unsupported format version.
    #[error("Unsupported stream version: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this implementation writes
        expected: u16,
        /// Version found in the header
        found: u16,
    },

    /// A tag byte is not valid at the current position.
    #[error("Invalid tag {tag:#04X} while reading {context}")]
    InvalidTag {
        /// The offending tag byte
        tag: u8,
        /// What the reader was expecting
        context: &'static str,
    },

    /// Structurally inconsistent bytes (bad lengths, truncated entities,
    /// malformed text). Fatal.
    #[error("Corrupt stream while reading {context}: {details}")]
    Corrupt {
        /// Operation that detected the corruption
        context: &'static str,
        /// What was inconsistent
        details: String,
    },

    /// A protocol rule was violated by the caller or the peer
    /// (mode switch with unread block data, reset inside an entity,
    /// back-reference to an unshared slot, misordered handle finish).
    #[error("Protocol violation in {context}: {details}")]
    Protocol {
        /// Operation that detected the violation
        context: &'static str,
        /// The rule that was broken
        details: String,
    },

    /// The byte channel ended in the middle of an entity.
    #[error("Unexpected end of stream while reading {context}")]
    UnexpectedEof {
        /// What was being read when the channel ended
        context: &'static str,
    },

    /// The recursion depth limit was exceeded.
    #[error("Recursion depth limit exceeded: {limit}")]
    DepthLimit {
        /// Configured maximum depth
        limit: usize,
    },

    /// A length prefix demands a larger allocation than the configured cap.
    #[error("Allocation of {requested} exceeds configured limit {limit}")]
    AllocationLimit {
        /// Bytes (or elements) the stream asked for
        requested: u64,
        /// Configured ceiling
        limit: u64,
    },

    /// A localized type-resolution failure reached the caller because the
    /// requested value transitively depends on it.
    #[error("Type resolution failed: {0}")]
    Unresolved(Arc<ResolveError>),

    /// A custom encode or decode hook returned an error.
    #[error("Hook failed for {type_name}: {message}")]
    HookFailed {
        /// Type whose hook failed
        type_name: String,
        /// Message supplied by the hook
        message: String,
    },

    /// A descriptor claims a custom section but no hook is registered to
    /// produce it.
    #[error("No hook registered for {type_name}")]
    HookMissing {
        /// Type missing its hook
        type_name: String,
    },

    /// A decode hook read past the end of its own custom data.
    ///
    /// Signaled distinctly from [`StreamError::UnexpectedEof`] so a hook can
    /// tell "no more custom data" apart from "stream truncated".
    #[error("End of custom data")]
    EndOfCustomData,

    /// The encoding peer aborted a top-level record and wrote a terminal
    /// error marker in its place. Subsequent records remain readable.
    #[error("Peer aborted record: {message}")]
    PeerAborted {
        /// Message carried by the abort record
        message: String,
    },

    /// A deferred validation callback rejected the reconstructed graph.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Message supplied by the callback
        message: String,
    },
}

impl StreamError {
    /// Returns `true` when the stream must be discarded after this error.
    ///
    /// Localized resolution failures, peer aborts, validation rejections,
    /// and the end-of-custom-data signal leave the stream positioned at a
    /// record boundary; everything else does not.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StreamError::Unresolved(_)
                | StreamError::EndOfCustomData
                | StreamError::PeerAborted { .. }
                | StreamError::ValidationFailed { .. }
        )
    }

    /// Shorthand for a hook failure with an owned message.
    pub fn hook(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        StreamError::HookFailed {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl From<Arc<ResolveError>> for StreamError {
    fn from(err: Arc<ResolveError>) -> Self {
        StreamError::Unresolved(err)
    }
}

impl From<ResolveError> for StreamError {
    fn from(err: ResolveError) -> Self {
        StreamError::Unresolved(Arc::new(err))
    }
}

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
