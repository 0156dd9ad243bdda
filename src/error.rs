//! Error types for checkpoint encode/decode.
//!
//! All protocol errors are fatal: they abort the current operation and no
//! partially decoded model is ever returned. Unknown trailing optional
//! fields are *not* errors — they are skipped (see
//! [`FieldSource::skip_optional_field`](crate::io::field::FieldSource)) —
//! but a count that disagrees with what is actually present is fatal.

use thiserror::Error;

use crate::model::tree::TreeValidationError;
use crate::version::Version;

/// Errors that can occur while encoding a model.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The header declared a different tree count than the model holds.
    #[error("model declares {declared} trees but contains {actual}")]
    TreeCountMismatch { declared: u64, actual: u64 },
}

/// Errors that can occur while decoding a checkpoint.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream ended before the current field was complete.
    #[error("checkpoint truncated: {expected} more bytes expected")]
    Truncated { expected: usize },

    /// The frame sequence ended before the artifact was complete.
    #[error("checkpoint truncated: no frames left")]
    ExhaustedFrames,

    /// Writer and reader disagree on a field's layout descriptor.
    #[error("field layout mismatch: expected {expected}, found {found}")]
    LayoutMismatch { expected: String, found: String },

    /// A declared element count disagrees with what was decoded.
    #[error("declared {declared} {what} but decoded {actual}")]
    CountMismatch {
        what: &'static str,
        declared: u64,
        actual: u64,
    },

    /// The checkpoint was written by an incompatible library version.
    #[error(
        "cannot load checkpoint from version {stored}; current version is {current} \
         (only {major}.x checkpoints and the 3.9 legacy checkpoint are readable)",
        major = .current.major
    )]
    UnsupportedVersion { stored: Version, current: Version },

    /// A wire tag does not map to any known enum variant.
    #[error("invalid {field} tag: {value}")]
    InvalidField { field: &'static str, value: u64 },

    /// The (threshold, leaf output) type combination is not supported.
    #[error("unsupported type pair: threshold {threshold}, leaf output {leaf_output}")]
    UnsupportedTypePair {
        threshold: crate::model::TypeInfo,
        leaf_output: crate::model::TypeInfo,
    },

    /// A textual task-type code was not recognized.
    #[error("unknown task type code: {0:?}")]
    UnknownTaskType(String),

    /// A decoded tree violates a structural invariant.
    #[error("tree invariant violated: {0}")]
    Invariant(#[from] TreeValidationError),

    /// Migrating a legacy checkpoint to the current model is unresolved.
    #[error(
        "migrating a version {stored} legacy checkpoint is not yet supported: \
         the legacy task type and parameter records have no defined mapping \
         onto the current model"
    )]
    LegacyMigration { stored: Version },

    /// A field was present but its content could not be interpreted.
    #[error("corrupt field: {0}")]
    CorruptField(String),
}
