//! Error types for the codec crate.

use crate::value::StorageType;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting between Rust values and
/// engine storage classes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value had a different storage class than the one required.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The Rust type or storage class that was expected.
        expected: &'static str,
        /// The storage class actually found.
        found: StorageType,
    },

    /// An integer did not fit the target Rust type.
    #[error("integer {value} out of range for {target}")]
    OutOfRange {
        /// The stored integer.
        value: i64,
        /// Name of the target type.
        target: &'static str,
    },

    /// REAL values must be finite to be rendered as SQL literals.
    #[error("non-finite REAL value cannot be used as a literal")]
    NonFiniteReal,

    /// A value was missing where one was required.
    #[error("missing value for field {field}")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },
}

impl CodecError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: StorageType) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
