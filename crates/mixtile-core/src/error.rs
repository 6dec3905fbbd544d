//! Error types for precision-tagged arrays and their buffers.

use core::fmt;
use thiserror::Error;

use crate::Precision;

/// Errors raised by array, buffer and promoter operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Requested placement or capability is not available in this build/context.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// What was requested and why it is unavailable
        reason: String,
    },

    /// Dimension products, tile grids or square-only inputs do not line up.
    #[error("Invalid shape: {reason}")]
    Shape {
        /// Description of the shape error
        reason: String,
    },

    /// Index outside the declared extents.
    #[error("Index out of bounds: {index} >= {len}")]
    Bounds {
        /// Offending index (flattened or per-axis)
        index: usize,
        /// Extent that was exceeded
        len: usize,
    },

    /// An opaque handle did not hold the expected object kind.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    Type {
        /// Kind that was expected
        expected: &'static str,
        /// Kind that was found
        actual: &'static str,
    },

    /// Elimination hit a zero pivot.
    #[error("Singular matrix: pivot at index {index} is zero")]
    Singularity {
        /// Row of the zero pivot
        index: usize,
    },

    /// More operands were inserted than the promoter was sized for.
    #[error("Promoter capacity exceeded: capacity is {capacity}")]
    Capacity {
        /// Fixed operand capacity
        capacity: usize,
    },

    /// A serialized stream is malformed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unrecognized textual or integer precision code.
    #[error("Unknown precision: {0}")]
    UnknownPrecision(String),
}

impl Error {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Error::Shape {
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Recoverable condition: operand lengths are not multiples of each other.
///
/// The operation still ran, reusing the shorter operand cyclically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatchWarning {
    /// Length of the longer operand
    pub longer: usize,
    /// Length of the shorter operand
    pub shorter: usize,
}

impl fmt::Display for SizeMismatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "longer object length {} is not a multiple of shorter object length {}",
            self.longer, self.shorter
        )
    }
}

/// Result of an operation that may also carry a [`SizeMismatchWarning`].
#[derive(Debug)]
pub struct Checked<T> {
    /// The computed value
    pub value: T,
    /// Set when operand lengths were incompatible multiples
    pub warning: Option<SizeMismatchWarning>,
}

impl<T> Checked<T> {
    /// Drop the warning and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Precision pair used in conversion diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Precision before the conversion
    pub from: Precision,
    /// Precision after the conversion
    pub to: Precision,
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
