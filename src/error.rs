//! Error types for configuration, derivative checks and flat-file I/O.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the toolkit.
///
/// A finite-difference operator that fails to converge is *not* an error:
/// it is recorded as a failed comparison in a
/// [`DerivativeReport`](crate::driver::DerivativeReport).
#[derive(Debug, Error)]
pub enum Error {
    /// Operator family tag not present in the constructor table.
    #[error(
        "unknown operator family `{0}` (expected one of qeye, destroy, destroy2, tridiag, td, rand)"
    )]
    UnknownFamily(String),

    /// System kind tag other than `sse` / `sme`.
    #[error("unknown system kind `{0}` (expected `sse` or `sme`)")]
    UnknownSystemKind(String),

    /// Numeric type or number format tag not understood by the file writer.
    #[error("unknown {kind} tag `{tag}`")]
    UnknownFormat {
        /// Which tag was being parsed (`numtype` or `numformat`).
        kind: &'static str,
        /// The rejected value.
        tag: String,
    },

    /// Hilbert-space dimension too small for the requested configuration.
    #[error("invalid dimension {0}: at least 2 levels are required")]
    InvalidDimension(usize),

    /// A cached value on the system disagrees with a direct evaluation.
    #[error("cached `{name}` does not match a direct evaluation at the same point")]
    CacheMismatch {
        /// Accessor name, e.g. `a` or `bi(1)`.
        name: String,
    },

    /// Data file contained no rows.
    #[error("data file contains no numeric rows")]
    EmptyData,

    /// No known column delimiter found in the first data row.
    #[error("unrecognized column delimiter in line `{0}`")]
    UnrecognizedDelimiter(String),

    /// A data row has a different number of columns than the first row.
    #[error("badly formatted data file: row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        /// Zero-based data row index.
        row: usize,
        /// Column count of the first row.
        expected: usize,
        /// Column count of this row.
        found: usize,
    },

    /// An entry could not be parsed as a real or complex number.
    #[error("cannot parse `{0}` as a number")]
    ParseNumber(String),

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a cache mismatch error for the named accessor.
    #[must_use]
    pub fn cache_mismatch(name: impl Into<String>) -> Self {
        Self::CacheMismatch { name: name.into() }
    }
}
