//! Errors raised by the structural algebra.
//!
//! Every structural operation validates its arguments before building
//! anything, so a returned error never leaves a half-built pattern behind.

use thiserror::Error;

/// Errors that can occur while building or combining sparsity patterns.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SparsityError {
    /// Operands have incompatible shapes, or split offsets do not fit the
    /// dimension being split.
    #[error("dimension mismatch in {op}: {detail}")]
    DimensionMismatch {
        /// The operation that rejected its operands.
        op: &'static str,
        /// What did not match.
        detail: String,
    },

    /// An argument is malformed independently of any shape, e.g. a zero
    /// stride or an empty list where one element is required.
    #[error("invalid argument to {op}: {detail}")]
    InvalidArgument {
        /// The operation that rejected its argument.
        op: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// A pattern produced by this crate broke the compressed-column
    /// invariants. This is a defect, not bad input.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl SparsityError {
    pub(crate) fn dimension(op: &'static str, detail: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(op: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }
}
