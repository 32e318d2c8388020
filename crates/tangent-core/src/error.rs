//! Errors raised while building expressions.

use tangent_sparsity::SparsityError;
use thiserror::Error;

/// Errors that can occur while building expression nodes or expanding
/// derivatives symbolically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    /// A structural operation on the operands' patterns failed.
    #[error(transparent)]
    Sparsity(#[from] SparsityError),

    /// Elementwise operands whose shapes cannot be combined.
    #[error("dimension mismatch in {op}: {detail}")]
    DimensionMismatch {
        /// The operation that rejected its operands.
        op: &'static str,
        /// What did not match.
        detail: String,
    },

    /// A graph-level derivative was requested for an operation that has no
    /// symbolic chain rule.
    #[error("operation '{0}' has no symbolic derivative rule")]
    UnsupportedOperation(String),

    /// A malformed argument, e.g. a value buffer that does not match its
    /// pattern.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
