//! Errors raised by function construction and evaluation.

use tangent_core::ExprError;
use tangent_sparsity::SparsityError;
use thiserror::Error;

/// Errors that can occur while compiling, evaluating or differentiating a
/// [`Function`](crate::Function).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FunctionError {
    /// Building an expression failed.
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// The arguments or seeds passed to an evaluation do not match the
    /// declared inputs and outputs. Nothing has been written when this is
    /// returned.
    #[error("argument error: {0}")]
    ArgumentError(String),

    /// A malformed construction or derivative request, e.g. an input that
    /// is not a symbol or an index out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A compiled structure does not match the buffers it drives. This is a
    /// defect, not bad input.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl From<SparsityError> for FunctionError {
    fn from(err: SparsityError) -> Self {
        FunctionError::Expr(ExprError::Sparsity(err))
    }
}
