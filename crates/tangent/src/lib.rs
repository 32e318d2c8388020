//! # Tangent
//!
//! Sparse symbolic expression graphs, compiled into evaluators with
//! forward and adjoint derivatives.
//!
//! ## Features
//!
//! - **Sparsity Algebra**: compressed-column patterns with concatenation,
//!   splitting, products and nonzero mappings
//! - **Expression Graphs**: shared, immutable matrix-valued nodes with
//!   primal, forward and adjoint evaluation rules
//! - **Compiled Functions**: topologically sorted instruction lists,
//!   evaluated with any number of sensitivity directions
//! - **Symbolic Derivatives**: Jacobians, gradients and Hessians as new
//!   expressions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tangent::prelude::*;
//!
//! let x = MX::sym("x", 2, 1);
//! let f = Function::new(vec![x.clone()], vec![x.sin()])?;
//! let out = f.eval(&[&[0.1, 0.2]])?;
//! let jac = f.jacobian(0, 0)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub use tangent_core as core;
pub use tangent_function as function;
pub use tangent_sparsity as sparsity;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tangent_core::{ExprCache, ExprError, OpCode, MX};
    pub use tangent_function::{Evaluation, Function, FunctionError, FunctionOptions, Workspace};
    pub use tangent_sparsity::{Sparsity, SparsityError, SparsityInterface};
}
