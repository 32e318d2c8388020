//! # tangent-function
//!
//! Compiled, repeatable evaluation of expression graphs.
//!
//! This crate provides:
//! - [`Function`]: inputs and outputs compiled lazily into an
//!   [`Algorithm`], a linear instruction list in dependency order
//! - Primal evaluation together with any number of forward (tangent) and
//!   adjoint (gradient) directions in one call
//! - Caller-owned [`Workspace`]s and parallel batch evaluation with rayon
//! - Symbolic Jacobians, gradients and Hessians, and functions computing
//!   them
//!
//! ## Design Principles
//!
//! - **Compile once, evaluate often**: the graph is sorted once; every
//!   evaluation is a sweep over a flat list
//! - **Validate before writing**: argument and seed buffers are checked
//!   before any output is produced
//! - **Immutable functions**: all scratch state lives in a workspace, so a
//!   function can be shared between threads as is

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod algorithm;
pub mod derivative;
pub mod error;
pub mod function;
pub mod options;
pub mod workspace;

pub use algorithm::{Algorithm, Instruction};
pub use error::FunctionError;
pub use function::{Evaluation, Function};
pub use options::FunctionOptions;
pub use workspace::Workspace;

#[cfg(test)]
mod proptests;
