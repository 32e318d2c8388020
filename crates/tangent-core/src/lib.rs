//! # tangent-core
//!
//! Expression graphs over sparse matrices.
//!
//! This crate provides:
//! - [`MX`]: a shared, immutable handle to an expression node
//! - The closed [`Operation`] catalog and the [`OpCode`] registry holding
//!   numeric evaluators, partial derivatives and zero-preservation flags
//! - Per-node primal, forward and adjoint evaluation on nonzeros
//! - Graph-level forward differentiation ([`MX::ad_forward`])
//! - [`ExprCache`]: opt-in canonicalization of identical subexpressions
//!
//! ## Design Principles
//!
//! - **Structure first**: every node's sparsity is fixed when it is built;
//!   evaluation only touches structural nonzeros
//! - **Sharing by identity**: a subexpression used twice is one node, and
//!   node identity is pointer identity
//! - **No hidden densification**: an operand is densified only when the
//!   operation would otherwise produce a wrong, too sparse result

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod derivative;
pub mod display;
pub mod error;
pub mod eval;
pub mod mx;
pub mod node;
pub mod opcode;
pub mod registry;
pub mod structural;

pub use cache::ExprCache;
pub use error::ExprError;
pub use mx::MX;
pub use node::{Node, Operation, StructuralKind};
pub use opcode::OpCode;
pub use registry::{registry, OpInfo, OpRegistry};

pub use tangent_sparsity::{Sparsity, SparsityInterface};

#[cfg(test)]
mod proptests;
