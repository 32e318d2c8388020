//! # tangent-sparsity
//!
//! Sparsity patterns and the structural matrix algebra for the tangent
//! expression-graph engine.
//!
//! This crate provides:
//! - [`Sparsity`]: immutable compressed-column (CCS) patterns with cheap,
//!   shared clones
//! - Concatenation, splitting, block-diagonal embedding, transposition and
//!   reshaping, each reporting where every resulting nonzero comes from
//! - Structural matrix products and the enumeration of the scalar products
//!   they need
//! - [`SparsityInterface`]: the algebra written once and shared by every
//!   matrix type that supplies the primitives
//!
//! ## Design Principles
//!
//! - **Structure before values**: every pattern is derived from index lists
//!   alone, before any number is touched
//! - **Eager validation**: shapes and offsets are checked before anything
//!   is built

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod concat;
pub mod error;
pub mod interface;
pub mod pattern;
pub mod product;

pub use concat::{check_offsets, stride_offsets, SplitPiece};
pub use error::SparsityError;
pub use interface::SparsityInterface;
pub use pattern::{NzRef, Sparsity};
pub use product::ProductTerm;

#[cfg(test)]
mod proptests;
