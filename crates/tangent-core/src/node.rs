//! Expression node types.
//!
//! A node is one operation applied to a fixed number of operands. Its
//! output sparsity is computed when it is built and never changes; numeric
//! values are written into caller-supplied buffers, one entry per
//! nonzero.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tangent_sparsity::{NzRef, ProductTerm, Sparsity};

use crate::mx::MX;
use crate::opcode::OpCode;

/// The structural operation a [`Operation::Gather`] node stands for.
///
/// Only used for display and by code generators; evaluation depends on the
/// nonzero sources alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructuralKind {
    /// Side-by-side concatenation.
    Horzcat,
    /// Vertical concatenation.
    Vertcat,
    /// One piece of a horizontal split.
    Horzsplit,
    /// One piece of a vertical split.
    Vertsplit,
    /// Block-diagonal embedding.
    Blkdiag,
    /// Transposition.
    Transpose,
    /// Reshape, including `vec` and `vecnz`.
    Reshape,
    /// Projection onto another pattern of the same shape; densification is
    /// the projection onto the dense pattern.
    Project,
    /// Places a vector of nonzeros on the diagonal, or onto any pattern
    /// built for a derivative.
    Embed,
}

impl StructuralKind {
    /// Lower-case name used for display.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StructuralKind::Horzcat => "horzcat",
            StructuralKind::Vertcat => "vertcat",
            StructuralKind::Horzsplit => "horzsplit",
            StructuralKind::Vertsplit => "vertsplit",
            StructuralKind::Blkdiag => "blkdiag",
            StructuralKind::Transpose => "transpose",
            StructuralKind::Reshape => "reshape",
            StructuralKind::Project => "project",
            StructuralKind::Embed => "embed",
        }
    }
}

/// The operation performed by a node.
#[derive(Clone, Debug)]
pub enum Operation {
    // === Leaves ===
    /// A named symbolic input.
    Symbol {
        /// Name used for display.
        name: String,
    },

    /// Fixed values, one per nonzero.
    Constant {
        /// The nonzero values.
        values: Arc<[f64]>,
    },

    // === Elementwise ===
    /// One operand, same pattern as the node.
    Unary(OpCode),

    /// Two operands. Each has either the node's pattern or a single
    /// nonzero that is broadcast over the node's nonzeros.
    Binary(OpCode),

    // === Structural ===
    /// Every output nonzero copies one operand nonzero, or is an explicit
    /// zero (`None`).
    Gather {
        /// The structural operation this node implements.
        kind: StructuralKind,
        /// Source of every output nonzero.
        sources: Arc<[Option<NzRef>]>,
    },

    // === Linear algebra ===
    /// Matrix product `x * y`, or `z + x * y` restricted to `z`'s pattern
    /// when `masked` is set (third operand `z`).
    Mtimes {
        /// Scalar products contributing to each output nonzero.
        terms: Arc<[ProductTerm]>,
        /// Whether a third, accumulated operand is present.
        masked: bool,
    },
}

impl Operation {
    /// Number of operands this operation takes.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            Operation::Symbol { .. } | Operation::Constant { .. } => Some(0),
            Operation::Unary(_) => Some(1),
            Operation::Binary(_) => Some(2),
            Operation::Mtimes { masked, .. } => Some(if *masked { 3 } else { 2 }),
            // Concatenations take any number of operands
            Operation::Gather { .. } => None,
        }
    }

    /// Short name of the operation.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Operation::Symbol { name } => name.clone(),
            Operation::Constant { .. } => "const".to_string(),
            Operation::Unary(op) | Operation::Binary(op) => op.to_string(),
            Operation::Gather { kind, .. } => kind.name().to_string(),
            Operation::Mtimes { masked: false, .. } => "mtimes".to_string(),
            Operation::Mtimes { masked: true, .. } => "mtimes_add".to_string(),
        }
    }
}

/// One node of the expression graph.
///
/// Nodes are immutable after construction and shared through [`MX`]
/// handles.
pub struct Node {
    pub(crate) op: Operation,
    pub(crate) deps: SmallVec<[MX; 2]>,
    pub(crate) sparsity: Sparsity,
}

impl Node {
    /// The operation performed.
    #[must_use]
    pub fn op(&self) -> &Operation {
        &self.op
    }

    /// The operands, in order.
    #[must_use]
    pub fn deps(&self) -> &[MX] {
        &self.deps
    }

    /// The output sparsity.
    #[must_use]
    pub fn sparsity(&self) -> &Sparsity {
        &self.sparsity
    }
}

impl Drop for Node {
    // Unlinks uniquely owned operands iteratively; dropping a long chain
    // recursively would overflow the stack.
    fn drop(&mut self) {
        let mut stack: Vec<MX> = self.deps.drain(..).collect();
        while let Some(dep) = stack.pop() {
            if let Some(mut node) = dep.into_unique_node() {
                stack.extend(node.deps.drain(..));
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op.name())
            .field("n_dep", &self.deps.len())
            .field("sparsity", &format_args!("{}", self.sparsity))
            .finish()
    }
}
