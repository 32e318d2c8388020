//! Opt-in hash-consing of expressions.
//!
//! Expressions built independently are distinct nodes even when they are
//! structurally identical. An [`ExprCache`] canonicalizes them: nodes with
//! the same operation, the same (canonical) operands and the same pattern
//! are mapped to one representative. Symbols are only ever equal to
//! themselves.

use std::sync::Arc;

use hashbrown::HashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tangent_sparsity::{NzRef, Sparsity};

use crate::mx::MX;
use crate::node::{Operation, StructuralKind};
use crate::opcode::OpCode;

#[derive(Clone, PartialEq, Eq, Hash)]
enum OpKey {
    Symbol(usize),
    Constant(Vec<u64>),
    Unary(OpCode),
    Binary(OpCode),
    Gather(StructuralKind, Arc<[Option<NzRef>]>),
    Mtimes(bool),
}

impl OpKey {
    fn of(x: &MX) -> Self {
        match x.op() {
            Operation::Symbol { .. } => OpKey::Symbol(x.id()),
            Operation::Constant { values } => OpKey::Constant(values.iter().map(|v| v.to_bits()).collect()),
            Operation::Unary(op) => OpKey::Unary(*op),
            Operation::Binary(op) => OpKey::Binary(*op),
            Operation::Gather { kind, sources } => OpKey::Gather(*kind, Arc::clone(sources)),
            // The term list is a function of the operand patterns
            Operation::Mtimes { masked, .. } => OpKey::Mtimes(*masked),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    op: OpKey,
    deps: SmallVec<[usize; 2]>,
    sparsity: Sparsity,
}

/// A hash-consing table for expressions.
///
/// The cache keeps every node it has seen alive, so node identities used
/// as keys stay valid for the lifetime of the cache.
#[derive(Default)]
pub struct ExprCache {
    /// Canonical representative of every structural key.
    table: HashMap<NodeKey, MX>,
    /// Original node id to (original, canonical).
    memo: FxHashMap<usize, (MX, MX)>,
}

impl ExprCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of canonical nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no node has been canonicalized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Forgets every node.
    pub fn clear(&mut self) {
        self.table.clear();
        self.memo.clear();
    }

    fn lookup(&self, x: &MX) -> MX {
        self.memo.get(&x.id()).map_or_else(|| x.clone(), |(_, c)| c.clone())
    }

    /// Returns the canonical representative of `expr`.
    ///
    /// Subexpressions are visited in post-order without recursion. A node
    /// is rebuilt only if one of its operands was replaced.
    pub fn canonicalize(&mut self, expr: &MX) -> MX {
        let mut stack = vec![(expr.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if self.memo.contains_key(&node.id()) {
                continue;
            }
            if !expanded {
                stack.push((node.clone(), true));
                for dep in node.deps().iter().rev() {
                    if !self.memo.contains_key(&dep.id()) {
                        stack.push((dep.clone(), false));
                    }
                }
                continue;
            }

            let deps: SmallVec<[MX; 2]> = node.deps().iter().map(|d| self.lookup(d)).collect();
            let key = NodeKey {
                op: OpKey::of(&node),
                deps: deps.iter().map(MX::id).collect(),
                sparsity: node.sparsity().clone(),
            };
            let canonical = if let Some(existing) = self.table.get(&key) {
                existing.clone()
            } else {
                let unchanged = deps.iter().zip(node.deps()).all(|(a, b)| a.is_same(b));
                let rebuilt = if unchanged {
                    node.clone()
                } else {
                    MX::from_node(node.op().clone(), deps, node.sparsity().clone())
                };
                self.table.insert(key, rebuilt.clone());
                rebuilt
            };
            self.memo.insert(node.id(), (node, canonical));
        }
        self.lookup(expr)
    }

    /// Canonicalizes several expressions against the same table.
    pub fn canonicalize_all(&mut self, exprs: &[MX]) -> Vec<MX> {
        exprs.iter().map(|e| self.canonicalize(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_subexpressions_merge() {
        let x = MX::sym("x", 2, 1);
        let a = x.sin().add(&x).unwrap();
        let b = x.sin().add(&x).unwrap();
        assert!(!a.is_same(&b));

        let mut cache = ExprCache::new();
        let ca = cache.canonicalize(&a);
        let cb = cache.canonicalize(&b);
        assert!(ca.is_same(&cb));
        assert!(ca.is_same(&a));
        // x, sin(x), sin(x) + x
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_symbols_never_merge() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym("x", 1, 1);
        let mut cache = ExprCache::new();
        let out = cache.canonicalize_all(&[x.sin(), y.sin()]);
        assert!(!out[0].is_same(&out[1]));
    }

    #[test]
    fn test_rebuilds_parents_of_replaced_nodes() {
        let x = MX::sym("x", 1, 1);
        let s1 = x.exp();
        let s2 = x.exp();
        let e = s1.mul(&s2).unwrap();
        let mut cache = ExprCache::new();
        let c = cache.canonicalize(&e);
        assert!(!c.is_same(&e));
        assert!(c.dep(0).is_same(c.dep(1)));
    }

    #[test]
    fn test_constants_compare_by_value() {
        let x = MX::sym("x", 1, 1);
        let a = x.mul(&MX::scalar(2.0)).unwrap();
        let b = x.mul(&MX::scalar(2.0)).unwrap();
        let c = x.mul(&MX::scalar(3.0)).unwrap();
        let mut cache = ExprCache::new();
        let out = cache.canonicalize_all(&[a, b, c]);
        assert!(out[0].is_same(&out[1]));
        assert!(!out[0].is_same(&out[2]));
    }
}
