//! Graph-level forward differentiation.
//!
//! Derivatives are taken in nonzero coordinates: the Jacobian of an
//! expression `e` with respect to an input `x` is the
//! `nnz(e) × nnz(x)` matrix `∂vecnz(e)/∂vecnz(x)`. Each node turns the
//! Jacobians of its operands into its own with the chain rule, building
//! new expressions; no number is computed.

use log::trace;
use smallvec::smallvec;
use tangent_sparsity::{NzRef, Sparsity, SparsityInterface};

use crate::error::ExprError;
use crate::mx::MX;
use crate::node::{Operation, StructuralKind};
use crate::registry::registry;

impl MX {
    /// Applies the chain rule at this node.
    ///
    /// `jac[i]` is the Jacobian of operand `i`, of shape
    /// `nnz(operand) × n`. Returns the node's Jacobian, of shape
    /// `nnz(self) × n`. Operands whose Jacobian has no nonzero are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::UnsupportedOperation`] for elementwise
    /// operations without a symbolic rule, [`ExprError::InvalidArgument`] if
    /// the number of Jacobians does not match the operands, and dimension
    /// errors if a Jacobian has the wrong shape.
    pub fn ad_forward(&self, jac: &[MX], n: usize) -> Result<MX, ExprError> {
        if jac.len() != self.n_dep() {
            return Err(ExprError::InvalidArgument(format!(
                "{} takes {} operand jacobians, got {}",
                self.op().name(),
                self.n_dep(),
                jac.len()
            )));
        }
        let rows = self.nnz();
        trace!("ad_forward {} -> {rows}x{n}", self.op().name());

        let terms = match self.op() {
            Operation::Symbol { .. } | Operation::Constant { .. } => Vec::new(),
            Operation::Unary(op) | Operation::Binary(op) => {
                let rule = registry()
                    .info(*op)
                    .graph_rule
                    .ok_or_else(|| ExprError::UnsupportedOperation(op.to_string()))?;
                let x = self.dep(0);
                let y = self.deps().get(1).unwrap_or(x);
                let partials = rule(x, y, self)?;

                let mut terms = Vec::with_capacity(self.n_dep());
                for ((dep, partial), j) in self.deps().iter().zip(&partials).zip(jac) {
                    if j.nnz() == 0 {
                        continue;
                    }
                    terms.push(self.elementwise_term(dep, partial, j)?);
                }
                terms
            }
            Operation::Gather { sources, .. } => {
                let mut terms = Vec::new();
                for (i, (dep, j)) in self.deps().iter().zip(jac).enumerate() {
                    if j.nnz() == 0 {
                        continue;
                    }
                    let (ks, nzs): (Vec<usize>, Vec<usize>) = sources
                        .iter()
                        .enumerate()
                        .filter_map(|(k, src)| src.filter(|s| s.item == i).map(|s| (k, s.nz)))
                        .unzip();
                    let (selection, _) = Sparsity::triplet(rows, dep.nnz(), &ks, &nzs)?;
                    terms.push(MX::filled(selection, 1.0).mtimes(j)?);
                }
                terms
            }
            Operation::Mtimes { terms: products, masked } => {
                let (x, y) = (self.dep(0), self.dep(1));
                let mut terms = Vec::new();
                // ∂out[t.out] = y[t.y] ∂x[t.x] + x[t.x] ∂y[t.y]
                if jac[0].nnz() > 0 {
                    let outs: Vec<usize> = products.iter().map(|t| t.out).collect();
                    let xs: Vec<usize> = products.iter().map(|t| t.x).collect();
                    let (pattern, slots) = Sparsity::triplet(rows, x.nnz(), &outs, &xs)?;
                    let mut sources = vec![None; pattern.nnz()];
                    for (t, &slot) in products.iter().zip(&slots) {
                        sources[slot] = Some(NzRef::new(0, t.y));
                    }
                    let coeff = MX::gather(StructuralKind::Embed, smallvec![y.clone()], pattern, sources);
                    terms.push(coeff.mtimes(&jac[0])?);
                }
                if jac[1].nnz() > 0 {
                    let outs: Vec<usize> = products.iter().map(|t| t.out).collect();
                    let ys: Vec<usize> = products.iter().map(|t| t.y).collect();
                    let (pattern, slots) = Sparsity::triplet(rows, y.nnz(), &outs, &ys)?;
                    let mut sources = vec![None; pattern.nnz()];
                    for (t, &slot) in products.iter().zip(&slots) {
                        sources[slot] = Some(NzRef::new(0, t.x));
                    }
                    let coeff = MX::gather(StructuralKind::Embed, smallvec![x.clone()], pattern, sources);
                    terms.push(coeff.mtimes(&jac[1])?);
                }
                if *masked && jac[2].nnz() > 0 {
                    terms.push(jac[2].clone());
                }
                terms
            }
        };

        sum(terms, rows, n)
    }

    /// Contribution of one elementwise operand: `diag(partial) * jac`, or
    /// `partial * jac` as a column when the operand is broadcast.
    fn elementwise_term(&self, dep: &MX, partial: &MX, jac: &MX) -> Result<MX, ExprError> {
        let p = broadcast(partial, self.sparsity())?;
        if dep.nnz() == 1 && self.nnz() != 1 {
            return p.vecnz().mtimes(jac);
        }
        let n = self.nnz();
        let sources = (0..n).map(|k| Some(NzRef::new(0, k))).collect();
        let diag = MX::gather(StructuralKind::Embed, smallvec![p], Sparsity::diag(n), sources);
        diag.mtimes(jac)
    }
}

/// Places `p` on `sparsity`: replicated if it is a scalar, projected
/// otherwise.
fn broadcast(p: &MX, sparsity: &Sparsity) -> Result<MX, ExprError> {
    if p.sparsity() == sparsity {
        return Ok(p.clone());
    }
    if p.is_scalar() && p.nnz() == 1 {
        let sources = vec![Some(NzRef::new(0, 0)); sparsity.nnz()];
        return Ok(MX::gather(
            StructuralKind::Embed,
            smallvec![p.clone()],
            sparsity.clone(),
            sources,
        ));
    }
    p.project(sparsity)
}

fn sum(terms: Vec<MX>, nrow: usize, ncol: usize) -> Result<MX, ExprError> {
    let mut terms = terms.into_iter();
    let Some(first) = terms.next() else {
        return Ok(MX::zeros(nrow, ncol));
    };
    terms.try_fold(first, |acc, term| acc.add(&term))
}
