//! Structural operations on expressions.
//!
//! Every structural operation is a [`Operation::Gather`] node whose output
//! nonzeros copy operand nonzeros. The patterns and the copy lists come from
//! the mapped primitives of `tangent-sparsity`, so `MX` inherits the whole
//! [`SparsityInterface`] algebra by supplying those primitives.

use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use tangent_sparsity::{NzRef, SparsityError, Sparsity, SparsityInterface, SplitPiece};

use crate::error::ExprError;
use crate::mx::MX;
use crate::node::{Operation, StructuralKind};

impl MX {
    pub(crate) fn gather(
        kind: StructuralKind,
        deps: SmallVec<[MX; 2]>,
        sparsity: Sparsity,
        sources: Vec<Option<NzRef>>,
    ) -> MX {
        debug_assert_eq!(sources.len(), sparsity.nnz());
        MX::from_node(
            Operation::Gather {
                kind,
                sources: sources.into(),
            },
            deps,
            sparsity,
        )
    }

    /// Re-expresses the expression on another pattern of the same shape.
    ///
    /// Nonzeros missing from `sparsity` are dropped; new nonzeros are
    /// explicit zeros.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::DimensionMismatch`] if the shapes differ.
    pub fn project(&self, sparsity: &Sparsity) -> Result<MX, ExprError> {
        if self.sparsity().shape() != sparsity.shape() {
            return Err(ExprError::DimensionMismatch {
                op: "project",
                detail: format!("cannot project {} onto {sparsity}", self.sparsity()),
            });
        }
        if self.sparsity() == sparsity {
            return Ok(self.clone());
        }
        let sources = project_sources(self.sparsity(), sparsity);
        Ok(MX::gather(
            StructuralKind::Project,
            smallvec![self.clone()],
            sparsity.clone(),
            sources,
        ))
    }

    /// Projects onto the dense pattern of the same shape.
    #[must_use]
    pub fn densify(&self) -> MX {
        if self.is_dense() {
            return self.clone();
        }
        let dense = Sparsity::dense(self.nrow(), self.ncol());
        let sources = project_sources(self.sparsity(), &dense);
        MX::gather(StructuralKind::Project, smallvec![self.clone()], dense, sources)
    }

    fn split_pieces(&self, kind: StructuralKind, pieces: Vec<SplitPiece>) -> Vec<MX> {
        if pieces.len() == 1 {
            return vec![self.clone()];
        }
        pieces
            .into_iter()
            .map(|(sparsity, mapping)| {
                let sources = mapping.into_iter().map(|nz| Some(NzRef::new(0, nz))).collect();
                MX::gather(kind, smallvec![self.clone()], sparsity, sources)
            })
            .collect()
    }

    fn relabel(&self, sparsity: Sparsity) -> MX {
        if self.sparsity() == &sparsity {
            return self.clone();
        }
        let sources = (0..sparsity.nnz()).map(|nz| Some(NzRef::new(0, nz))).collect();
        MX::gather(StructuralKind::Reshape, smallvec![self.clone()], sparsity, sources)
    }
}

/// For every nonzero of `to`, the nonzero of `from` at the same position.
fn project_sources(from: &Sparsity, to: &Sparsity) -> Vec<Option<NzRef>> {
    let mut sources = Vec::with_capacity(to.nnz());
    for c in 0..to.ncol() {
        let mut k = from.colind()[c];
        let end = from.colind()[c + 1];
        for &r in &to.row()[to.column_range(c)] {
            while k < end && from.row()[k] < r {
                k += 1;
            }
            sources.push((k < end && from.row()[k] == r).then_some(NzRef::new(0, k)));
        }
    }
    sources
}

fn is_null(x: &MX) -> bool {
    x.nrow() == 0 && x.ncol() == 0
}

fn concat<F>(items: &[MX], kind: StructuralKind, pattern: F) -> Result<MX, ExprError>
where
    F: FnOnce(&[&Sparsity]) -> Result<(Sparsity, Vec<NzRef>), SparsityError>,
{
    let kept: SmallVec<[MX; 2]> = items.iter().filter(|x| !is_null(x)).cloned().collect();
    let refs: Vec<&Sparsity> = kept.iter().map(MX::sparsity).collect();
    let (sparsity, mapping) = pattern(&refs)?;
    match kept.len() {
        0 => Ok(MX::zeros(0, 0)),
        1 => Ok(kept[0].clone()),
        _ => Ok(MX::gather(kind, kept, sparsity, mapping.into_iter().map(Some).collect())),
    }
}

impl SparsityInterface for MX {
    type Error = ExprError;

    fn nrow(&self) -> usize {
        self.sparsity().nrow()
    }

    fn ncol(&self) -> usize {
        self.sparsity().ncol()
    }

    fn horzcat(items: &[Self]) -> Result<Self, ExprError> {
        concat(items, StructuralKind::Horzcat, Sparsity::horzcat_mapped)
    }

    fn vertcat(items: &[Self]) -> Result<Self, ExprError> {
        concat(items, StructuralKind::Vertcat, Sparsity::vertcat_mapped)
    }

    fn horzsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, ExprError> {
        let pieces = self.sparsity().horzsplit_mapped(offsets)?;
        Ok(self.split_pieces(StructuralKind::Horzsplit, pieces))
    }

    fn vertsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, ExprError> {
        let pieces = self.sparsity().vertsplit_mapped(offsets)?;
        Ok(self.split_pieces(StructuralKind::Vertsplit, pieces))
    }

    fn blkdiag(items: &[Self]) -> Result<Self, ExprError> {
        concat(items, StructuralKind::Blkdiag, |refs| Ok(Sparsity::blkdiag_mapped(refs)))
    }

    fn reshape(&self, nrow: usize, ncol: usize) -> Result<Self, ExprError> {
        let sparsity = self.sparsity().reshape_pattern(nrow, ncol)?;
        Ok(self.relabel(sparsity))
    }

    fn vecnz(&self) -> Self {
        self.relabel(Sparsity::dense_column(self.nnz()))
    }

    fn transpose(&self) -> Self {
        if self.is_scalar() {
            return self.clone();
        }
        let (sparsity, mapping) = self.sparsity().transpose_with_mapping();
        let sources = mapping.into_iter().map(|nz| Some(NzRef::new(0, nz))).collect();
        MX::gather(StructuralKind::Transpose, smallvec![self.clone()], sparsity, sources)
    }

    /// Matrix product. A 1×1 factor multiplies elementwise.
    fn mtimes(&self, other: &Self) -> Result<Self, ExprError> {
        if self.is_scalar() || other.is_scalar() {
            return self.mul(other);
        }
        let sparsity = self.sparsity().mtimes_pattern(other.sparsity())?;
        if sparsity.is_empty() {
            return Ok(MX::filled(sparsity, 0.0));
        }
        let terms = Sparsity::product_terms(self.sparsity(), other.sparsity(), &sparsity)?;
        Ok(MX::from_node(
            Operation::Mtimes {
                terms: Arc::from(terms),
                masked: false,
            },
            smallvec![self.clone(), other.clone()],
            sparsity,
        ))
    }

    fn mtimes_masked(&self, other: &Self, target: &Self) -> Result<Self, ExprError> {
        let sparsity = self
            .sparsity()
            .mtimes_masked_pattern(other.sparsity(), target.sparsity())?;
        let terms = Sparsity::product_terms(self.sparsity(), other.sparsity(), &sparsity)?;
        if terms.is_empty() {
            return Ok(target.clone());
        }
        Ok(MX::from_node(
            Operation::Mtimes {
                terms: Arc::from(terms),
                masked: true,
            },
            smallvec![self.clone(), other.clone(), target.clone()],
            sparsity,
        ))
    }
}
