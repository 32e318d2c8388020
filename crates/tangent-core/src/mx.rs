//! Expression handles.
//!
//! An [`MX`] is a reference-counted handle to an immutable [`Node`]. Cloning
//! a handle never copies the graph below it, so a subexpression used by
//! many consumers is stored once. Two handles are the same expression iff
//! they point to the same node; structurally identical expressions built
//! separately stay distinct unless canonicalized through
//! [`ExprCache`](crate::cache::ExprCache).

use std::fmt;
use std::sync::Arc;

use log::debug;
use smallvec::{smallvec, SmallVec};
use tangent_sparsity::Sparsity;

use crate::error::ExprError;
use crate::node::{Node, Operation};
use crate::opcode::OpCode;
use crate::registry::registry;

/// A symbolic sparse matrix expression.
#[derive(Clone)]
pub struct MX(Arc<Node>);

impl MX {
    pub(crate) fn from_node(op: Operation, deps: SmallVec<[MX; 2]>, sparsity: Sparsity) -> Self {
        Self(Arc::new(Node { op, deps, sparsity }))
    }

    /// The node, if this is the last handle to it.
    pub(crate) fn into_unique_node(self) -> Option<Node> {
        Arc::try_unwrap(self.0).ok()
    }

    // === Leaves ===

    /// Creates a dense `nrow × ncol` symbol.
    #[must_use]
    pub fn sym(name: impl Into<String>, nrow: usize, ncol: usize) -> Self {
        Self::sym_sparse(name, Sparsity::dense(nrow, ncol))
    }

    /// Creates a symbol with the given pattern.
    #[must_use]
    pub fn sym_sparse(name: impl Into<String>, sparsity: Sparsity) -> Self {
        Self::from_node(Operation::Symbol { name: name.into() }, SmallVec::new(), sparsity)
    }

    /// Creates a constant with one value per nonzero of `sparsity`.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] if the number of values does
    /// not match the number of nonzeros.
    pub fn constant(sparsity: Sparsity, values: Vec<f64>) -> Result<Self, ExprError> {
        if values.len() != sparsity.nnz() {
            return Err(ExprError::InvalidArgument(format!(
                "constant with pattern {sparsity} needs {} values, got {}",
                sparsity.nnz(),
                values.len()
            )));
        }
        Ok(Self::from_node(
            Operation::Constant { values: values.into() },
            SmallVec::new(),
            sparsity,
        ))
    }

    /// Creates a constant whose nonzeros all equal `value`.
    #[must_use]
    pub fn filled(sparsity: Sparsity, value: f64) -> Self {
        let values = vec![value; sparsity.nnz()];
        Self::from_node(
            Operation::Constant { values: values.into() },
            SmallVec::new(),
            sparsity,
        )
    }

    /// Creates a 1×1 constant.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self::filled(Sparsity::scalar(), value)
    }

    /// Creates an `nrow × ncol` matrix without any structural nonzero.
    #[must_use]
    pub fn zeros(nrow: usize, ncol: usize) -> Self {
        Self::filled(Sparsity::empty(nrow, ncol), 0.0)
    }

    /// Creates a dense `nrow × ncol` matrix of ones.
    #[must_use]
    pub fn ones(nrow: usize, ncol: usize) -> Self {
        Self::filled(Sparsity::dense(nrow, ncol), 1.0)
    }

    /// Creates the n×n identity with a diagonal pattern.
    #[must_use]
    pub fn eye(n: usize) -> Self {
        Self::filled(Sparsity::diag(n), 1.0)
    }

    // === Accessors ===

    /// The node behind this handle.
    #[must_use]
    pub fn node(&self) -> &Node {
        &self.0
    }

    /// The operation of the node.
    #[must_use]
    pub fn op(&self) -> &Operation {
        &self.0.op
    }

    /// The output sparsity.
    #[must_use]
    pub fn sparsity(&self) -> &Sparsity {
        &self.0.sparsity
    }

    /// Number of rows.
    #[must_use]
    pub fn nrow(&self) -> usize {
        self.0.sparsity.nrow()
    }

    /// Number of columns.
    #[must_use]
    pub fn ncol(&self) -> usize {
        self.0.sparsity.ncol()
    }

    /// Number of structural nonzeros.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.0.sparsity.nnz()
    }

    /// Returns true for 1×1 expressions.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.0.sparsity.is_scalar()
    }

    /// Returns true if every element is a structural nonzero.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.0.sparsity.is_dense()
    }

    /// Returns true for symbol leaves.
    #[must_use]
    pub fn is_symbolic(&self) -> bool {
        matches!(self.0.op, Operation::Symbol { .. })
    }

    /// Returns true for constant leaves.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.0.op, Operation::Constant { .. })
    }

    /// The values of a constant leaf.
    #[must_use]
    pub fn constant_values(&self) -> Option<&[f64]> {
        match &self.0.op {
            Operation::Constant { values } => Some(values),
            _ => None,
        }
    }

    /// The name of a symbol leaf.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.0.op {
            Operation::Symbol { name } => Some(name),
            _ => None,
        }
    }

    /// The `i`-th operand.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.n_dep()`.
    #[must_use]
    pub fn dep(&self, i: usize) -> &MX {
        &self.0.deps[i]
    }

    /// Number of operands.
    #[must_use]
    pub fn n_dep(&self) -> usize {
        self.0.deps.len()
    }

    /// All operands, in order.
    #[must_use]
    pub fn deps(&self) -> &[MX] {
        &self.0.deps
    }

    /// Returns true if both handles point to the same node.
    #[must_use]
    pub fn is_same(&self, other: &MX) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the node, stable for as long as a handle to it is
    /// alive.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Rebuilds this node on other operands.
    ///
    /// Every operand must have the pattern of the one it replaces, so the
    /// operation and output pattern carry over unchanged. Returns this
    /// handle if no operand actually changed.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] if the number of operands or
    /// the pattern of one of them differs.
    pub fn with_deps(&self, deps: &[MX]) -> Result<MX, ExprError> {
        if deps.len() != self.n_dep() {
            return Err(ExprError::InvalidArgument(format!(
                "{} takes {} operands, got {}",
                self.op().name(),
                self.n_dep(),
                deps.len()
            )));
        }
        for (i, (new, old)) in deps.iter().zip(self.deps()).enumerate() {
            if new.sparsity() != old.sparsity() {
                return Err(ExprError::InvalidArgument(format!(
                    "operand {i} of {} has pattern {}, expected {}",
                    self.op().name(),
                    new.sparsity(),
                    old.sparsity()
                )));
            }
        }
        if deps.iter().zip(self.deps()).all(|(a, b)| a.is_same(b)) {
            return Ok(self.clone());
        }
        Ok(Self::from_node(
            self.op().clone(),
            deps.iter().cloned().collect(),
            self.sparsity().clone(),
        ))
    }

    // === Elementwise operations ===

    /// Applies a unary operation to every nonzero.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] if `op` is binary.
    pub fn unary(&self, op: OpCode) -> Result<MX, ExprError> {
        if op.is_binary() {
            return Err(ExprError::InvalidArgument(format!("'{op}' takes two operands")));
        }
        Ok(self.apply_unary(op))
    }

    fn apply_unary(&self, op: OpCode) -> MX {
        let info = registry().info(op);
        let x = if info.f0_is_zero || self.is_dense() {
            self.clone()
        } else {
            debug!("densifying operand of {op}: f(0) != 0 ({} -> {} nonzeros)", self.nnz(), self.sparsity().numel());
            self.densify()
        };
        let sparsity = x.sparsity().clone();
        Self::from_node(Operation::Unary(op), smallvec![x], sparsity)
    }

    /// Applies a binary operation elementwise.
    ///
    /// A 1×1 operand is broadcast over the other one. If the operation does
    /// not keep the other operand's structural zeros at zero (e.g. adding a
    /// nonzero scalar), that operand is densified first. Two matrices are
    /// combined over the union of their patterns when `f(0, 0) == 0`, and
    /// over the dense pattern otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] if `op` is unary and
    /// [`ExprError::DimensionMismatch`] if two non-scalar operands differ in
    /// shape.
    pub fn binary(&self, op: OpCode, other: &MX) -> Result<MX, ExprError> {
        if !op.is_binary() {
            return Err(ExprError::InvalidArgument(format!("'{op}' takes one operand")));
        }
        let info = registry().info(op);

        let (x, y) = if self.is_scalar() && other.is_scalar() {
            (self.densify(), other.densify())
        } else if self.is_scalar() {
            let y = if info.fx0_is_zero || other.is_dense() {
                other.clone()
            } else {
                debug!("densifying right operand of {op}: f(x, 0) != 0 ({} nonzeros)", other.nnz());
                other.densify()
            };
            (self.densify(), y)
        } else if other.is_scalar() {
            let x = if info.f0x_is_zero || self.is_dense() {
                self.clone()
            } else {
                debug!("densifying left operand of {op}: f(0, y) != 0 ({} nonzeros)", self.nnz());
                self.densify()
            };
            (x, other.densify())
        } else {
            if self.sparsity().shape() != other.sparsity().shape() {
                return Err(ExprError::DimensionMismatch {
                    op: "binary",
                    detail: format!(
                        "cannot apply {op} to {}x{} and {}x{}",
                        self.nrow(),
                        self.ncol(),
                        other.nrow(),
                        other.ncol()
                    ),
                });
            }
            let target = if !info.f00_is_zero {
                Sparsity::dense(self.nrow(), self.ncol())
            } else if self.sparsity() == other.sparsity() {
                self.sparsity().clone()
            } else {
                self.sparsity().union(other.sparsity())?
            };
            (self.project(&target)?, other.project(&target)?)
        };

        let sparsity = if x.is_scalar() && !y.is_scalar() {
            y.sparsity().clone()
        } else {
            x.sparsity().clone()
        };
        Ok(Self::from_node(Operation::Binary(op), smallvec![x, y], sparsity))
    }

    /// Elementwise `self + other`.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn add(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Add, other)
    }

    /// Elementwise `self - other`.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn sub(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Sub, other)
    }

    /// Elementwise `self * other`. For the matrix product see
    /// [`SparsityInterface::mtimes`](tangent_sparsity::SparsityInterface::mtimes).
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn mul(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Mul, other)
    }

    /// Elementwise `self / other`.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn div(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Div, other)
    }

    /// Elementwise `self ^ other`.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn pow(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Pow, other)
    }

    /// Elementwise minimum.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn fmin(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Fmin, other)
    }

    /// Elementwise maximum.
    ///
    /// # Errors
    ///
    /// See [`MX::binary`].
    pub fn fmax(&self, other: &MX) -> Result<MX, ExprError> {
        self.binary(OpCode::Fmax, other)
    }

    /// Elementwise negation.
    #[must_use]
    pub fn neg(&self) -> MX {
        self.apply_unary(OpCode::Neg)
    }

    /// Elementwise square root.
    #[must_use]
    pub fn sqrt(&self) -> MX {
        self.apply_unary(OpCode::Sqrt)
    }

    /// Elementwise square.
    #[must_use]
    pub fn sq(&self) -> MX {
        self.apply_unary(OpCode::Sqr)
    }

    /// Elementwise exponential.
    #[must_use]
    pub fn exp(&self) -> MX {
        self.apply_unary(OpCode::Exp)
    }

    /// Elementwise natural logarithm.
    #[must_use]
    pub fn log(&self) -> MX {
        self.apply_unary(OpCode::Log)
    }

    /// Elementwise sine.
    #[must_use]
    pub fn sin(&self) -> MX {
        self.apply_unary(OpCode::Sin)
    }

    /// Elementwise cosine.
    #[must_use]
    pub fn cos(&self) -> MX {
        self.apply_unary(OpCode::Cos)
    }

    /// Elementwise tangent.
    #[must_use]
    pub fn tan(&self) -> MX {
        self.apply_unary(OpCode::Tan)
    }

    /// Elementwise absolute value.
    #[must_use]
    pub fn fabs(&self) -> MX {
        self.apply_unary(OpCode::Fabs)
    }
}

impl fmt::Debug for MX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MX({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sym_and_accessors() {
        let x = MX::sym("x", 2, 3);
        assert!(x.is_symbolic());
        assert_eq!(x.name(), Some("x"));
        assert_eq!(x.nnz(), 6);
        assert_eq!(x.n_dep(), 0);
        assert!(x.is_same(&x.clone()));
        assert!(!x.is_same(&MX::sym("x", 2, 3)));
    }

    #[test]
    fn test_constant_checks_length() {
        assert!(MX::constant(Sparsity::diag(2), vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            MX::constant(Sparsity::diag(2), vec![1.0]),
            Err(ExprError::InvalidArgument(_))
        ));
        assert_eq!(MX::eye(3).constant_values(), Some(&[1.0, 1.0, 1.0][..]));
        assert_eq!(MX::zeros(2, 2).nnz(), 0);
    }

    #[test_log::test]
    fn test_scalar_add_densifies_sparse_matrix() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym_sparse("y", Sparsity::diag(2));
        let z = x.add(&y).unwrap();
        assert!(z.is_dense());
        assert_eq!(z.nnz(), 4);
        // The sparse operand went through a projection node
        assert!(!z.dep(1).is_same(&y));
        assert!(z.dep(1).is_dense());
    }

    #[test]
    fn test_scalar_mul_keeps_sparsity() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym_sparse("y", Sparsity::diag(3));
        let z = x.mul(&y).unwrap();
        assert_eq!(z.sparsity(), &Sparsity::diag(3));
        assert!(z.dep(1).is_same(&y));

        // Sparse matrix divided by a scalar keeps its zeros, scalar divided
        // by a sparse matrix does not
        assert_eq!(y.div(&x).unwrap().nnz(), 3);
        assert_eq!(x.div(&y).unwrap().nnz(), 9);
    }

    #[test]
    fn test_matrix_matrix_union_and_dense() {
        let (lower, _) = Sparsity::triplet(2, 2, &[0, 1], &[0, 0]).unwrap();
        let a = MX::sym_sparse("a", Sparsity::diag(2));
        let b = MX::sym_sparse("b", lower);
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.nnz(), 3);
        assert_eq!(sum.dep(0).sparsity(), sum.sparsity());
        assert_eq!(sum.dep(1).sparsity(), sum.sparsity());

        // f(0, 0) != 0 for division: dense result
        assert!(a.div(&b).unwrap().is_dense());
    }

    #[test]
    fn test_matrix_matrix_shape_mismatch() {
        let a = MX::sym("a", 2, 2);
        let b = MX::sym("b", 3, 1);
        assert!(matches!(a.add(&b), Err(ExprError::DimensionMismatch { .. })));
    }

    #[test_log::test]
    fn test_unary_densifies_when_needed() {
        let y = MX::sym_sparse("y", Sparsity::diag(2));
        assert_eq!(y.sin().nnz(), 2);
        assert_eq!(y.cos().nnz(), 4);
        assert!(y.unary(OpCode::Add).is_err());
        assert!(y.binary(OpCode::Sin, &y).is_err());
    }

    #[test]
    fn test_with_deps() {
        let x = MX::sym("x", 2, 1);
        let y = MX::sym("y", 2, 1);
        let e = x.mul(&x).unwrap();
        assert!(e.with_deps(&[x.clone(), x.clone()]).unwrap().is_same(&e));

        let r = e.with_deps(&[y.clone(), x.clone()]).unwrap();
        assert!(r.dep(0).is_same(&y));
        assert!(r.dep(1).is_same(&x));
        assert_eq!(r.sparsity(), e.sparsity());

        assert!(e.with_deps(&[y.clone()]).is_err());
        assert!(matches!(
            e.with_deps(&[MX::sym("w", 3, 1), x]),
            Err(ExprError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_diamond_sharing() {
        let x = MX::sym("x", 1, 1);
        let s = x.sin();
        let z = s.mul(&s).unwrap();
        assert!(z.dep(0).is_same(z.dep(1)));
    }
}
