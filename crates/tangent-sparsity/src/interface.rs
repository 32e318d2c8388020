//! The structural matrix algebra, written once for every matrix type.
//!
//! A type implements the handful of required primitives (dimensions,
//! concatenation, splitting, reshaping, products) and inherits the derived
//! operations: stride splits, block assembly and splitting, `vec`,
//! `veccat`, `vecnzcat`, product chains.
//!
//! The laws the derived operations rely on:
//!
//! - `horzcat(horzsplit(x, offsets)) == x`
//! - `vertcat(vertsplit(x, offsets)) == x`
//! - `blockcat(blocksplit(x, vert, horz)) == x`

use crate::concat::stride_offsets;
use crate::error::SparsityError;
use crate::pattern::Sparsity;

/// Structural operations shared by sparsity patterns and value-bearing
/// matrix types.
pub trait SparsityInterface: Clone + Sized {
    /// Error type of the implementing matrix type.
    type Error: From<SparsityError>;

    /// Number of rows.
    fn nrow(&self) -> usize;

    /// Number of columns.
    fn ncol(&self) -> usize;

    /// Concatenates side by side. 0×0 operands are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the row counts differ.
    fn horzcat(items: &[Self]) -> Result<Self, Self::Error>;

    /// Stacks vertically. 0×0 operands are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the column counts differ.
    fn vertcat(items: &[Self]) -> Result<Self, Self::Error>;

    /// Splits into column groups; `offsets` runs from 0 to `ncol`.
    ///
    /// # Errors
    ///
    /// Fails if the offsets are empty, not monotonic or out of range.
    fn horzsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, Self::Error>;

    /// Splits into row groups; `offsets` runs from 0 to `nrow`.
    ///
    /// # Errors
    ///
    /// Fails if the offsets are empty, not monotonic or out of range.
    fn vertsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, Self::Error>;

    /// Block-diagonal embedding.
    ///
    /// # Errors
    ///
    /// Implementations may reject operands they cannot embed.
    fn blkdiag(items: &[Self]) -> Result<Self, Self::Error>;

    /// Column-major reshape.
    ///
    /// # Errors
    ///
    /// Fails if the element count changes.
    fn reshape(&self, nrow: usize, ncol: usize) -> Result<Self, Self::Error>;

    /// The structural nonzeros as a dense column, in storage order.
    fn vecnz(&self) -> Self;

    /// Transpose.
    fn transpose(&self) -> Self;

    /// Matrix product.
    ///
    /// # Errors
    ///
    /// Fails if the inner dimensions differ.
    fn mtimes(&self, other: &Self) -> Result<Self, Self::Error>;

    /// `target + self * other`, restricted to the nonzeros of `target`.
    ///
    /// # Errors
    ///
    /// Fails if the inner dimensions differ or `target` has the wrong shape.
    fn mtimes_masked(&self, other: &Self, target: &Self) -> Result<Self, Self::Error>;

    /// Number of elements.
    fn numel(&self) -> usize {
        self.nrow() * self.ncol()
    }

    /// `(nrow, ncol)`.
    fn shape(&self) -> (usize, usize) {
        (self.nrow(), self.ncol())
    }

    /// Concatenates two matrices side by side.
    ///
    /// # Errors
    ///
    /// See [`SparsityInterface::horzcat`].
    fn horzcat2(a: &Self, b: &Self) -> Result<Self, Self::Error> {
        Self::horzcat(&[a.clone(), b.clone()])
    }

    /// Stacks two matrices.
    ///
    /// # Errors
    ///
    /// See [`SparsityInterface::vertcat`].
    fn vertcat2(a: &Self, b: &Self) -> Result<Self, Self::Error> {
        Self::vertcat(&[a.clone(), b.clone()])
    }

    /// Splits into groups of `incr` columns; the last group takes the rest.
    ///
    /// # Errors
    ///
    /// Fails if `incr` is zero.
    fn horzsplit_incr(&self, incr: usize) -> Result<Vec<Self>, Self::Error> {
        let offsets = stride_offsets("horzsplit", self.ncol(), incr)?;
        self.horzsplit(&offsets)
    }

    /// Splits into groups of `incr` rows; the last group takes the rest.
    ///
    /// # Errors
    ///
    /// Fails if `incr` is zero.
    fn vertsplit_incr(&self, incr: usize) -> Result<Vec<Self>, Self::Error> {
        let offsets = stride_offsets("vertsplit", self.nrow(), incr)?;
        self.vertsplit(&offsets)
    }

    /// Assembles a matrix from rows of blocks.
    ///
    /// # Errors
    ///
    /// Fails if blocks in a row differ in height or block rows differ in
    /// width.
    fn blockcat(blocks: &[Vec<Self>]) -> Result<Self, Self::Error> {
        let rows = blocks
            .iter()
            .map(|row| Self::horzcat(row))
            .collect::<Result<Vec<_>, _>>()?;
        Self::vertcat(&rows)
    }

    /// Assembles `[a b; c d]`.
    ///
    /// # Errors
    ///
    /// See [`SparsityInterface::blockcat`].
    fn blockcat4(a: &Self, b: &Self, c: &Self, d: &Self) -> Result<Self, Self::Error> {
        let top = Self::horzcat2(a, b)?;
        let bottom = Self::horzcat2(c, d)?;
        Self::vertcat2(&top, &bottom)
    }

    /// Chops into blocks: row groups first, then each row group into column
    /// groups.
    ///
    /// # Errors
    ///
    /// Fails if either offset list is invalid for its dimension.
    fn blocksplit(&self, vert_offsets: &[usize], horz_offsets: &[usize]) -> Result<Vec<Vec<Self>>, Self::Error> {
        self.vertsplit(vert_offsets)?
            .iter()
            .map(|row| row.horzsplit(horz_offsets))
            .collect()
    }

    /// Chops into blocks of `vert_incr` rows and `horz_incr` columns.
    ///
    /// # Errors
    ///
    /// Fails if either stride is zero.
    fn blocksplit_incr(&self, vert_incr: usize, horz_incr: usize) -> Result<Vec<Vec<Self>>, Self::Error> {
        let vert = stride_offsets("blocksplit", self.nrow(), vert_incr)?;
        let horz = stride_offsets("blocksplit", self.ncol(), horz_incr)?;
        self.blocksplit(&vert, &horz)
    }

    /// Block-diagonal embedding of two matrices.
    ///
    /// # Errors
    ///
    /// See [`SparsityInterface::blkdiag`].
    fn blkdiag2(a: &Self, b: &Self) -> Result<Self, Self::Error> {
        Self::blkdiag(&[a.clone(), b.clone()])
    }

    /// Stacks the columns into a single column of length `numel`.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`SparsityInterface::reshape`].
    fn vec(&self) -> Result<Self, Self::Error> {
        self.reshape(self.numel(), 1)
    }

    /// `vertcat` of `vec` of every item.
    ///
    /// # Errors
    ///
    /// Propagates errors of the primitives.
    fn veccat(items: &[Self]) -> Result<Self, Self::Error> {
        let columns = items.iter().map(Self::vec).collect::<Result<Vec<_>, _>>()?;
        Self::vertcat(&columns)
    }

    /// `vertcat` of `vecnz` of every item.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`SparsityInterface::vertcat`].
    fn vecnzcat(items: &[Self]) -> Result<Self, Self::Error> {
        let columns: Vec<Self> = items.iter().map(Self::vecnz).collect();
        Self::vertcat(&columns)
    }

    /// Product of a chain of matrices, from left to right.
    ///
    /// # Errors
    ///
    /// Fails on an empty chain or mismatched inner dimensions.
    fn mul_chain(items: &[Self]) -> Result<Self, Self::Error> {
        let (first, rest) = items
            .split_first()
            .ok_or_else(|| SparsityError::invalid("mul_chain", "supplied list must not be empty"))?;
        rest.iter().try_fold(first.clone(), |acc, item| acc.mtimes(item))
    }
}

impl SparsityInterface for Sparsity {
    type Error = SparsityError;

    fn nrow(&self) -> usize {
        Sparsity::nrow(self)
    }

    fn ncol(&self) -> usize {
        Sparsity::ncol(self)
    }

    fn horzcat(items: &[Self]) -> Result<Self, SparsityError> {
        let refs: Vec<&Sparsity> = items.iter().collect();
        Ok(Sparsity::horzcat_mapped(&refs)?.0)
    }

    fn vertcat(items: &[Self]) -> Result<Self, SparsityError> {
        let refs: Vec<&Sparsity> = items.iter().collect();
        Ok(Sparsity::vertcat_mapped(&refs)?.0)
    }

    fn horzsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, SparsityError> {
        Ok(self
            .horzsplit_mapped(offsets)?
            .into_iter()
            .map(|(sp, _)| sp)
            .collect())
    }

    fn vertsplit(&self, offsets: &[usize]) -> Result<Vec<Self>, SparsityError> {
        Ok(self
            .vertsplit_mapped(offsets)?
            .into_iter()
            .map(|(sp, _)| sp)
            .collect())
    }

    fn blkdiag(items: &[Self]) -> Result<Self, SparsityError> {
        let refs: Vec<&Sparsity> = items.iter().collect();
        Ok(Sparsity::blkdiag_mapped(&refs).0)
    }

    fn reshape(&self, nrow: usize, ncol: usize) -> Result<Self, SparsityError> {
        self.reshape_pattern(nrow, ncol)
    }

    fn vecnz(&self) -> Self {
        Sparsity::dense_column(self.nnz())
    }

    fn transpose(&self) -> Self {
        self.transpose_with_mapping().0
    }

    fn mtimes(&self, other: &Self) -> Result<Self, SparsityError> {
        self.mtimes_pattern(other)
    }

    fn mtimes_masked(&self, other: &Self, target: &Self) -> Result<Self, SparsityError> {
        self.mtimes_masked_pattern(other, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockcat4_and_blocksplit() {
        let a = Sparsity::diag(2);
        let b = Sparsity::empty(2, 1);
        let c = Sparsity::dense(1, 2);
        let d = Sparsity::scalar();
        let m = Sparsity::blockcat4(&a, &b, &c, &d).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.nnz(), 5);

        let blocks = m.blocksplit(&[0, 2, 3], &[0, 2, 3]).unwrap();
        assert_eq!(blocks[0][0], a);
        assert_eq!(blocks[0][1], b);
        assert_eq!(blocks[1][0], c);
        assert_eq!(blocks[1][1], d);
        assert_eq!(Sparsity::blockcat(&blocks).unwrap(), m);
    }

    #[test]
    fn test_blocksplit_incr() {
        let m = Sparsity::dense(3, 4);
        let blocks = m.blocksplit_incr(2, 3).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 2);
        assert_eq!(blocks[0][0].shape(), (2, 3));
        assert_eq!(blocks[1][1].shape(), (1, 1));
        assert!(m.blocksplit_incr(0, 1).is_err());
    }

    #[test]
    fn test_vec_and_vecnz() {
        let (sp, _) = Sparsity::triplet(2, 2, &[1, 0], &[0, 1]).unwrap();
        let v = sp.vec().unwrap();
        assert_eq!(v.shape(), (4, 1));
        assert_eq!(v.row(), &[1, 2]);

        let nz = sp.vecnz();
        assert_eq!(nz, Sparsity::dense(2, 1));
    }

    #[test]
    fn test_veccat_vecnzcat() {
        let a = Sparsity::diag(2);
        let b = Sparsity::dense(1, 3);
        let v = Sparsity::veccat(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(v.shape(), (7, 1));
        assert_eq!(v.row(), &[0, 3, 4, 5, 6]);

        let nz = Sparsity::vecnzcat(&[a, b]).unwrap();
        assert_eq!(nz, Sparsity::dense(5, 1));
    }

    #[test]
    fn test_mul_chain() {
        let chain = [Sparsity::dense(2, 3), Sparsity::diag(3), Sparsity::dense(3, 1)];
        assert_eq!(Sparsity::mul_chain(&chain).unwrap(), Sparsity::dense(2, 1));
        assert!(matches!(
            Sparsity::mul_chain(&[]),
            Err(SparsityError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_split_stride_roundtrip() {
        let m = Sparsity::diag(5);
        let cols = m.horzsplit_incr(2).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[2].shape(), (5, 1));
        assert_eq!(Sparsity::horzcat(&cols).unwrap(), m);

        let rows = m.vertsplit_incr(3).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(Sparsity::vertcat(&rows).unwrap(), m);
    }
}
