//! Sparsity patterns in Compressed Sparse Column (CCS) format.
//!
//! A pattern only records *where* a matrix may hold nonzeros. Values live
//! elsewhere, in flat buffers whose k-th entry belongs to the k-th nonzero
//! of the pattern.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::SparsityError;

#[derive(Debug, PartialEq, Eq, Hash)]
struct Pattern {
    nrow: usize,
    ncol: usize,
    /// Column pointers: entries of column c are `colind[c]..colind[c+1]`.
    colind: Vec<usize>,
    /// Row index of every nonzero, ascending within a column.
    row: Vec<usize>,
}

/// Immutable sparsity pattern of an `nrow × ncol` matrix.
///
/// # Memory Layout
///
/// For a pattern with nnz nonzeros:
/// - `colind`: ncol+1 column pointers, starting at 0 and ending at nnz
/// - `row`: nnz row indices, strictly ascending within each column
///
/// The storage is reference counted, so cloning a pattern is O(1) and many
/// expression nodes can share one pattern. Equality is structural.
#[derive(Clone)]
pub struct Sparsity(Arc<Pattern>);

/// Origin of one nonzero of an assembled pattern: nonzero `nz` of the
/// `item`-th operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NzRef {
    /// Index of the operand the value is taken from.
    pub item: usize,
    /// Nonzero index inside that operand.
    pub nz: usize,
}

impl NzRef {
    /// Creates a reference to nonzero `nz` of operand `item`.
    #[must_use]
    pub const fn new(item: usize, nz: usize) -> Self {
        Self { item, nz }
    }
}

impl Sparsity {
    /// Creates a pattern from raw compressed-column arrays.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::InvalidArgument`] if the arrays violate the
    /// compressed-column invariants.
    pub fn new(
        nrow: usize,
        ncol: usize,
        colind: Vec<usize>,
        row: Vec<usize>,
    ) -> Result<Self, SparsityError> {
        validate(nrow, ncol, &colind, &row).map_err(|detail| SparsityError::invalid("Sparsity::new", detail))?;
        Ok(Self(Arc::new(Pattern {
            nrow,
            ncol,
            colind,
            row,
        })))
    }

    /// Assembles a pattern that this crate has constructed itself.
    pub(crate) fn from_parts(nrow: usize, ncol: usize, colind: Vec<usize>, row: Vec<usize>) -> Self {
        debug_assert!(
            validate(nrow, ncol, &colind, &row).is_ok(),
            "malformed pattern assembled internally: {:?}",
            validate(nrow, ncol, &colind, &row)
        );
        Self(Arc::new(Pattern {
            nrow,
            ncol,
            colind,
            row,
        }))
    }

    /// Creates a fully dense pattern.
    #[must_use]
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let colind = (0..=ncol).map(|c| c * nrow).collect();
        let row = (0..ncol).flat_map(|_| 0..nrow).collect();
        Self::from_parts(nrow, ncol, colind, row)
    }

    /// Creates a pattern without any nonzero.
    #[must_use]
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Self::from_parts(nrow, ncol, vec![0; ncol + 1], Vec::new())
    }

    /// The dense 1×1 pattern.
    #[must_use]
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    /// A dense column vector of length `n`.
    #[must_use]
    pub fn dense_column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// The n×n diagonal pattern.
    #[must_use]
    pub fn diag(n: usize) -> Self {
        Self::from_parts(n, n, (0..=n).collect(), (0..n).collect())
    }

    /// Creates a pattern from coordinate lists.
    ///
    /// Returns the pattern together with the nonzero index assigned to every
    /// input coordinate. Duplicate coordinates share one nonzero.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::InvalidArgument`] if the lists differ in
    /// length or a coordinate is out of range.
    pub fn triplet(
        nrow: usize,
        ncol: usize,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<(Self, Vec<usize>), SparsityError> {
        if rows.len() != cols.len() {
            return Err(SparsityError::invalid(
                "triplet",
                format!("{} row indices but {} column indices", rows.len(), cols.len()),
            ));
        }
        if let Some((r, c)) = rows
            .iter()
            .zip(cols)
            .find(|&(&r, &c)| r >= nrow || c >= ncol)
        {
            return Err(SparsityError::invalid(
                "triplet",
                format!("entry ({r}, {c}) outside a {nrow}x{ncol} pattern"),
            ));
        }

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_unstable_by_key(|&t| (cols[t], rows[t]));

        let mut colind = vec![0; ncol + 1];
        let mut row = Vec::with_capacity(rows.len());
        let mut mapping = vec![0; rows.len()];
        let mut last = None;
        for t in order {
            let key = (cols[t], rows[t]);
            if last != Some(key) {
                row.push(rows[t]);
                colind[cols[t] + 1] += 1;
                last = Some(key);
            }
            mapping[t] = row.len() - 1;
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }

        Ok((Self::from_parts(nrow, ncol, colind, row), mapping))
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn nrow(&self) -> usize {
        self.0.nrow
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn ncol(&self) -> usize {
        self.0.ncol
    }

    /// Returns `(nrow, ncol)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.0.nrow, self.0.ncol)
    }

    /// Returns the number of structural nonzeros.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.0.row.len()
    }

    /// Returns the number of elements, `nrow * ncol`.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.nrow * self.0.ncol
    }

    /// Column pointers (length ncol+1).
    #[must_use]
    pub fn colind(&self) -> &[usize] {
        &self.0.colind
    }

    /// Row index of every nonzero.
    #[must_use]
    pub fn row(&self) -> &[usize] {
        &self.0.row
    }

    /// Returns true if every element is a structural nonzero.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    /// Returns true for 1×1 patterns, whatever their nonzero count.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.0.nrow == 1 && self.0.ncol == 1
    }

    /// Returns true if the pattern has no nonzero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nnz() == 0
    }

    /// Returns true if both handles share the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Range of nonzero indices belonging to column `c`.
    #[must_use]
    pub fn column_range(&self, c: usize) -> std::ops::Range<usize> {
        self.0.colind[c]..self.0.colind[c + 1]
    }

    /// Returns the nonzero index of element (r, c), if it is structurally
    /// nonzero.
    #[must_use]
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.0.nrow || c >= self.0.ncol {
            return None;
        }
        let range = self.column_range(c);
        let start = range.start;
        self.0.row[range].binary_search(&r).ok().map(|k| start + k)
    }

    /// Returns true if element (r, c) is a structural nonzero.
    #[must_use]
    pub fn has_nz(&self, r: usize, c: usize) -> bool {
        self.get_nz(r, c).is_some()
    }

    /// Column index of every nonzero.
    #[must_use]
    pub fn get_col(&self) -> Vec<usize> {
        (0..self.0.ncol)
            .flat_map(|c| self.column_range(c).map(move |_| c))
            .collect()
    }

    /// Coordinates of the nonzeros in storage order (column by column, top
    /// to bottom).
    pub fn positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.0.ncol).flat_map(move |c| self.column_range(c).map(move |k| (self.0.row[k], c)))
    }

    /// Checks the compressed-column invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::InternalInconsistency`] describing the first
    /// violated invariant.
    pub fn check(&self) -> Result<(), SparsityError> {
        validate(self.0.nrow, self.0.ncol, &self.0.colind, &self.0.row)
            .map_err(SparsityError::InternalInconsistency)
    }

    /// Union of two patterns of the same shape.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the shapes differ.
    pub fn union(&self, other: &Self) -> Result<Self, SparsityError> {
        self.merge(other, "union", true)
    }

    /// Intersection of two patterns of the same shape.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the shapes differ.
    pub fn intersect(&self, other: &Self) -> Result<Self, SparsityError> {
        self.merge(other, "intersect", false)
    }

    fn merge(&self, other: &Self, op: &'static str, keep_unmatched: bool) -> Result<Self, SparsityError> {
        if self.shape() != other.shape() {
            return Err(SparsityError::dimension(
                op,
                format!(
                    "{}x{} vs {}x{}",
                    self.nrow(),
                    self.ncol(),
                    other.nrow(),
                    other.ncol()
                ),
            ));
        }
        if self == other {
            return Ok(self.clone());
        }

        let mut colind = Vec::with_capacity(self.ncol() + 1);
        let mut row = Vec::new();
        colind.push(0);
        for c in 0..self.ncol() {
            let a = &self.row()[self.column_range(c)];
            let b = &other.row()[other.column_range(c)];
            let (mut i, mut j) = (0, 0);
            while i < a.len() && j < b.len() {
                match a[i].cmp(&b[j]) {
                    std::cmp::Ordering::Less => {
                        if keep_unmatched {
                            row.push(a[i]);
                        }
                        i += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        if keep_unmatched {
                            row.push(b[j]);
                        }
                        j += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        row.push(a[i]);
                        i += 1;
                        j += 1;
                    }
                }
            }
            if keep_unmatched {
                row.extend_from_slice(&a[i..]);
                row.extend_from_slice(&b[j..]);
            }
            colind.push(row.len());
        }

        Ok(Self::from_parts(self.nrow(), self.ncol(), colind, row))
    }

    /// Returns true if every nonzero of `self` is a nonzero of `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.nz_map_into(other).is_ok()
    }

    /// Locates each nonzero of `self` inside a superset pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the shapes differ and
    /// [`SparsityError::InvalidArgument`] if `target` misses one of the
    /// nonzeros.
    pub fn nz_map_into(&self, target: &Self) -> Result<Vec<usize>, SparsityError> {
        if self.shape() != target.shape() {
            return Err(SparsityError::dimension(
                "nz_map_into",
                format!(
                    "{}x{} into {}x{}",
                    self.nrow(),
                    self.ncol(),
                    target.nrow(),
                    target.ncol()
                ),
            ));
        }

        let mut mapping = Vec::with_capacity(self.nnz());
        for c in 0..self.ncol() {
            let mut k = target.colind()[c];
            let end = target.colind()[c + 1];
            for &r in &self.row()[self.column_range(c)] {
                while k < end && target.row()[k] < r {
                    k += 1;
                }
                if k == end || target.row()[k] != r {
                    return Err(SparsityError::invalid(
                        "nz_map_into",
                        format!("element ({r}, {c}) is not a nonzero of the target"),
                    ));
                }
                mapping.push(k);
            }
        }
        Ok(mapping)
    }
}

fn validate(nrow: usize, ncol: usize, colind: &[usize], row: &[usize]) -> Result<(), String> {
    if colind.len() != ncol + 1 {
        return Err(format!(
            "expected {} column pointers, got {}",
            ncol + 1,
            colind.len()
        ));
    }
    if colind[0] != 0 {
        return Err(format!("first column pointer is {}, expected 0", colind[0]));
    }
    if let Some(c) = colind.windows(2).position(|w| w[0] > w[1]) {
        return Err(format!("column pointers decrease at column {c}"));
    }
    if colind[ncol] != row.len() {
        return Err(format!(
            "last column pointer {} does not match {} row indices",
            colind[ncol],
            row.len()
        ));
    }
    for c in 0..ncol {
        let rows = &row[colind[c]..colind[c + 1]];
        if let Some(&r) = rows.iter().find(|&&r| r >= nrow) {
            return Err(format!("row index {r} out of range in column {c} (nrow = {nrow})"));
        }
        if rows.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("row indices not strictly ascending in column {c}"));
        }
    }
    Ok(())
}

impl PartialEq for Sparsity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Sparsity {}

impl Hash for Sparsity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sparsity")
            .field("nrow", &self.0.nrow)
            .field("ncol", &self.0.ncol)
            .field("colind", &self.0.colind)
            .field("row", &self.0.row)
            .finish()
    }
}

impl fmt::Display for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dense() {
            write!(f, "{}x{}", self.nrow(), self.ncol())
        } else {
            write!(f, "{}x{},{}nz", self.nrow(), self.ncol(), self.nnz())
        }
    }
}
