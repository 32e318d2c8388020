//! Structural primitives: concatenation, splitting, block-diagonal
//! embedding, transposition and reshaping.
//!
//! Each primitive returns, next to the resulting pattern, where every
//! resulting nonzero comes from. Value-bearing matrix types replay these
//! mappings on their nonzero buffers; the pattern type itself discards them.

use crate::error::SparsityError;
use crate::pattern::{NzRef, Sparsity};

/// A piece produced by a split: its pattern and, for each of its nonzeros,
/// the nonzero index inside the split matrix.
pub type SplitPiece = (Sparsity, Vec<usize>);

/// Checks a boundary list for splitting a dimension of size `dim`.
///
/// Offsets must start at 0, end at `dim` and never decrease.
///
/// # Errors
///
/// Returns [`SparsityError::InvalidArgument`] for an empty list and
/// [`SparsityError::DimensionMismatch`] otherwise.
pub fn check_offsets(op: &'static str, offsets: &[usize], dim: usize) -> Result<(), SparsityError> {
    let (Some(&first), Some(&last)) = (offsets.first(), offsets.last()) else {
        return Err(SparsityError::invalid(op, "offset list must not be empty"));
    };
    if first != 0 {
        return Err(SparsityError::dimension(
            op,
            format!("offsets must start at 0, got {first}"),
        ));
    }
    if last != dim {
        return Err(SparsityError::dimension(
            op,
            format!("offsets must end at the dimension {dim}, got {last}"),
        ));
    }
    if let Some(w) = offsets.windows(2).find(|w| w[0] > w[1]) {
        return Err(SparsityError::dimension(
            op,
            format!("offsets must be monotonic, found {} after {}", w[1], w[0]),
        ));
    }
    Ok(())
}

/// Boundaries `0, incr, 2·incr, …` followed by `dim`.
///
/// # Errors
///
/// Returns [`SparsityError::InvalidArgument`] if `incr` is zero.
pub fn stride_offsets(op: &'static str, dim: usize, incr: usize) -> Result<Vec<usize>, SparsityError> {
    if incr < 1 {
        return Err(SparsityError::invalid(op, "stride must be at least 1"));
    }
    let mut offsets: Vec<usize> = (0..dim).step_by(incr).collect();
    offsets.push(dim);
    Ok(offsets)
}

fn is_null(sp: &Sparsity) -> bool {
    sp.nrow() == 0 && sp.ncol() == 0
}

impl Sparsity {
    /// Concatenates patterns side by side.
    ///
    /// 0×0 patterns are skipped; an empty list yields a 0×0 pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if row counts differ.
    pub fn horzcat_mapped(items: &[&Sparsity]) -> Result<(Sparsity, Vec<NzRef>), SparsityError> {
        let mut kept = items.iter().enumerate().filter(|(_, sp)| !is_null(sp)).peekable();
        let Some(&(_, first)) = kept.peek() else {
            return Ok((Sparsity::empty(0, 0), Vec::new()));
        };
        let nrow = first.nrow();

        let mut colind = vec![0];
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        let mut ncol = 0;
        for (item, sp) in kept {
            if sp.nrow() != nrow {
                return Err(SparsityError::dimension(
                    "horzcat",
                    format!("operand {item} has {} rows, expected {nrow}", sp.nrow()),
                ));
            }
            let offset = row.len();
            colind.extend(sp.colind()[1..].iter().map(|&k| k + offset));
            row.extend_from_slice(sp.row());
            mapping.extend((0..sp.nnz()).map(|nz| NzRef::new(item, nz)));
            ncol += sp.ncol();
        }

        Ok((Sparsity::from_parts(nrow, ncol, colind, row), mapping))
    }

    /// Stacks patterns on top of each other.
    ///
    /// 0×0 patterns are skipped; an empty list yields a 0×0 pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if column counts differ.
    pub fn vertcat_mapped(items: &[&Sparsity]) -> Result<(Sparsity, Vec<NzRef>), SparsityError> {
        let kept: Vec<(usize, &Sparsity)> = items
            .iter()
            .enumerate()
            .filter(|(_, sp)| !is_null(sp))
            .map(|(i, sp)| (i, *sp))
            .collect();
        let Some(&(_, first)) = kept.first() else {
            return Ok((Sparsity::empty(0, 0), Vec::new()));
        };
        let ncol = first.ncol();
        if let Some((item, sp)) = kept.iter().find(|(_, sp)| sp.ncol() != ncol) {
            return Err(SparsityError::dimension(
                "vertcat",
                format!("operand {item} has {} columns, expected {ncol}", sp.ncol()),
            ));
        }
        let nrow = kept.iter().map(|(_, sp)| sp.nrow()).sum();

        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        colind.push(0);
        for c in 0..ncol {
            let mut offset = 0;
            for &(item, sp) in &kept {
                for nz in sp.column_range(c) {
                    row.push(sp.row()[nz] + offset);
                    mapping.push(NzRef::new(item, nz));
                }
                offset += sp.nrow();
            }
            colind.push(row.len());
        }

        Ok((Sparsity::from_parts(nrow, ncol, colind, row), mapping))
    }

    /// Splits into column groups at the given boundaries.
    ///
    /// # Errors
    ///
    /// See [`check_offsets`].
    pub fn horzsplit_mapped(&self, offsets: &[usize]) -> Result<Vec<SplitPiece>, SparsityError> {
        check_offsets("horzsplit", offsets, self.ncol())?;

        Ok(offsets
            .windows(2)
            .map(|w| {
                let (c0, c1) = (w[0], w[1]);
                let start = self.colind()[c0];
                let end = self.colind()[c1];
                let colind = self.colind()[c0..=c1].iter().map(|&k| k - start).collect();
                let row = self.row()[start..end].to_vec();
                (
                    Sparsity::from_parts(self.nrow(), c1 - c0, colind, row),
                    (start..end).collect(),
                )
            })
            .collect())
    }

    /// Splits into row groups at the given boundaries.
    ///
    /// # Errors
    ///
    /// See [`check_offsets`].
    pub fn vertsplit_mapped(&self, offsets: &[usize]) -> Result<Vec<SplitPiece>, SparsityError> {
        check_offsets("vertsplit", offsets, self.nrow())?;
        let npieces = offsets.len() - 1;

        let mut colinds: Vec<Vec<usize>> = vec![vec![0]; npieces];
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); npieces];
        let mut mappings: Vec<Vec<usize>> = vec![Vec::new(); npieces];
        for c in 0..self.ncol() {
            for nz in self.column_range(c) {
                let r = self.row()[nz];
                // Last group starting at or before r; empty groups share a
                // start with the next one and are skipped this way.
                let piece = offsets[..npieces].partition_point(|&o| o <= r) - 1;
                rows[piece].push(r - offsets[piece]);
                mappings[piece].push(nz);
            }
            for (colind, row) in colinds.iter_mut().zip(&rows) {
                colind.push(row.len());
            }
        }

        Ok(colinds
            .into_iter()
            .zip(rows)
            .zip(mappings)
            .enumerate()
            .map(|(piece, ((colind, row), mapping))| {
                let nrow = offsets[piece + 1] - offsets[piece];
                (Sparsity::from_parts(nrow, self.ncol(), colind, row), mapping)
            })
            .collect())
    }

    /// Places the patterns along the diagonal of a larger, otherwise empty
    /// pattern.
    #[must_use]
    pub fn blkdiag_mapped(items: &[&Sparsity]) -> (Sparsity, Vec<NzRef>) {
        let nrow = items.iter().map(|sp| sp.nrow()).sum();
        let ncol = items.iter().map(|sp| sp.ncol()).sum();

        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        colind.push(0);
        let mut row_offset = 0;
        for (item, sp) in items.iter().enumerate() {
            for c in 0..sp.ncol() {
                for nz in sp.column_range(c) {
                    row.push(sp.row()[nz] + row_offset);
                    mapping.push(NzRef::new(item, nz));
                }
                colind.push(row.len());
            }
            row_offset += sp.nrow();
        }

        (Sparsity::from_parts(nrow, ncol, colind, row), mapping)
    }

    /// Transposes the pattern.
    ///
    /// The compressed-column form is rebuilt with a counting sort over the
    /// rows. The returned mapping gives, for every nonzero of the transpose,
    /// the nonzero of `self` it came from.
    #[must_use]
    pub fn transpose_with_mapping(&self) -> (Sparsity, Vec<usize>) {
        let mut colind = vec![0; self.nrow() + 1];
        for &r in self.row() {
            colind[r + 1] += 1;
        }
        for r in 0..self.nrow() {
            colind[r + 1] += colind[r];
        }

        let mut next = colind.clone();
        let mut row = vec![0; self.nnz()];
        let mut mapping = vec![0; self.nnz()];
        for c in 0..self.ncol() {
            for nz in self.column_range(c) {
                let r = self.row()[nz];
                let slot = next[r];
                row[slot] = c;
                mapping[slot] = nz;
                next[r] += 1;
            }
        }

        (Sparsity::from_parts(self.ncol(), self.nrow(), colind, row), mapping)
    }

    /// Reinterprets the pattern with another shape, in column-major order.
    ///
    /// Nonzeros keep their storage order, so values need no permutation.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the element counts
    /// differ.
    pub fn reshape_pattern(&self, nrow: usize, ncol: usize) -> Result<Sparsity, SparsityError> {
        if nrow * ncol != self.numel() {
            return Err(SparsityError::dimension(
                "reshape",
                format!(
                    "cannot reshape {}x{} into {nrow}x{ncol}",
                    self.nrow(),
                    self.ncol()
                ),
            ));
        }
        if self.shape() == (nrow, ncol) {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(Sparsity::empty(nrow, ncol));
        }

        let mut colind = vec![0; ncol + 1];
        let mut row = Vec::with_capacity(self.nnz());
        for (r, c) in self.positions() {
            let linear = c * self.nrow() + r;
            row.push(linear % nrow);
            colind[linear / nrow + 1] += 1;
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }

        Ok(Sparsity::from_parts(nrow, ncol, colind, row))
    }
}
