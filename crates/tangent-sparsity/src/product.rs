//! Structural matrix products.
//!
//! The sparsity of `X * Y` is derived from index lists alone, before any
//! value is multiplied. The contributing index triples are enumerated once
//! so that numeric products (and their derivatives) only loop over entries
//! that actually meet.

use crate::error::SparsityError;
use crate::pattern::Sparsity;

/// One scalar product contributing to a matrix product: nonzero `x` of the
/// left factor times nonzero `y` of the right factor, added into nonzero
/// `out` of the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProductTerm {
    /// Nonzero index in the result.
    pub out: usize,
    /// Nonzero index in the left factor.
    pub x: usize,
    /// Nonzero index in the right factor.
    pub y: usize,
}

fn check_inner(x: &Sparsity, y: &Sparsity) -> Result<(), SparsityError> {
    if x.ncol() != y.nrow() {
        return Err(SparsityError::dimension(
            "mtimes",
            format!(
                "inner dimensions differ: {}x{} times {}x{}",
                x.nrow(),
                x.ncol(),
                y.nrow(),
                y.ncol()
            ),
        ));
    }
    Ok(())
}

impl Sparsity {
    /// Sparsity of the matrix product `self * y`.
    ///
    /// Entry (i, j) is nonzero iff some k has (i, k) nonzero in `self` and
    /// (k, j) nonzero in `y`.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the inner dimensions
    /// differ.
    pub fn mtimes_pattern(&self, y: &Sparsity) -> Result<Sparsity, SparsityError> {
        check_inner(self, y)?;

        let nrow = self.nrow();
        let mut marker = vec![usize::MAX; nrow];
        let mut colind = Vec::with_capacity(y.ncol() + 1);
        let mut row = Vec::new();
        colind.push(0);
        for j in 0..y.ncol() {
            let start = row.len();
            for ky in y.column_range(j) {
                let k = y.row()[ky];
                for kx in self.column_range(k) {
                    let i = self.row()[kx];
                    if marker[i] != j {
                        marker[i] = j;
                        row.push(i);
                    }
                }
            }
            row[start..].sort_unstable();
            colind.push(row.len());
        }

        Ok(Sparsity::from_parts(nrow, y.ncol(), colind, row))
    }

    /// Sparsity of `z + self * y` restricted to `z`: this is `z` itself,
    /// after checking that all three shapes fit together.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the inner dimensions
    /// differ or `z` does not have the shape of the product.
    pub fn mtimes_masked_pattern(&self, y: &Sparsity, z: &Sparsity) -> Result<Sparsity, SparsityError> {
        check_inner(self, y)?;
        if z.shape() != (self.nrow(), y.ncol()) {
            return Err(SparsityError::dimension(
                "mtimes",
                format!(
                    "target is {}x{} but the product is {}x{}",
                    z.nrow(),
                    z.ncol(),
                    self.nrow(),
                    y.ncol()
                ),
            ));
        }
        Ok(z.clone())
    }

    /// Enumerates the scalar products needed to fill `out`, a pattern of the
    /// product's shape.
    ///
    /// Only entries of `out` are considered, so passing a mask yields
    /// exactly the products that can affect it. Terms are ordered by output
    /// column.
    ///
    /// # Errors
    ///
    /// Returns [`SparsityError::DimensionMismatch`] if the shapes do not fit.
    pub fn product_terms(x: &Sparsity, y: &Sparsity, out: &Sparsity) -> Result<Vec<ProductTerm>, SparsityError> {
        x.mtimes_masked_pattern(y, out)?;

        let mut slot = vec![usize::MAX; x.nrow()];
        let mut terms = Vec::new();
        for j in 0..y.ncol() {
            for nz in out.column_range(j) {
                slot[out.row()[nz]] = nz;
            }
            for ky in y.column_range(j) {
                let k = y.row()[ky];
                for kx in x.column_range(k) {
                    let target = slot[x.row()[kx]];
                    if target != usize::MAX {
                        terms.push(ProductTerm {
                            out: target,
                            x: kx,
                            y: ky,
                        });
                    }
                }
            }
            for nz in out.column_range(j) {
                slot[out.row()[nz]] = usize::MAX;
            }
        }
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diag_times_dense() {
        let d = Sparsity::diag(3);
        let a = Sparsity::dense(3, 2);
        assert_eq!(d.mtimes_pattern(&a).unwrap(), a);
    }

    #[test]
    fn test_outer_product_is_dense() {
        let col = Sparsity::dense(3, 1);
        let row = Sparsity::dense(1, 4);
        assert_eq!(col.mtimes_pattern(&row).unwrap(), Sparsity::dense(3, 4));
        // Inner product
        assert_eq!(row.mtimes_pattern(&Sparsity::dense(4, 1)).unwrap(), Sparsity::scalar());
    }

    #[test]
    fn test_structurally_disjoint_product_is_empty() {
        // x has only column 0, y has only row 1
        let (x, _) = Sparsity::triplet(2, 2, &[0, 1], &[0, 0]).unwrap();
        let (y, _) = Sparsity::triplet(2, 2, &[1], &[1]).unwrap();
        let p = x.mtimes_pattern(&y).unwrap();
        assert_eq!(p.shape(), (2, 2));
        assert!(p.is_empty());
    }

    #[test]
    fn test_rows_sorted_within_column() {
        // Anti-diagonal times dense column: hits rows in reverse order
        let (x, _) = Sparsity::triplet(3, 3, &[2, 1, 0], &[0, 1, 2]).unwrap();
        let p = x.mtimes_pattern(&Sparsity::dense(3, 1)).unwrap();
        assert_eq!(p.row(), &[0, 1, 2]);
        assert!(p.check().is_ok());
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        let err = Sparsity::dense(2, 3).mtimes_pattern(&Sparsity::dense(2, 3)).unwrap_err();
        assert!(matches!(err, SparsityError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_masked_pattern_is_target() {
        let x = Sparsity::dense(2, 2);
        let z = Sparsity::diag(2);
        assert_eq!(x.mtimes_masked_pattern(&x, &z).unwrap(), z);
        assert!(x.mtimes_masked_pattern(&x, &Sparsity::diag(3)).is_err());
    }

    #[test]
    fn test_product_terms_dense() {
        let x = Sparsity::dense(2, 2);
        let y = Sparsity::dense(2, 1);
        let out = x.mtimes_pattern(&y).unwrap();
        let terms = Sparsity::product_terms(&x, &y, &out).unwrap();
        // out(0) = x(0,0) y(0) + x(0,1) y(1), out(1) = x(1,0) y(0) + x(1,1) y(1)
        assert_eq!(terms.len(), 4);
        assert!(terms.contains(&ProductTerm { out: 0, x: 0, y: 0 }));
        assert!(terms.contains(&ProductTerm { out: 0, x: 2, y: 1 }));
        assert!(terms.contains(&ProductTerm { out: 1, x: 1, y: 0 }));
        assert!(terms.contains(&ProductTerm { out: 1, x: 3, y: 1 }));
    }

    #[test]
    fn test_product_terms_masked() {
        let x = Sparsity::dense(2, 2);
        let z = Sparsity::diag(2);
        let terms = Sparsity::product_terms(&x, &x, &z).unwrap();
        // Only the diagonal of x*x: two terms per diagonal entry
        assert_eq!(terms.len(), 4);
        assert!(terms.iter().all(|t| t.out < 2));
    }
}
