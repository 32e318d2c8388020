//! Property-based tests for the structural algebra.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::interface::SparsityInterface;
    use crate::pattern::Sparsity;

    fn from_mask(nrow: usize, ncol: usize, mask: &[bool]) -> Sparsity {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for c in 0..ncol {
            for r in 0..nrow {
                if mask[c * nrow + r] {
                    rows.push(r);
                    cols.push(c);
                }
            }
        }
        Sparsity::triplet(nrow, ncol, &rows, &cols).unwrap().0
    }

    // Strategy for generating small patterns, including degenerate shapes
    fn pattern(max_dim: usize) -> impl Strategy<Value = Sparsity> {
        (0..=max_dim, 0..=max_dim).prop_flat_map(|(nrow, ncol)| {
            proptest::collection::vec(any::<bool>(), nrow * ncol)
                .prop_map(move |mask| from_mask(nrow, ncol, &mask))
        })
    }

    // Strategy for a pattern together with valid split offsets for each axis
    fn pattern_with_offsets() -> impl Strategy<Value = (Sparsity, Vec<usize>, Vec<usize>)> {
        pattern(6).prop_flat_map(|sp| {
            let (nrow, ncol) = sp.shape();
            (
                Just(sp),
                proptest::collection::vec(0..=nrow, 0..4),
                proptest::collection::vec(0..=ncol, 0..4),
            )
                .prop_map(move |(sp, mut vert, mut horz)| {
                    vert.push(0);
                    vert.push(nrow);
                    vert.sort_unstable();
                    horz.push(0);
                    horz.push(ncol);
                    horz.sort_unstable();
                    (sp, vert, horz)
                })
        })
    }

    fn same_rows_pair() -> impl Strategy<Value = (Sparsity, Sparsity)> {
        (1usize..5, 0usize..4, 0usize..4).prop_flat_map(|(k, m, n)| {
            (
                proptest::collection::vec(any::<bool>(), m * k).prop_map(move |mask| from_mask(m, k, &mask)),
                proptest::collection::vec(any::<bool>(), k * n).prop_map(move |mask| from_mask(k, n, &mask)),
            )
        })
    }

    proptest! {
        #[test]
        fn horzcat_inverts_horzsplit((sp, _, horz) in pattern_with_offsets()) {
            let pieces = sp.horzsplit(&horz).unwrap();
            prop_assert_eq!(pieces.len(), horz.len() - 1);
            // Only a 0x0 pattern splits into 0x0 pieces, which horzcat drops
            prop_assert_eq!(Sparsity::horzcat(&pieces).unwrap(), sp);
        }

        #[test]
        fn vertcat_inverts_vertsplit((sp, vert, _) in pattern_with_offsets()) {
            let pieces = sp.vertsplit(&vert).unwrap();
            prop_assert_eq!(pieces.len(), vert.len() - 1);
            prop_assert_eq!(Sparsity::vertcat(&pieces).unwrap(), sp);
        }

        #[test]
        fn blockcat_inverts_blocksplit((sp, vert, horz) in pattern_with_offsets()) {
            let blocks = sp.blocksplit(&vert, &horz).unwrap();
            prop_assert_eq!(Sparsity::blockcat(&blocks).unwrap(), sp);
        }

        #[test]
        fn vec_preserves_column_major_order(sp in pattern(5)) {
            let v = sp.vec().unwrap();
            prop_assert_eq!(v.shape(), (sp.numel(), 1));
            prop_assert_eq!(v.nnz(), sp.nnz());
            let expected: Vec<usize> = sp.positions().map(|(r, c)| c * sp.nrow() + r).collect();
            prop_assert_eq!(v.row(), expected.as_slice());

            let nz = sp.vecnz();
            prop_assert_eq!(nz.shape(), (sp.nnz(), 1));
            prop_assert!(nz.is_dense());
        }

        #[test]
        fn transpose_is_an_involution(sp in pattern(5)) {
            let (t, mapping) = sp.transpose_with_mapping();
            prop_assert_eq!(t.shape(), (sp.ncol(), sp.nrow()));
            prop_assert!(t.check().is_ok());
            let original: Vec<(usize, usize)> = sp.positions().collect();
            for (k, (r, c)) in t.positions().enumerate() {
                prop_assert_eq!(original[mapping[k]], (c, r));
            }
            prop_assert_eq!(SparsityInterface::transpose(&t), sp);
        }

        #[test]
        fn product_sparsity_matches_definition((x, y) in same_rows_pair()) {
            let p = x.mtimes(&y).unwrap();
            prop_assert!(p.check().is_ok());
            for i in 0..x.nrow() {
                for j in 0..y.ncol() {
                    let meets = (0..x.ncol()).any(|k| x.has_nz(i, k) && y.has_nz(k, j));
                    prop_assert_eq!(p.has_nz(i, j), meets);
                }
            }
        }

        #[test]
        fn masked_product_terms_stay_inside_mask((x, y) in same_rows_pair(), seed in any::<u64>()) {
            let full = x.mtimes(&y).unwrap();
            let mask_bits: Vec<bool> = (0..full.numel()).map(|i| (seed >> (i % 64)) & 1 == 1).collect();
            let z = from_mask(full.nrow(), full.ncol(), &mask_bits);
            let masked = x.mtimes_masked(&y, &z).unwrap();
            prop_assert!(masked.is_subset(&z));

            let terms = Sparsity::product_terms(&x, &y, &z).unwrap();
            let overlap = full.intersect(&z).unwrap();
            let touched: std::collections::BTreeSet<usize> = terms.iter().map(|t| t.out).collect();
            prop_assert_eq!(touched.len(), overlap.nnz());
        }

        #[test]
        fn blkdiag_places_blocks_on_diagonal(a in pattern(4), b in pattern(4)) {
            let d = Sparsity::blkdiag2(&a, &b).unwrap();
            prop_assert_eq!(d.shape(), (a.nrow() + b.nrow(), a.ncol() + b.ncol()));
            prop_assert_eq!(d.nnz(), a.nnz() + b.nnz());
            for (r, c) in d.positions() {
                let top_left = r < a.nrow() && c < a.ncol();
                let bottom_right = r >= a.nrow() && c >= a.ncol();
                prop_assert!(top_left || bottom_right);
                if top_left {
                    prop_assert!(a.has_nz(r, c));
                } else {
                    prop_assert!(b.has_nz(r - a.nrow(), c - a.ncol()));
                }
            }
        }
    }
}
