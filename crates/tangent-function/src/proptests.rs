//! Property-based tests for compiled evaluation.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tangent_core::{SparsityInterface, MX};

    use crate::function::Function;

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// Two inputs, outputs mixing broadcasting, products and structure.
    fn mixed() -> Function {
        let x = MX::sym("x", 3, 1);
        let s = MX::sym("s", 1, 1);
        let a = x.sin().mul(&s).unwrap().add(&x.exp()).unwrap();
        let b = x.transpose().mtimes(&a).unwrap();
        let c = MX::vertcat(&[a.cos(), s.sq()]).unwrap();
        Function::new(vec![x, s], vec![a, b, c]).unwrap()
    }

    /// Sparse structure throughout: split pieces, a block diagonal, the
    /// union of two different patterns and a masked product.
    fn structured() -> Function {
        let x = MX::sym("x", 4, 1);
        let s = MX::sym("s", 1, 1);
        let pieces = x.vertsplit(&[0, 2, 4]).unwrap();
        let (p0, p1) = (&pieces[0], &pieces[1]);

        let target = MX::blkdiag(&[s.clone(), s.sin()]).unwrap();
        let masked = p0.mtimes_masked(&p1.transpose(), &target).unwrap();
        let bd = MX::blkdiag(&[p0.clone(), p1.transpose()]).unwrap();
        let union = bd.add(&bd.transpose().sin()).unwrap();
        let g = p0.transpose().mtimes(p1).unwrap().mul(&s).unwrap();
        Function::new(vec![x, s], vec![masked, union, g]).unwrap()
    }

    /// Splits `w` into consecutive slices of the given lengths.
    fn chunks<'a>(w: &'a [f64], sizes: &[usize]) -> Vec<&'a [f64]> {
        let mut rest = w;
        sizes
            .iter()
            .map(|&n| {
                let (head, tail) = rest.split_at(n);
                rest = tail;
                head
            })
            .collect()
    }

    fn values(n: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-2.0f64..2.0, n)
    }

    proptest! {
        #[test]
        fn adjoint_is_transpose_of_forward(
            x in values(3),
            s in -2.0f64..2.0,
            dx in values(3),
            ds in -1.0f64..1.0,
            wa in values(3),
            wb in -1.0f64..1.0,
            wc in values(4),
        ) {
            let f = mixed();
            let res = f
                .eval_with(
                    &[x.as_slice(), &[s]],
                    &[vec![dx.as_slice(), &[ds][..]]],
                    &[vec![wa.as_slice(), &[wb][..], wc.as_slice()]],
                )
                .unwrap();

            let lhs = dot(&wa, &res.fwd_sens[0][0])
                + wb * res.fwd_sens[0][1][0]
                + dot(&wc, &res.fwd_sens[0][2]);
            let rhs = dot(&res.adj_sens[0][0], &dx) + res.adj_sens[0][1][0] * ds;
            prop_assert!((lhs - rhs).abs() <= 1e-9 * (1.0 + lhs.abs()), "{lhs} vs {rhs}");
        }

        #[test]
        fn symbolic_jacobian_matches_forward_sweep(
            x in values(3),
            s in -2.0f64..2.0,
            k in 0usize..3,
        ) {
            let f = mixed();
            let jac = f.jacobian(0, 0).unwrap();
            let jac_nz = jac.eval(&[x.as_slice(), &[s]]).unwrap().remove(0);
            let pattern = jac.output(0).unwrap().sparsity().clone();

            let mut seed = vec![0.0; 3];
            seed[k] = 1.0;
            let res = f.eval_with(&[x.as_slice(), &[s]], &[vec![seed.as_slice(), &[0.0][..]]], &[]).unwrap();

            let mut column = vec![0.0; 3];
            for ((r, c), v) in pattern.positions().zip(&jac_nz) {
                if c == k {
                    column[r] = *v;
                }
            }
            for (a, b) in column.iter().zip(&res.fwd_sens[0][0]) {
                prop_assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()), "{a} vs {b}");
            }
        }

        #[test]
        fn structured_adjoint_is_transpose_of_forward(
            x in values(4),
            s in -2.0f64..2.0,
            dx in values(4),
            ds in -1.0f64..1.0,
            w in values(16),
        ) {
            let f = structured();
            let sizes: Vec<usize> = f.outputs().iter().map(|o| o.nnz()).collect();
            prop_assert!(sizes.iter().sum::<usize>() <= w.len());
            let weights = chunks(&w, &sizes);
            let res = f
                .eval_with(&[x.as_slice(), &[s]], &[vec![dx.as_slice(), &[ds][..]]], &[weights.clone()])
                .unwrap();

            let lhs: f64 = weights.iter().zip(&res.fwd_sens[0]).map(|(w, t)| dot(w, t)).sum();
            let rhs = dot(&res.adj_sens[0][0], &dx) + res.adj_sens[0][1][0] * ds;
            prop_assert!((lhs - rhs).abs() <= 1e-9 * (1.0 + lhs.abs()), "{lhs} vs {rhs}");
        }

        #[test]
        fn structured_jacobian_matches_forward_sweep(
            x in values(4),
            s in -2.0f64..2.0,
            j in 0usize..2,
            k in 0usize..3,
            c in 0usize..4,
        ) {
            let f = structured();
            let n = f.input(j).unwrap().nnz();
            let c = c % n;
            let jac = f.jacobian(j, k).unwrap();
            let jac_nz = jac.eval(&[x.as_slice(), &[s]]).unwrap().remove(0);
            let pattern = jac.output(0).unwrap().sparsity().clone();
            prop_assert_eq!(pattern.shape(), (f.output(k).unwrap().nnz(), n));

            let mut seeds = vec![vec![0.0; 4], vec![0.0; 1]];
            seeds[j][c] = 1.0;
            let res = f
                .eval_with(&[x.as_slice(), &[s]], &[vec![seeds[0].as_slice(), seeds[1].as_slice()]], &[])
                .unwrap();

            let mut column = vec![0.0; pattern.nrow()];
            for ((r, col), v) in pattern.positions().zip(&jac_nz) {
                if col == c {
                    column[r] = *v;
                }
            }
            for (a, b) in column.iter().zip(&res.fwd_sens[0][k]) {
                prop_assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()), "{a} vs {b}");
            }
        }

        #[test]
        fn hessian_of_structured_scalar_is_symmetric(x in values(4), s in -2.0f64..2.0) {
            let f = structured();
            let hess = f.hessian(0, 2).unwrap();
            let nz = hess.eval(&[x.as_slice(), &[s]]).unwrap().remove(0);
            let mut d = [[0.0; 4]; 4];
            for ((r, c), v) in hess.output(0).unwrap().sparsity().positions().zip(&nz) {
                d[r][c] = *v;
            }
            for r in 0..4 {
                for c in 0..4 {
                    prop_assert!((d[r][c] - d[c][r]).abs() <= 1e-12);
                }
                // x0 x2 + x1 x3 has no second derivative in a single variable
                prop_assert!(d[r][r].abs() <= 1e-12);
            }
            prop_assert!((d[0][2] - s).abs() <= 1e-12);
        }
    }
}
