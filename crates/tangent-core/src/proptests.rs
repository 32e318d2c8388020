//! Property-based tests for expression evaluation and differentiation.

#[cfg(test)]
mod tests {
    use approx::abs_diff_eq;
    use proptest::prelude::*;

    use crate::mx::MX;
    use crate::opcode::OpCode;
    use tangent_sparsity::{Sparsity, SparsityInterface};

    /// Primal values and one forward tangent of `e`, given those of `x`.
    fn eval_fwd(e: &MX, x: &MX, xv: &[f64], dx: &[f64]) -> (Vec<f64>, Vec<f64>) {
        if e.is_same(x) {
            return (xv.to_vec(), dx.to_vec());
        }
        let (values, tangents): (Vec<Vec<f64>>, Vec<Vec<f64>>) =
            e.deps().iter().map(|d| eval_fwd(d, x, xv, dx)).unzip();
        let args: Vec<&[f64]> = values.iter().map(Vec::as_slice).collect();
        let seeds: Vec<&[f64]> = tangents.iter().map(Vec::as_slice).collect();
        let mut out = vec![0.0; e.nnz()];
        e.node().eval(&args, &mut out);
        let mut sens = vec![vec![0.0; e.nnz()]];
        e.node().eval_fwd(&args, &out, &[seeds], &mut sens);
        (out, sens.remove(0))
    }

    fn jacobian(e: &MX, x: &MX) -> MX {
        if e.is_same(x) {
            return MX::eye(x.nnz());
        }
        let jac: Vec<MX> = e.deps().iter().map(|d| jacobian(d, x)).collect();
        e.ad_forward(&jac, x.nnz()).unwrap()
    }

    fn apply(e: &MX, x: &MX, step: u8) -> MX {
        match step % 8 {
            0 => e.sin(),
            1 => e.cos(),
            2 => e.mul(x).unwrap(),
            3 => e.add(&MX::scalar(1.5)).unwrap(),
            4 => e.sq().add(&MX::scalar(1.0)).unwrap().sqrt(),
            5 => e.sq().add(&MX::scalar(1.0)).unwrap().log(),
            6 => e.div(&x.exp()).unwrap(),
            _ => e.sub(&x.binary(OpCode::Mul, &MX::scalar(0.5)).unwrap()).unwrap(),
        }
    }

    proptest! {
        #[test]
        fn graph_jacobian_matches_forward_sweep(
            steps in proptest::collection::vec(any::<u8>(), 1..6),
            xv in proptest::collection::vec(-2.0f64..2.0, 3),
        ) {
            let x = MX::sym("x", 3, 1);
            let e = steps.iter().fold(x.clone(), |e, &s| apply(&e, &x, s));

            let j = jacobian(&e, &x).densify();
            let (jv, _) = eval_fwd(&j, &x, &xv, &[0.0; 3]);
            prop_assert_eq!(jv.len(), e.nnz() * 3);

            for col in 0..3 {
                let mut dx = [0.0; 3];
                dx[col] = 1.0;
                let (_, tangent) = eval_fwd(&e, &x, &xv, &dx);
                for (row, t) in tangent.iter().enumerate() {
                    let symbolic = jv[col * e.nnz() + row];
                    prop_assert!(abs_diff_eq!(symbolic, *t, epsilon = 1e-9 * (1.0 + t.abs())), "{} vs {}", symbolic, t);
                }
            }
        }

        #[test]
        fn split_then_concat_preserves_values(
            (nrow, ncol, mask) in (1usize..5, 1usize..5)
                .prop_flat_map(|(m, n)| (Just(m), Just(n), proptest::collection::vec(any::<bool>(), m * n))),
            incr in 1usize..4,
        ) {
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
            let (sp, _) = Sparsity::triplet(nrow, ncol, &rows, &cols).unwrap();
            let x = MX::sym_sparse("x", sp.clone());
            let xv: Vec<f64> = (0..sp.nnz()).map(|k| k as f64 + 1.0).collect();

            let horz = MX::horzcat(&x.horzsplit_incr(incr).unwrap()).unwrap();
            let vert = MX::vertcat(&x.vertsplit_incr(incr).unwrap()).unwrap();
            let flipped = x.transpose().transpose();
            for e in [horz, vert, flipped] {
                prop_assert_eq!(e.sparsity(), &sp);
                let (values, _) = eval_fwd(&e, &x, &xv, &vec![0.0; xv.len()]);
                prop_assert_eq!(values, xv.clone());
            }
        }
    }
}
