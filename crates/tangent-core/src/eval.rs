//! Numeric evaluation of a single node.
//!
//! All buffers hold one value per structural nonzero. Operand buffers are
//! passed in operand order; the caller sizes every buffer from the
//! patterns, so the slices here are trusted.
//!
//! An elementwise operand with a single nonzero is broadcast over the
//! node's nonzeros.

use tangent_sparsity::ProductTerm;

use crate::node::{Node, Operation};
use crate::registry::registry;

#[inline]
fn at(values: &[f64], k: usize) -> f64 {
    if values.len() == 1 {
        values[0]
    } else {
        values[k]
    }
}

#[inline]
fn broadcast_index(values: &[f64], k: usize) -> usize {
    if values.len() == 1 {
        0
    } else {
        k
    }
}

impl Node {
    /// Computes the node's nonzeros from its operands' nonzeros.
    ///
    /// Symbols are never evaluated here; their values are provided by the
    /// caller. `out` is overwritten.
    pub fn eval(&self, args: &[&[f64]], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.sparsity.nnz());
        match &self.op {
            Operation::Symbol { .. } => out.fill(0.0),
            Operation::Constant { values } => out.copy_from_slice(values),
            Operation::Unary(op) => {
                let f = registry().info(*op).eval;
                for (o, &x) in out.iter_mut().zip(args[0]) {
                    *o = f(x, 0.0);
                }
            }
            Operation::Binary(op) => {
                let f = registry().info(*op).eval;
                let (x, y) = (args[0], args[1]);
                for (k, o) in out.iter_mut().enumerate() {
                    *o = f(at(x, k), at(y, k));
                }
            }
            Operation::Gather { sources, .. } => {
                for (o, src) in out.iter_mut().zip(sources.iter()) {
                    *o = src.map_or(0.0, |s| args[s.item][s.nz]);
                }
            }
            Operation::Mtimes { terms, masked } => {
                if *masked {
                    out.copy_from_slice(args[2]);
                } else {
                    out.fill(0.0);
                }
                for &ProductTerm { out: k, x, y } in terms.iter() {
                    out[k] += args[0][x] * args[1][y];
                }
            }
        }
    }

    /// Forward (tangent) propagation for several directions at once.
    ///
    /// `seeds[d][i]` is the tangent of operand `i` in direction `d`;
    /// `sens[d]` receives the node's tangent. Partial derivatives are
    /// evaluated once per nonzero and reused for every direction.
    pub fn eval_fwd(&self, args: &[&[f64]], out: &[f64], seeds: &[Vec<&[f64]>], sens: &mut [Vec<f64>]) {
        debug_assert_eq!(seeds.len(), sens.len());
        match &self.op {
            Operation::Symbol { .. } | Operation::Constant { .. } => {
                for s in sens.iter_mut() {
                    s.fill(0.0);
                }
            }
            Operation::Unary(op) => {
                let partials = registry().info(*op).partials;
                for (k, (&x, &f)) in args[0].iter().zip(out).enumerate() {
                    let [dx, _] = partials(x, 0.0, f);
                    for (seed, s) in seeds.iter().zip(sens.iter_mut()) {
                        s[k] = dx * seed[0][k];
                    }
                }
            }
            Operation::Binary(op) => {
                let partials = registry().info(*op).partials;
                let (x, y) = (args[0], args[1]);
                for (k, &f) in out.iter().enumerate() {
                    let (xi, yi) = (broadcast_index(x, k), broadcast_index(y, k));
                    let [dx, dy] = partials(x[xi], y[yi], f);
                    for (seed, s) in seeds.iter().zip(sens.iter_mut()) {
                        s[k] = dx * seed[0][xi] + dy * seed[1][yi];
                    }
                }
            }
            Operation::Gather { sources, .. } => {
                for (seed, s) in seeds.iter().zip(sens.iter_mut()) {
                    for (o, src) in s.iter_mut().zip(sources.iter()) {
                        *o = src.map_or(0.0, |r| seed[r.item][r.nz]);
                    }
                }
            }
            Operation::Mtimes { terms, masked } => {
                let (x, y) = (args[0], args[1]);
                for (seed, s) in seeds.iter().zip(sens.iter_mut()) {
                    if *masked {
                        s.copy_from_slice(seed[2]);
                    } else {
                        s.fill(0.0);
                    }
                    let (dx, dy) = (seed[0], seed[1]);
                    for t in terms.iter() {
                        s[t.out] += dx[t.x] * y[t.y] + x[t.x] * dy[t.y];
                    }
                }
            }
        }
    }

    /// Reverse (adjoint) propagation for several directions at once.
    ///
    /// `seeds[d]` is the adjoint of the node's output in direction `d`.
    /// Every contribution is handed to `accumulate(d, operand, nz, value)`,
    /// which must add it to the operand's adjoint. Zero seeds are not
    /// skipped, so non-finite partials propagate.
    pub fn eval_adj<F>(&self, args: &[&[f64]], out: &[f64], seeds: &[&[f64]], mut accumulate: F)
    where
        F: FnMut(usize, usize, usize, f64),
    {
        match &self.op {
            Operation::Symbol { .. } | Operation::Constant { .. } => {}
            Operation::Unary(op) => {
                let partials = registry().info(*op).partials;
                for (k, (&x, &f)) in args[0].iter().zip(out).enumerate() {
                    let [dx, _] = partials(x, 0.0, f);
                    for (d, seed) in seeds.iter().enumerate() {
                        accumulate(d, 0, k, dx * seed[k]);
                    }
                }
            }
            Operation::Binary(op) => {
                let partials = registry().info(*op).partials;
                let (x, y) = (args[0], args[1]);
                for (k, &f) in out.iter().enumerate() {
                    let (xi, yi) = (broadcast_index(x, k), broadcast_index(y, k));
                    let [dx, dy] = partials(x[xi], y[yi], f);
                    for (d, seed) in seeds.iter().enumerate() {
                        accumulate(d, 0, xi, dx * seed[k]);
                        accumulate(d, 1, yi, dy * seed[k]);
                    }
                }
            }
            Operation::Gather { sources, .. } => {
                for (d, seed) in seeds.iter().enumerate() {
                    for (&s, src) in seed.iter().zip(sources.iter()) {
                        if let Some(r) = src {
                            accumulate(d, r.item, r.nz, s);
                        }
                    }
                }
            }
            Operation::Mtimes { terms, masked } => {
                let (x, y) = (args[0], args[1]);
                for (d, seed) in seeds.iter().enumerate() {
                    for t in terms.iter() {
                        accumulate(d, 0, t.x, seed[t.out] * y[t.y]);
                        accumulate(d, 1, t.y, seed[t.out] * x[t.x]);
                    }
                    if *masked {
                        for (k, &s) in seed.iter().enumerate() {
                            accumulate(d, 2, k, s);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use tangent_sparsity::{Sparsity, SparsityInterface};

    use crate::mx::MX;

    fn eval(x: &MX, args: &[&[f64]]) -> Vec<f64> {
        let mut out = vec![0.0; x.nnz()];
        x.node().eval(args, &mut out);
        out
    }

    #[test]
    fn test_binary_broadcast() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym("y", 2, 1);
        let z = x.add(&y).unwrap();
        assert_eq!(eval(&z, &[&[2.0], &[3.0, 5.0]]), vec![5.0, 7.0]);
    }

    #[test]
    fn test_gather_explicit_zeros() {
        let x = MX::sym_sparse("x", Sparsity::diag(2));
        let d = x.densify();
        assert_eq!(eval(&d, &[&[4.0, 6.0]]), vec![4.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn test_mtimes_values() {
        let a = MX::sym("a", 2, 2);
        let b = MX::sym("b", 2, 1);
        let p = a.mtimes(&b).unwrap();
        // a = [1 3; 2 4] column-major
        assert_eq!(eval(&p, &[&[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0]]), vec![4.0, 6.0]);

        let z = MX::sym_sparse("z", Sparsity::diag(2));
        let c = MX::sym("c", 2, 2);
        let m = a.mtimes_masked(&c, &z).unwrap();
        let ident = [1.0, 0.0, 0.0, 1.0];
        // diag(a * I) + [10, 20]
        assert_eq!(eval(&m, &[&[1.0, 2.0, 3.0, 4.0], &ident, &[10.0, 20.0]]), vec![11.0, 24.0]);
    }

    #[test]
    fn test_forward_matches_finite_differences() {
        let x = MX::sym("x", 2, 1);
        let y = MX::sym("y", 1, 1);
        let f = x.sin().mul(&y).unwrap();

        let sine = f.dep(0);
        let xv = [0.3, 1.1];
        let yv = [2.0];
        let s = eval(sine, &[&xv]);
        let out = eval(&f, &[&s, &yv]);

        // Direction on x only, through the sine node first
        let dx = [1.0, -0.5];
        let mut ds = vec![vec![0.0; 2]];
        sine.node().eval_fwd(&[&xv], &s, &[vec![&dx[..]]], &mut ds);
        let dy = [0.0];
        let mut dout = vec![vec![0.0; 2]];
        f.node().eval_fwd(&[&s, &yv], &out, &[vec![ds[0].as_slice(), &dy[..]]], &mut dout);

        let h = 1e-7;
        let shifted: Vec<f64> = xv.iter().zip(&dx).map(|(a, b)| a + h * b).collect();
        let s2 = eval(sine, &[&shifted]);
        let out2 = eval(&f, &[&s2, &yv]);
        for k in 0..2 {
            assert_abs_diff_eq!(dout[0][k], (out2[k] - out[k]) / h, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_adjoint_accumulates_broadcast_operand() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym("y", 2, 1);
        let z = x.add(&y).unwrap();
        let out = eval(&z, &[&[2.0], &[3.0, 5.0]]);

        let mut adj = [vec![0.0], vec![0.0, 0.0]];
        z.node().eval_adj(&[&[2.0], &[3.0, 5.0]], &out, &[&[1.0, 1.0]], |_, i, k, v| {
            adj[i][k] += v;
        });
        assert_eq!(adj[0], vec![2.0]);
        assert_eq!(adj[1], vec![1.0, 1.0]);
    }

    #[test]
    fn test_adjoint_of_product_is_transpose() {
        let a = MX::sym("a", 2, 2);
        let b = MX::sym("b", 2, 1);
        let p = a.mtimes(&b).unwrap();
        let (av, bv) = ([1.0, 2.0, 3.0, 4.0], [5.0, 6.0]);
        let out = eval(&p, &[&av, &bv]);

        let mut adj = [vec![0.0; 4], vec![0.0; 2]];
        p.node().eval_adj(&[&av, &bv], &out, &[&[1.0, 0.0]], |_, i, k, v| {
            adj[i][k] += v;
        });
        // d(p0)/db = first row of a
        assert_eq!(adj[1], vec![1.0, 3.0]);
        // d(p0)/da = b placed in row 0
        assert_eq!(adj[0], vec![5.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    fn test_nan_propagates_through_adjoint() {
        let x = MX::sym("x", 1, 1);
        let l = x.log();
        let out = eval(&l, &[&[0.0]]);
        let mut adj = 0.0;
        l.node().eval_adj(&[&[0.0]], &out, &[&[0.0]], |_, _, _, v| adj += v);
        // 0 * inf
        assert!(adj.is_nan());
    }
}
