//! Per-call evaluation buffers.
//!
//! A compiled [`Algorithm`] is immutable; everything an evaluation writes
//! lives in a [`Workspace`]. One workspace per thread makes concurrent
//! evaluation of the same function safe without locking.

use std::mem;

use log::trace;

use crate::algorithm::Algorithm;

/// Buffers for one evaluation: primal values, forward tangents and adjoints
/// of every instruction.
#[derive(Clone, Debug, Default)]
pub struct Workspace {
    /// `values[i]`: nonzeros of instruction `i`.
    values: Vec<Vec<f64>>,
    /// `fwd[i][d]`: tangent of instruction `i` in direction `d`.
    fwd: Vec<Vec<Vec<f64>>>,
    /// `adj[i][d]`: adjoint of instruction `i` in direction `d`.
    adj: Vec<Vec<Vec<f64>>>,
}

impl Workspace {
    /// Allocates the primal buffers of `algorithm`. Sensitivity buffers are
    /// sized on first use.
    #[must_use]
    pub fn new(algorithm: &Algorithm) -> Self {
        let values = algorithm
            .instructions()
            .iter()
            .map(|instr| vec![0.0; instr.node.nnz()])
            .collect();
        Self {
            values,
            fwd: Vec::new(),
            adj: Vec::new(),
        }
    }

    /// Returns true if the buffers match the instructions of `algorithm`.
    #[must_use]
    pub fn fits(&self, algorithm: &Algorithm) -> bool {
        self.values.len() == algorithm.len()
            && self
                .values
                .iter()
                .zip(algorithm.instructions())
                .all(|(v, instr)| v.len() == instr.node.nnz())
    }

    /// Primal values of instruction `i`.
    pub(crate) fn value(&self, i: usize) -> &[f64] {
        &self.values[i]
    }

    /// Tangent of instruction `i` in direction `d`.
    pub(crate) fn tangent(&self, i: usize, d: usize) -> &[f64] {
        &self.fwd[i][d]
    }

    /// Adjoint of instruction `i` in direction `d`.
    pub(crate) fn adjoint(&self, i: usize, d: usize) -> &[f64] {
        &self.adj[i][d]
    }

    /// Computes every instruction from the input values, in order.
    pub(crate) fn primal(&mut self, algorithm: &Algorithm, args: &[&[f64]]) {
        trace!("primal sweep over {} instructions", algorithm.len());
        for (i, instr) in algorithm.instructions().iter().enumerate() {
            let (done, rest) = self.values.split_at_mut(i);
            let (done, out) = (&*done, &mut rest[0]);
            // Inputs occupy the first instructions, in declaration order
            if i < algorithm.inputs().len() {
                out.copy_from_slice(args[i]);
                continue;
            }
            let operands: Vec<&[f64]> = instr.operands.iter().map(|&o| done[o].as_slice()).collect();
            instr.node.node().eval(&operands, out);
        }
    }

    /// Propagates `seeds[d][k]`, the tangent of input `k` in direction `d`,
    /// to every instruction. Requires a completed primal sweep.
    pub(crate) fn forward(&mut self, algorithm: &Algorithm, seeds: &[Vec<&[f64]>]) {
        let ndir = seeds.len();
        trace!("forward sweep, {ndir} directions");
        let Workspace { values, fwd, .. } = self;
        fwd.resize_with(algorithm.len(), Vec::new);

        for (i, instr) in algorithm.instructions().iter().enumerate() {
            let (done, rest) = fwd.split_at_mut(i);
            let (done, sens) = (&*done, &mut rest[0]);
            sens.resize_with(ndir, Vec::new);
            for s in sens.iter_mut() {
                s.resize(instr.node.nnz(), 0.0);
            }
            if i < algorithm.inputs().len() {
                for (s, seed) in sens.iter_mut().zip(seeds) {
                    s.copy_from_slice(seed[i]);
                }
                continue;
            }

            let args: Vec<&[f64]> = instr.operands.iter().map(|&o| values[o].as_slice()).collect();
            let operand_seeds: Vec<Vec<&[f64]>> = (0..ndir)
                .map(|d| instr.operands.iter().map(|&o| done[o][d].as_slice()).collect())
                .collect();
            instr
                .node
                .node()
                .eval_fwd(&args, &values[i], &operand_seeds, sens);
        }
    }

    /// Propagates `seeds[d][k]`, the adjoint of output `k` in direction `d`,
    /// back to every instruction. Requires a completed primal sweep.
    pub(crate) fn reverse(&mut self, algorithm: &Algorithm, seeds: &[Vec<&[f64]>]) {
        let ndir = seeds.len();
        trace!("reverse sweep, {ndir} directions");
        let Workspace { values, adj, .. } = self;
        adj.resize_with(algorithm.len(), Vec::new);
        for (a, instr) in adj.iter_mut().zip(algorithm.instructions()) {
            a.resize_with(ndir, Vec::new);
            for buf in a.iter_mut() {
                buf.clear();
                buf.resize(instr.node.nnz(), 0.0);
            }
        }
        for (d, seed) in seeds.iter().enumerate() {
            for (&o, s) in algorithm.outputs().iter().zip(seed) {
                for (a, v) in adj[o][d].iter_mut().zip(*s) {
                    *a += v;
                }
            }
        }

        for (i, instr) in algorithm.instructions().iter().enumerate().rev() {
            if instr.operands.is_empty() {
                continue;
            }
            let own = mem::take(&mut adj[i]);
            let own_refs: Vec<&[f64]> = own.iter().map(Vec::as_slice).collect();
            let args: Vec<&[f64]> = instr.operands.iter().map(|&o| values[o].as_slice()).collect();
            let operands = &instr.operands;
            instr
                .node
                .node()
                .eval_adj(&args, &values[i], &own_refs, |d, operand, nz, v| {
                    adj[operands[operand]][d][nz] += v;
                });
            adj[i] = own;
        }
    }
}
