//! Compiled functions.

use std::sync::Arc;

use log::debug;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tangent_core::{ExprCache, MX};

use crate::algorithm::Algorithm;
use crate::error::FunctionError;
use crate::options::FunctionOptions;
use crate::workspace::Workspace;

/// A function from symbolic inputs to expressions, compiled on first use.
///
/// Cloning is cheap and clones share the compiled algorithm. Evaluation
/// never mutates the function; buffers live in a [`Workspace`].
#[derive(Clone, Debug)]
pub struct Function {
    inputs: Vec<MX>,
    outputs: Vec<MX>,
    options: FunctionOptions,
    algorithm: OnceCell<Arc<Algorithm>>,
}

/// Results of one evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    /// `outputs[k]`: nonzeros of output `k`.
    pub outputs: Vec<Vec<f64>>,
    /// `fwd_sens[d][k]`: tangent of output `k` in direction `d`.
    pub fwd_sens: Vec<Vec<Vec<f64>>>,
    /// `adj_sens[d][j]`: adjoint of input `j` in direction `d`.
    pub adj_sens: Vec<Vec<Vec<f64>>>,
}

impl Function {
    /// Creates a function with default options.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if an input is not a
    /// symbol or appears twice.
    pub fn new(inputs: Vec<MX>, outputs: Vec<MX>) -> Result<Self, FunctionError> {
        Self::with_options(inputs, outputs, FunctionOptions::default())
    }

    /// Creates a function with the given options.
    ///
    /// # Errors
    ///
    /// See [`Function::new`].
    pub fn with_options(inputs: Vec<MX>, outputs: Vec<MX>, options: FunctionOptions) -> Result<Self, FunctionError> {
        let mut seen = FxHashSet::default();
        for (i, input) in inputs.iter().enumerate() {
            if !input.is_symbolic() {
                return Err(FunctionError::InvalidArgument(format!(
                    "input {i} of {} is not a symbol: {input}",
                    options.name
                )));
            }
            if !seen.insert(input.id()) {
                return Err(FunctionError::InvalidArgument(format!(
                    "input {i} of {} repeats an earlier input",
                    options.name
                )));
            }
        }

        let outputs = if options.cse {
            ExprCache::new().canonicalize_all(&outputs)
        } else {
            outputs
        };

        Ok(Self {
            inputs,
            outputs,
            options,
            algorithm: OnceCell::new(),
        })
    }

    /// Compiles now instead of on first evaluation.
    ///
    /// # Errors
    ///
    /// See [`Function::algorithm`].
    pub fn init(&self) -> Result<&Algorithm, FunctionError> {
        self.algorithm()
    }

    /// The compiled instruction list, compiling it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if an output depends on a
    /// symbol that is not an input.
    pub fn algorithm(&self) -> Result<&Algorithm, FunctionError> {
        let algorithm = self.algorithm.get_or_try_init(|| {
            let algorithm = Algorithm::compile(&self.inputs, &self.outputs)?;
            algorithm.log_summary(&self.options.name);
            Ok::<_, FunctionError>(Arc::new(algorithm))
        })?;
        Ok(algorithm.as_ref())
    }

    /// A workspace sized for this function.
    ///
    /// # Errors
    ///
    /// See [`Function::algorithm`].
    pub fn workspace(&self) -> Result<Workspace, FunctionError> {
        Ok(Workspace::new(self.algorithm()?))
    }

    /// Number of inputs.
    #[must_use]
    pub fn n_in(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs.
    #[must_use]
    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    /// The `i`-th input symbol.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if `i` is out of range.
    pub fn input(&self, i: usize) -> Result<&MX, FunctionError> {
        self.inputs.get(i).ok_or_else(|| {
            FunctionError::InvalidArgument(format!("{} has {} inputs, asked for input {i}", self.name(), self.n_in()))
        })
    }

    /// The `i`-th output expression.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if `i` is out of range.
    pub fn output(&self, i: usize) -> Result<&MX, FunctionError> {
        self.outputs.get(i).ok_or_else(|| {
            FunctionError::InvalidArgument(format!("{} has {} outputs, asked for output {i}", self.name(), self.n_out()))
        })
    }

    /// All input symbols.
    #[must_use]
    pub fn inputs(&self) -> &[MX] {
        &self.inputs
    }

    /// All output expressions.
    #[must_use]
    pub fn outputs(&self) -> &[MX] {
        &self.outputs
    }

    /// The function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// The options the function was created with.
    #[must_use]
    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    /// Evaluates the outputs.
    ///
    /// `args[j]` holds the nonzeros of input `j`.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::ArgumentError`] if the number of arguments or
    /// the length of one of them is wrong, and compilation errors.
    pub fn eval(&self, args: &[&[f64]]) -> Result<Vec<Vec<f64>>, FunctionError> {
        Ok(self.eval_with(args, &[], &[])?.outputs)
    }

    /// Evaluates the outputs together with forward and adjoint
    /// sensitivities.
    ///
    /// `fwd_seeds[d][j]` is the tangent of input `j` in direction `d`;
    /// `adj_seeds[d][k]` is the adjoint of output `k` in direction `d`.
    ///
    /// # Errors
    ///
    /// See [`Function::eval`]; seeds are checked the same way.
    pub fn eval_with(
        &self,
        args: &[&[f64]],
        fwd_seeds: &[Vec<&[f64]>],
        adj_seeds: &[Vec<&[f64]>],
    ) -> Result<Evaluation, FunctionError> {
        let mut workspace = self.workspace()?;
        self.eval_in(&mut workspace, args, fwd_seeds, adj_seeds)
    }

    /// Like [`Function::eval_with`], with caller-owned buffers.
    ///
    /// Every argument is validated before the workspace is touched.
    ///
    /// # Errors
    ///
    /// Also returns [`FunctionError::ArgumentError`] if `workspace` was not
    /// created for this function.
    pub fn eval_in(
        &self,
        workspace: &mut Workspace,
        args: &[&[f64]],
        fwd_seeds: &[Vec<&[f64]>],
        adj_seeds: &[Vec<&[f64]>],
    ) -> Result<Evaluation, FunctionError> {
        let algorithm = self.algorithm()?;
        check_buffers("argument", "input", args, &self.inputs)?;
        for (d, seeds) in fwd_seeds.iter().enumerate() {
            check_buffers(&format!("forward seed {d}"), "input", seeds, &self.inputs)?;
        }
        for (d, seeds) in adj_seeds.iter().enumerate() {
            check_buffers(&format!("adjoint seed {d}"), "output", seeds, &self.outputs)?;
        }
        if !workspace.fits(algorithm) {
            return Err(FunctionError::ArgumentError(format!(
                "workspace was not created for {}",
                self.name()
            )));
        }

        workspace.primal(algorithm, args);
        if !fwd_seeds.is_empty() {
            workspace.forward(algorithm, fwd_seeds);
        }
        if !adj_seeds.is_empty() {
            workspace.reverse(algorithm, adj_seeds);
        }

        let outputs = algorithm
            .outputs()
            .iter()
            .map(|&o| workspace.value(o).to_vec())
            .collect();
        let fwd_sens = (0..fwd_seeds.len())
            .map(|d| {
                algorithm
                    .outputs()
                    .iter()
                    .map(|&o| workspace.tangent(o, d).to_vec())
                    .collect()
            })
            .collect();
        let adj_sens = (0..adj_seeds.len())
            .map(|d| {
                algorithm
                    .inputs()
                    .iter()
                    .map(|&i| workspace.adjoint(i, d).to_vec())
                    .collect()
            })
            .collect();
        Ok(Evaluation {
            outputs,
            fwd_sens,
            adj_sens,
        })
    }

    /// Applies the function to symbolic arguments.
    ///
    /// The compiled instructions are replayed with `args[j]` in place of
    /// input `j`. Nodes none of whose operands changed are shared with the
    /// function's own graph. An argument with the input's shape but another
    /// pattern is projected onto the input's pattern.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::ArgumentError`] if the number of arguments
    /// or the shape of one of them is wrong, and compilation errors.
    pub fn call(&self, args: &[MX]) -> Result<Vec<MX>, FunctionError> {
        let algorithm = self.algorithm()?;
        if args.len() != self.n_in() {
            return Err(FunctionError::ArgumentError(format!(
                "call: {} takes {} arguments, got {}",
                self.name(),
                self.n_in(),
                args.len()
            )));
        }

        let mut values: Vec<MX> = Vec::with_capacity(algorithm.len());
        for (j, (arg, input)) in args.iter().zip(&self.inputs).enumerate() {
            if arg.sparsity().shape() != input.sparsity().shape() {
                return Err(FunctionError::ArgumentError(format!(
                    "call: input {j} of {} is {}x{}, got {}x{}",
                    self.name(),
                    input.nrow(),
                    input.ncol(),
                    arg.nrow(),
                    arg.ncol()
                )));
            }
            values.push(arg.project(input.sparsity())?);
        }
        // Inputs occupy the first instructions, in declaration order
        for instr in &algorithm.instructions()[values.len()..] {
            let deps: Vec<MX> = instr.operands.iter().map(|&o| values[o].clone()).collect();
            values.push(instr.node.with_deps(&deps)?);
        }
        debug!("called {} symbolically, {} instructions replayed", self.name(), algorithm.len());

        Ok(algorithm.outputs().iter().map(|&o| values[o].clone()).collect())
    }

    /// Evaluates independent argument sets; `batch[s][j]` holds the
    /// nonzeros of input `j` in set `s`.
    ///
    /// From [`FunctionOptions::parallel_threshold`] sets on, the sets are
    /// spread over the rayon thread pool, each task with its own workspace.
    ///
    /// # Errors
    ///
    /// Returns the first error of any set; see [`Function::eval`].
    pub fn eval_batch(&self, batch: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Vec<f64>>>, FunctionError> {
        let algorithm = self.algorithm()?;
        let run = |workspace: &mut Workspace, set: &Vec<Vec<f64>>| {
            let args: Vec<&[f64]> = set.iter().map(Vec::as_slice).collect();
            self.eval_in(workspace, &args, &[], &[]).map(|e| e.outputs)
        };

        if batch.len() >= self.options.parallel_threshold {
            batch
                .par_iter()
                .map_init(|| Workspace::new(algorithm), run)
                .collect()
        } else {
            let mut workspace = Workspace::new(algorithm);
            batch.iter().map(|set| run(&mut workspace, set)).collect()
        }
    }
}

fn check_buffers(what: &str, side: &str, buffers: &[&[f64]], exprs: &[MX]) -> Result<(), FunctionError> {
    if buffers.len() != exprs.len() {
        return Err(FunctionError::ArgumentError(format!(
            "{what}: expected {} {side} buffers, got {}",
            exprs.len(),
            buffers.len()
        )));
    }
    for (k, (buffer, expr)) in buffers.iter().zip(exprs).enumerate() {
        if buffer.len() != expr.nnz() {
            return Err(FunctionError::ArgumentError(format!(
                "{what}: {side} {k} has {} nonzeros, got {} values",
                expr.nnz(),
                buffer.len()
            )));
        }
    }
    Ok(())
}
