//! Jacobians, gradients and Hessians of functions.
//!
//! Derivatives are built symbolically by forward propagation of Jacobians
//! along the compiled order, and are expressed in nonzero coordinates:
//! rows follow the output's nonzeros, columns the input's.

use log::debug;
use tangent_core::{SparsityInterface, MX};

use crate::algorithm::Algorithm;
use crate::error::FunctionError;
use crate::function::Function;

impl Function {
    fn check_indices(&self, iind: usize, oind: usize) -> Result<(), FunctionError> {
        self.input(iind)?;
        self.output(oind)?;
        Ok(())
    }

    /// Jacobian of `expr` with respect to input `iind`.
    fn jacobian_of(&self, expr: &MX, iind: usize) -> Result<MX, FunctionError> {
        let algorithm = Algorithm::compile(self.inputs(), std::slice::from_ref(expr))?;
        let n = self.input(iind)?.nnz();

        let mut jacs: Vec<MX> = Vec::with_capacity(algorithm.len());
        for (i, instr) in algorithm.instructions().iter().enumerate() {
            let jac = if i == iind {
                MX::eye(n)
            } else {
                let operand_jacs: Vec<MX> = instr.operands.iter().map(|&o| jacs[o].clone()).collect();
                if operand_jacs.iter().all(|j| j.nnz() == 0) {
                    MX::zeros(instr.node.nnz(), n)
                } else {
                    instr.node.ad_forward(&operand_jacs, n)?
                }
            };
            jacs.push(jac);
        }

        let output = algorithm.outputs()[0];
        Ok(jacs.swap_remove(output))
    }

    /// Jacobian of output `oind` with respect to input `iind`, of shape
    /// `nnz(output) × nnz(input)`.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] for out-of-range indices
    /// and [`ExprError::UnsupportedOperation`](tangent_core::ExprError) if the
    /// output depends on the input through an operation without a symbolic
    /// rule.
    pub fn jac(&self, iind: usize, oind: usize) -> Result<MX, FunctionError> {
        self.check_indices(iind, oind)?;
        let jac = self.jacobian_of(self.output(oind)?, iind)?;
        debug!(
            "jacobian of {} output {oind} wrt input {iind}: {}x{}, {} nonzeros",
            self.name(),
            jac.nrow(),
            jac.ncol(),
            jac.nnz()
        );
        Ok(jac)
    }

    /// Gradient of the scalar output `oind` with respect to input `iind`, as
    /// a column of length `nnz(input)`.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if the output is not 1×1;
    /// otherwise see [`Function::jac`].
    pub fn grad(&self, iind: usize, oind: usize) -> Result<MX, FunctionError> {
        self.check_indices(iind, oind)?;
        let output = self.output(oind)?;
        if !output.is_scalar() {
            return Err(FunctionError::InvalidArgument(format!(
                "gradient of {} needs a scalar output, output {oind} is {}x{}",
                self.name(),
                output.nrow(),
                output.ncol()
            )));
        }
        let jac = self.jac(iind, oind)?;
        if jac.nrow() == 0 {
            return Ok(MX::zeros(jac.ncol(), 1));
        }
        Ok(jac.transpose())
    }

    /// Hessian of the scalar output `oind` with respect to input `iind`:
    /// the Jacobian of the gradient, `nnz(input) × nnz(input)` even when
    /// the output depends on only some of the input's nonzeros.
    ///
    /// # Errors
    ///
    /// See [`Function::grad`].
    pub fn hess(&self, iind: usize, oind: usize) -> Result<MX, FunctionError> {
        // Rows must follow the input's nonzeros, not the gradient's
        let grad = self.grad(iind, oind)?.densify();
        let hess = self.jacobian_of(&grad, iind)?;
        debug!(
            "hessian of {} output {oind} wrt input {iind}: {} nonzeros",
            self.name(),
            hess.nnz()
        );
        Ok(hess)
    }

    /// A new function with the same inputs computing [`Function::jac`].
    ///
    /// # Errors
    ///
    /// See [`Function::jac`].
    pub fn jacobian(&self, iind: usize, oind: usize) -> Result<Function, FunctionError> {
        let jac = self.jac(iind, oind)?;
        Function::with_options(self.inputs().to_vec(), vec![jac], self.options().derived("jac"))
    }

    /// A new function with the same inputs computing [`Function::hess`].
    ///
    /// # Errors
    ///
    /// See [`Function::hess`].
    pub fn hessian(&self, iind: usize, oind: usize) -> Result<Function, FunctionError> {
        let hess = self.hess(iind, oind)?;
        Function::with_options(self.inputs().to_vec(), vec![hess], self.options().derived("hess"))
    }
}
