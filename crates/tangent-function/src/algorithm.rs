//! Compilation of expression graphs into instruction lists.
//!
//! The graph below the outputs is sorted once into a linear instruction
//! list in dependency order. Every node appears once however many parents
//! it has. Instruction indices double as buffer indices during evaluation.

use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tangent_core::{Operation, MX};

use crate::error::FunctionError;

/// One step of a compiled function: evaluate `node` from the results of the
/// instructions listed in `operands`.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// The expression node evaluated by this step.
    pub node: MX,
    /// Instruction index of every operand, in operand order.
    pub operands: SmallVec<[usize; 2]>,
}

/// A compiled instruction list.
#[derive(Clone, Debug)]
pub struct Algorithm {
    instructions: Vec<Instruction>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    peak_live_nnz: usize,
}

impl Algorithm {
    /// Sorts the graph below `outputs` topologically.
    ///
    /// Declared inputs come first, in declaration order. The traversal
    /// stops at declared inputs and uses an explicit stack, so deep graphs
    /// do not exhaust the call stack.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::InvalidArgument`] if a symbol that is not a
    /// declared input is reachable from an output.
    pub fn compile(inputs: &[MX], outputs: &[MX]) -> Result<Self, FunctionError> {
        let mut instructions: Vec<Instruction> = Vec::new();
        let mut index: FxHashMap<usize, usize> = FxHashMap::default();

        for input in inputs {
            index.insert(input.id(), instructions.len());
            instructions.push(Instruction {
                node: input.clone(),
                operands: SmallVec::new(),
            });
        }

        let mut stack: Vec<(MX, bool)> = Vec::new();
        let mut output_index = Vec::with_capacity(outputs.len());
        for output in outputs {
            stack.push((output.clone(), false));
            while let Some((node, expanded)) = stack.pop() {
                if index.contains_key(&node.id()) {
                    continue;
                }
                if !expanded {
                    if let Operation::Symbol { name } = node.op() {
                        return Err(FunctionError::InvalidArgument(format!(
                            "free variable '{name}' is not a declared input"
                        )));
                    }
                    stack.push((node.clone(), true));
                    for dep in node.deps().iter().rev() {
                        if !index.contains_key(&dep.id()) {
                            stack.push((dep.clone(), false));
                        }
                    }
                    continue;
                }

                let operands = node
                    .deps()
                    .iter()
                    .map(|dep| {
                        index.get(&dep.id()).copied().ok_or_else(|| {
                            FunctionError::InternalInconsistency(format!(
                                "operand of {} scheduled after its parent",
                                node.op().name()
                            ))
                        })
                    })
                    .collect::<Result<SmallVec<[usize; 2]>, _>>()?;
                index.insert(node.id(), instructions.len());
                instructions.push(Instruction { node, operands });
            }
            let position = index.get(&output.id()).copied().ok_or_else(|| {
                FunctionError::InternalInconsistency("output was not scheduled".to_string())
            })?;
            output_index.push(position);
        }

        let inputs = (0..inputs.len()).collect();
        let peak_live_nnz = peak_live(&instructions, &output_index);
        Ok(Self {
            instructions,
            inputs,
            outputs: output_index,
            peak_live_nnz,
        })
    }

    /// The instructions, in evaluation order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instruction index of every declared input.
    #[must_use]
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Instruction index of every output.
    #[must_use]
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Largest number of nonzeros held by instructions whose result is
    /// still needed by a primal sweep, over the evaluation order.
    ///
    /// Informational only: a [`Workspace`](crate::Workspace) keeps one
    /// buffer per instruction, because the reverse sweep reads the primal
    /// value of every instruction after the primal sweep has finished.
    #[must_use]
    pub fn peak_live_nnz(&self) -> usize {
        self.peak_live_nnz
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub(crate) fn log_summary(&self, name: &str) {
        debug!(
            "compiled {name}: {} instructions, {} inputs, {} outputs, peak live {} nonzeros",
            self.instructions.len(),
            self.inputs.len(),
            self.outputs.len(),
            self.peak_live_nnz
        );
    }
}

fn peak_live(instructions: &[Instruction], outputs: &[usize]) -> usize {
    let n = instructions.len();
    let mut last_use: Vec<usize> = (0..n).collect();
    for (i, instr) in instructions.iter().enumerate() {
        for &op in &instr.operands {
            last_use[op] = i;
        }
    }
    for &o in outputs {
        last_use[o] = usize::MAX;
    }

    let (mut live, mut peak) = (0usize, 0usize);
    for (i, instr) in instructions.iter().enumerate() {
        live += instr.node.nnz();
        peak = peak.max(live);
        for (j, &op) in instr.operands.iter().enumerate() {
            if last_use[op] == i && !instr.operands[..j].contains(&op) {
                live -= instructions[op].node.nnz();
            }
        }
        if last_use[i] == i {
            live -= instr.node.nnz();
        }
    }
    peak
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            write!(f, "@{i} = {}", instr.node.op().name())?;
            if !instr.operands.is_empty() {
                let operands: Vec<String> = instr.operands.iter().map(|o| format!("@{o}")).collect();
                write!(f, "({})", operands.join(", "))?;
            }
            writeln!(f)?;
        }
        let outputs: Vec<String> = self.outputs.iter().map(|o| format!("@{o}")).collect();
        write!(f, "outputs: {}", outputs.join(", "))
    }
}
