//! Function configuration.

/// Options controlling how a [`Function`](crate::Function) is compiled
/// and evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionOptions {
    /// Name used in logs; derivative functions derive theirs from it.
    pub name: String,
    /// Batch size from which [`eval_batch`](crate::Function::eval_batch)
    /// evaluates argument sets in parallel.
    pub parallel_threshold: usize,
    /// Canonicalize the outputs through an
    /// [`ExprCache`](tangent_core::ExprCache) before compiling.
    pub cse: bool,
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            name: "f".to_string(),
            parallel_threshold: 8,
            cse: false,
        }
    }
}

impl FunctionOptions {
    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the batch size from which evaluation goes parallel.
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Enables or disables common-subexpression elimination.
    #[must_use]
    pub fn with_cse(mut self, cse: bool) -> Self {
        self.cse = cse;
        self
    }

    pub(crate) fn derived(&self, prefix: &str) -> Self {
        Self {
            name: format!("{prefix}_{}", self.name),
            ..self.clone()
        }
    }
}
