//! Read-only per-opcode metadata.
//!
//! The registry is built once, on first access, and never mutated
//! afterwards. Dispatch by opcode goes through [`registry`].

use std::fmt;

use once_cell::sync::Lazy;

use crate::error::ExprError;
use crate::mx::MX;
use crate::opcode::OpCode;

/// Primal evaluator: `f(x, y)`. Unary operations ignore `y`.
pub type PrimalFn = fn(f64, f64) -> f64;

/// Partial derivatives `[∂f/∂x, ∂f/∂y]` given `x`, `y` and `f = f(x, y)`.
pub type PartialFn = fn(f64, f64, f64) -> [f64; 2];

/// Symbolic partial derivatives `[∂f/∂x, ∂f/∂y]` given the operand
/// expressions and the node itself.
pub type GraphRule = fn(&MX, &MX, &MX) -> Result<[MX; 2], ExprError>;

/// Metadata for one operation code.
#[derive(Clone, Copy)]
pub struct OpInfo {
    /// The operation described.
    pub op: OpCode,
    /// Short name used for display.
    pub name: &'static str,
    /// Number of operands (1 or 2).
    pub arity: usize,
    /// Numeric evaluation.
    pub eval: PrimalFn,
    /// Numeric partial derivatives.
    pub partials: PartialFn,
    /// Unary: f(0) == 0.
    pub f0_is_zero: bool,
    /// Binary: f(x, 0) == 0 for every x. A scalar on the left keeps the
    /// structural zeros of a matrix on the right.
    pub fx0_is_zero: bool,
    /// Binary: f(0, y) == 0 for every y. A scalar on the right keeps the
    /// structural zeros of a matrix on the left.
    pub f0x_is_zero: bool,
    /// f(0, 0) == 0: two matrices can be combined over the union of their
    /// patterns.
    pub f00_is_zero: bool,
    /// Symbolic chain rule, if the operation has one.
    pub graph_rule: Option<GraphRule>,
}

impl OpInfo {
    /// Returns true if the operation can be differentiated symbolically.
    #[must_use]
    pub fn has_graph_rule(&self) -> bool {
        self.graph_rule.is_some()
    }
}

impl fmt::Debug for OpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpInfo")
            .field("op", &self.op)
            .field("arity", &self.arity)
            .field("f0_is_zero", &self.f0_is_zero)
            .field("fx0_is_zero", &self.fx0_is_zero)
            .field("f0x_is_zero", &self.f0x_is_zero)
            .field("f00_is_zero", &self.f00_is_zero)
            .field("graph_rule", &self.has_graph_rule())
            .finish()
    }
}

/// The table of [`OpInfo`] entries, indexed by [`OpCode::index`].
#[derive(Debug)]
pub struct OpRegistry {
    table: Vec<OpInfo>,
}

static REGISTRY: Lazy<OpRegistry> = Lazy::new(OpRegistry::build);

/// Returns the process-wide operation registry.
#[must_use]
pub fn registry() -> &'static OpRegistry {
    &REGISTRY
}

impl OpRegistry {
    /// Returns the metadata of `op`.
    #[must_use]
    pub fn info(&self, op: OpCode) -> &OpInfo {
        &self.table[op.index()]
    }

    /// Iterates over all entries in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &OpInfo> {
        self.table.iter()
    }

    fn build() -> Self {
        let table = vec![
            binary(OpCode::Add, "add", |x, y| x + y, |_, _, _| [1.0, 1.0], [false, false, true], Some(add_rule)),
            binary(OpCode::Sub, "sub", |x, y| x - y, |_, _, _| [1.0, -1.0], [false, false, true], Some(sub_rule)),
            binary(OpCode::Mul, "mul", |x, y| x * y, |x, y, _| [y, x], [true, true, true], Some(mul_rule)),
            binary(OpCode::Div, "div", |x, y| x / y, |_, y, f| [1.0 / y, -f / y], [false, true, false], Some(div_rule)),
            binary(
                OpCode::Pow,
                "pow",
                f64::powf,
                |x, y, f| [y * x.powf(y - 1.0), x.ln() * f],
                [false, false, false],
                None,
            ),
            binary(
                OpCode::Fmin,
                "fmin",
                f64::min,
                |x, y, _| if x <= y { [1.0, 0.0] } else { [0.0, 1.0] },
                [false, false, true],
                None,
            ),
            binary(
                OpCode::Fmax,
                "fmax",
                f64::max,
                |x, y, _| if x >= y { [1.0, 0.0] } else { [0.0, 1.0] },
                [false, false, true],
                None,
            ),
            unary(OpCode::Neg, "neg", |x, _| -x, |_, _, _| [-1.0, 0.0], true, Some(neg_rule)),
            unary(OpCode::Sqrt, "sqrt", |x, _| x.sqrt(), |_, _, f| [0.5 / f, 0.0], true, Some(sqrt_rule)),
            unary(OpCode::Sqr, "sq", |x, _| x * x, |x, _, _| [2.0 * x, 0.0], true, Some(sqr_rule)),
            unary(OpCode::Exp, "exp", |x, _| x.exp(), |_, _, f| [f, 0.0], false, Some(exp_rule)),
            unary(OpCode::Log, "log", |x, _| x.ln(), |x, _, _| [1.0 / x, 0.0], false, Some(log_rule)),
            unary(OpCode::Sin, "sin", |x, _| x.sin(), |x, _, _| [x.cos(), 0.0], true, Some(sin_rule)),
            unary(OpCode::Cos, "cos", |x, _| x.cos(), |x, _, _| [-x.sin(), 0.0], false, Some(cos_rule)),
            unary(OpCode::Tan, "tan", |x, _| x.tan(), |_, _, f| [1.0 + f * f, 0.0], true, None),
            unary(OpCode::Fabs, "fabs", |x, _| x.abs(), |x, _, _| [sign(x), 0.0], true, None),
        ];
        debug_assert!(table.iter().enumerate().all(|(i, info)| info.op.index() == i));
        Self { table }
    }
}

/// `[fx0_is_zero, f0x_is_zero, f00_is_zero]`
type ZeroFlags = [bool; 3];

fn binary(
    op: OpCode,
    name: &'static str,
    eval: PrimalFn,
    partials: PartialFn,
    [fx0_is_zero, f0x_is_zero, f00_is_zero]: ZeroFlags,
    graph_rule: Option<GraphRule>,
) -> OpInfo {
    OpInfo {
        op,
        name,
        arity: 2,
        eval,
        partials,
        f0_is_zero: f00_is_zero,
        fx0_is_zero,
        f0x_is_zero,
        f00_is_zero,
        graph_rule,
    }
}

fn unary(
    op: OpCode,
    name: &'static str,
    eval: PrimalFn,
    partials: PartialFn,
    f0_is_zero: bool,
    graph_rule: Option<GraphRule>,
) -> OpInfo {
    OpInfo {
        op,
        name,
        arity: 1,
        eval,
        partials,
        f0_is_zero,
        fx0_is_zero: false,
        f0x_is_zero: false,
        f00_is_zero: f0_is_zero,
        graph_rule,
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x * 0.0
    }
}

// === Symbolic chain rules ===
//
// A returned partial is either a scalar (broadcast over the node's
// nonzeros) or an expression with the node's shape.

fn add_rule(_: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(1.0), MX::scalar(1.0)])
}

fn sub_rule(_: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(1.0), MX::scalar(-1.0)])
}

fn mul_rule(x: &MX, y: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([y.clone(), x.clone()])
}

fn div_rule(_: &MX, y: &MX, f: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(1.0).div(y)?, f.neg().div(y)?])
}

fn neg_rule(_: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(-1.0), MX::scalar(0.0)])
}

fn sqrt_rule(_: &MX, _: &MX, f: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(0.5).div(f)?, MX::scalar(0.0)])
}

fn sqr_rule(x: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(2.0).mul(x)?, MX::scalar(0.0)])
}

fn exp_rule(_: &MX, _: &MX, f: &MX) -> Result<[MX; 2], ExprError> {
    Ok([f.clone(), MX::scalar(0.0)])
}

fn log_rule(x: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([MX::scalar(1.0).div(x)?, MX::scalar(0.0)])
}

fn sin_rule(x: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([x.cos(), MX::scalar(0.0)])
}

fn cos_rule(x: &MX, _: &MX, _: &MX) -> Result<[MX; 2], ExprError> {
    Ok([x.sin().neg(), MX::scalar(0.0)])
}
