//! Elementwise operation codes.

use std::fmt;

/// An elementwise operation applied to every nonzero of its operands.
///
/// Binary operations take two operands; unary operations take one. The
/// numeric and structural behavior of each code is described by its entry
/// in the [`registry`](crate::registry::registry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpCode {
    /// x + y
    Add,
    /// x - y
    Sub,
    /// x * y
    Mul,
    /// x / y
    Div,
    /// x^y
    Pow,
    /// min(x, y)
    Fmin,
    /// max(x, y)
    Fmax,
    /// -x
    Neg,
    /// sqrt(x)
    Sqrt,
    /// x^2
    Sqr,
    /// exp(x)
    Exp,
    /// ln(x)
    Log,
    /// sin(x)
    Sin,
    /// cos(x)
    Cos,
    /// tan(x)
    Tan,
    /// |x|
    Fabs,
}

impl OpCode {
    /// Every operation code, in registry order.
    pub const ALL: [OpCode; 16] = [
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Pow,
        OpCode::Fmin,
        OpCode::Fmax,
        OpCode::Neg,
        OpCode::Sqrt,
        OpCode::Sqr,
        OpCode::Exp,
        OpCode::Log,
        OpCode::Sin,
        OpCode::Cos,
        OpCode::Tan,
        OpCode::Fabs,
    ];

    /// Position of this code in [`OpCode::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns true for operations taking two operands.
    #[must_use]
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow | OpCode::Fmin | OpCode::Fmax
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::registry::registry().info(*self).name)
    }
}
