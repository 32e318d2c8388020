//! Infix rendering of expressions.
//!
//! Shared subexpressions are printed at every use.

use std::fmt;

use crate::mx::MX;
use crate::node::Operation;
use crate::opcode::OpCode;

fn infix(op: OpCode) -> Option<&'static str> {
    match op {
        OpCode::Add => Some("+"),
        OpCode::Sub => Some("-"),
        OpCode::Mul => Some("*"),
        OpCode::Div => Some("/"),
        _ => None,
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, deps: &[MX]) -> fmt::Result {
    for (i, dep) in deps.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{dep}")?;
    }
    Ok(())
}

impl fmt::Display for MX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Operation::Symbol { name } => f.write_str(name),
            Operation::Constant { values } => {
                if self.is_scalar() && values.len() == 1 {
                    write!(f, "{}", values[0])
                } else {
                    write!(f, "const({})", self.sparsity())
                }
            }
            Operation::Unary(OpCode::Neg) => write!(f, "(-{})", self.dep(0)),
            Operation::Unary(op) => write!(f, "{op}({})", self.dep(0)),
            Operation::Binary(op) => match infix(*op) {
                Some(symbol) => write!(f, "({}{symbol}{})", self.dep(0), self.dep(1)),
                None => write!(f, "{op}({},{})", self.dep(0), self.dep(1)),
            },
            Operation::Gather { kind, .. } => {
                write!(f, "{}(", kind.name())?;
                write_args(f, self.deps())?;
                f.write_str(")")
            }
            Operation::Mtimes { masked: false, .. } => write!(f, "mtimes({},{})", self.dep(0), self.dep(1)),
            Operation::Mtimes { masked: true, .. } => {
                write!(f, "({}+mtimes({},{}))", self.dep(2), self.dep(0), self.dep(1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tangent_sparsity::{Sparsity, SparsityInterface};

    use super::*;

    #[test]
    fn test_display() {
        let x = MX::sym("x", 1, 1);
        let y = MX::sym("y", 2, 1);
        assert_eq!(x.add(&y).unwrap().to_string(), "(x+y)");
        assert_eq!(x.sin().neg().to_string(), "(-sin(x))");
        assert_eq!(x.mul(&MX::scalar(2.5)).unwrap().to_string(), "(x*2.5)");
        assert_eq!(x.fmax(&x).unwrap().to_string(), "fmax(x,x)");
        assert_eq!(MX::vertcat(&[x.clone(), y.clone()]).unwrap().to_string(), "vertcat(x,y)");
        assert_eq!(MX::eye(2).to_string(), format!("const({})", Sparsity::diag(2)));

        let a = MX::sym("a", 2, 2);
        assert_eq!(a.mtimes(&y).unwrap().to_string(), "mtimes(a,y)");
        assert_eq!(format!("{:?}", x.sq()), "MX(sq(x))");
    }
}
