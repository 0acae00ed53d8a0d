use std::fmt::Display;

use crate::context::ResolutionContext;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            // IEEE-754 division, x/0 is inf or NaN
            BinaryOp::Div => lhs / rhs,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// A parsed expression. Plain owned data with no tie back to the parser,
/// so one tree can be evaluated any number of times against different
/// contexts, including from several threads at once.
#[derive(Debug, PartialEq, Clone)]
pub enum AST {
    NumberExpr(f64),
    VariableExpr(String),
    CallExpr {
        callee: String,
        args: Vec<AST>,
    },
    NegateExpr(Box<AST>),
    BinaryExpr {
        op: BinaryOp,
        lhs: Box<AST>,
        rhs: Box<AST>,
    },
}

impl AST {
    pub fn binary(op: BinaryOp, lhs: AST, rhs: AST) -> AST {
        AST::BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Walks the tree, resolving names through `context`.
    ///
    /// Call arguments are evaluated left to right before the call is made.
    /// Errors raised by the context come back untouched.
    pub fn evaluate<C>(&self, context: &C) -> Result<f64, C::Error>
    where
        C: ResolutionContext + ?Sized,
    {
        match self {
            AST::NumberExpr(value) => Ok(*value),
            AST::VariableExpr(name) => context.resolve_variable(name),
            AST::CallExpr { callee, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<Result<Vec<f64>, C::Error>>()?;
                context.call_function(callee, &values)
            }
            AST::NegateExpr(operand) => Ok(-operand.evaluate(context)?),
            AST::BinaryExpr { op, lhs, rhs } => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                Ok(op.apply(lhs, rhs))
            }
        }
    }
}

/// S-expression rendering, e.g. `(+ 2 (* 3 4))`.
impl Display for AST {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AST::NumberExpr(value) => write!(formatter, "{}", value),
            AST::VariableExpr(name) => write!(formatter, "{}", name),
            AST::CallExpr { callee, args } => {
                write!(formatter, "({}", callee)?;
                for arg in args {
                    write!(formatter, " {}", arg)?;
                }
                write!(formatter, ")")
            }
            AST::NegateExpr(operand) => write!(formatter, "(neg {})", operand),
            AST::BinaryExpr { op, lhs, rhs } => {
                write!(formatter, "({} {} {})", op.symbol(), lhs, rhs)
            }
        }
    }
}
