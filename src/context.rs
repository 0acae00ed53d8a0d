use std::collections::HashMap;
use std::f64::consts;
use std::fmt::{self, Display};

use thiserror::Error;

/// Supplies meaning for the names in an expression at evaluation time.
///
/// The evaluator never interprets these errors, they reach the caller
/// exactly as the context raised them.
pub trait ResolutionContext {
    type Error;

    fn resolve_variable(&self, name: &str) -> Result<f64, Self::Error>;

    fn call_function(&self, name: &str, args: &[f64]) -> Result<f64, Self::Error>;
}

impl<C> ResolutionContext for &C
where
    C: ResolutionContext + ?Sized,
{
    type Error = C::Error;

    fn resolve_variable(&self, name: &str) -> Result<f64, Self::Error> {
        (**self).resolve_variable(name)
    }

    fn call_function(&self, name: &str, args: &[f64]) -> Result<f64, Self::Error> {
        (**self).call_function(name, args)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Arity {
    Exactly(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::Between(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(formatter, "{}", n),
            Arity::Between(min, max) => write!(formatter, "{} to {}", min, max),
            Arity::AtLeast(min) => write!(formatter, "at least {}", min),
        }
    }
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum EvalError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' takes {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: Arity,
        found: usize,
    },
}

type HostFunction = Box<dyn Fn(&[f64]) -> Result<f64, EvalError> + Send + Sync>;

/// Context with the usual math constants and functions, plus whatever
/// variables and functions the host binds on top.
///
/// Host bindings shadow built-ins of the same name. Names are case-sensitive.
#[derive(Default)]
pub struct StandardContext {
    variables: HashMap<String, f64>,
    functions: HashMap<String, HostFunction>,
}

impl StandardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, value: f64) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(String::from(name), value);
    }

    /// Registers a host function, e.g. a random source. The closure checks
    /// its own arity.
    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, EvalError> + Send + Sync + 'static,
    {
        self.functions.insert(String::from(name), Box::new(function));
        self
    }
}

impl fmt::Debug for StandardContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StandardContext")
            .field("variables", &self.variables)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolutionContext for StandardContext {
    type Error = EvalError;

    fn resolve_variable(&self, name: &str) -> Result<f64, EvalError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(*value);
        }

        match name {
            "e" => Ok(consts::E),
            "pi" => Ok(consts::PI),
            "r" => Ok(rand::random::<f64>()),
            _ => Err(EvalError::UnknownVariable(String::from(name))),
        }
    }

    fn call_function(&self, name: &str, args: &[f64]) -> Result<f64, EvalError> {
        log::trace!("call {}{:?}", name, args);

        if let Some(function) = self.functions.get(name) {
            return function(args);
        }

        let (arity, function) =
            builtin(name).ok_or_else(|| EvalError::UnknownFunction(String::from(name)))?;
        if !arity.accepts(args.len()) {
            return Err(EvalError::WrongArity {
                name: String::from(name),
                expected: arity,
                found: args.len(),
            });
        }

        Ok(function(args))
    }
}

type Builtin = fn(&[f64]) -> f64;

/// Built-in functions by name. Each body may index `args` up to its arity.
fn builtin(name: &str) -> Option<(Arity, Builtin)> {
    let unary = Arity::Exactly(1);
    let binary = Arity::Exactly(2);
    let variadic = Arity::AtLeast(1);

    let entry: (Arity, Builtin) = match name {
        "abs" => (unary, |args: &[f64]| args[0].abs()),
        "sqrt" => (unary, |args: &[f64]| args[0].sqrt()),
        "trunc" => (unary, |args: &[f64]| args[0].trunc()),
        "frac" => (unary, |args: &[f64]| args[0].abs().fract()),
        "sign" => (unary, |args: &[f64]| sign(args[0])),
        "round" => (unary, |args: &[f64]| round_half_even(args[0])),
        "floor" => (unary, |args: &[f64]| args[0].floor()),
        "ceil" => (unary, |args: &[f64]| args[0].ceil()),
        "sin" => (unary, |args: &[f64]| args[0].sin()),
        "asin" => (unary, |args: &[f64]| args[0].asin()),
        "cos" => (unary, |args: &[f64]| args[0].cos()),
        "acos" => (unary, |args: &[f64]| args[0].acos()),
        "tan" => (unary, |args: &[f64]| args[0].tan()),
        "mod" => (binary, |args: &[f64]| args[0] % args[1]),
        "pow" => (binary, |args: &[f64]| args[0].powf(args[1])),
        "step" => (binary, |args: &[f64]| if args[0] >= args[1] { 1.0 } else { 0.0 }),
        "quant" => (binary, |args: &[f64]| (args[0] / args[1]).floor() * args[1]),
        "atan2" => (binary, |args: &[f64]| args[0].atan2(args[1])),
        "rand" => (binary, |args: &[f64]| uniform(args[0], args[1])),
        "log" => (Arity::Between(1, 2), |args: &[f64]| match args.get(1) {
            Some(&base) => log_base(args[0], base),
            None => args[0].ln(),
        }),
        "clamp" => (Arity::Exactly(3), |args: &[f64]| {
            min_or_nan(max_or_nan(args[0], args[1]), args[2])
        }),
        "min" => (variadic, |args: &[f64]| args.iter().copied().fold(f64::INFINITY, min_or_nan)),
        // NaN only wins when every argument is NaN
        "max" => (variadic, |args: &[f64]| args.iter().copied().fold(f64::NAN, f64::max)),
        "avg" => (variadic, |args: &[f64]| args.iter().sum::<f64>() / args.len() as f64),
        _ => return None,
    };
    Some(entry)
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        // keeps NaN as NaN and both zeros as zero
        value * 0.0
    }
}

fn max_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn min_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn log_base(value: f64, base: f64) -> f64 {
    if value.is_nan() {
        value
    } else if base.is_nan() || base == 1.0 {
        f64::NAN
    } else if value != 1.0 && (base == 0.0 || base == f64::INFINITY) {
        f64::NAN
    } else {
        value.ln() / base.ln()
    }
}

/// Uniform in `[low, high)`; either bound order works, equal bounds give `low`.
fn uniform(low: f64, high: f64) -> f64 {
    low + (high - low) * rand::random::<f64>()
}

fn round_half_even(value: f64) -> f64 {
    if (value - value.trunc()).abs() == 0.5 {
        2.0 * (value / 2.0).round()
    } else {
        value.round()
    }
}
