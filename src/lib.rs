//! A small embeddable arithmetic expression language.
//!
//! Text is parsed once into an [`AST`], which can then be evaluated any
//! number of times against a [`ResolutionContext`] that gives meaning to
//! variable and function names.
//!
//! ```
//! use calc_expr::{parse, StandardContext};
//!
//! let expr = parse("clamp(x * 2, 0, 5) + 1").unwrap();
//! let ctx = StandardContext::new().with_variable("x", 1.5);
//! assert_eq!(expr.evaluate(&ctx), Ok(4.0));
//! ```

pub mod ast;
pub mod context;
pub mod parser;
pub mod tok;

use std::io::Read;

pub use crate::ast::{BinaryOp, AST};
pub use crate::context::{Arity, EvalError, ResolutionContext, StandardContext};
pub use crate::parser::{ParseError, ParseOptions, RecursiveDescentParser};
pub use crate::tok::{GreedyTokenizer, Position, Token, TokenAndSpan, Tokenizer, TokenizerError};

/// Parses a single expression with the default options.
pub fn parse(source: &str) -> Result<AST, ParseError> {
    parse_with(source, ParseOptions::default())
}

pub fn parse_with(source: &str, options: ParseOptions) -> Result<AST, ParseError> {
    parse_reader(source.as_bytes(), options)
}

/// Parses a single expression pulled character by character from `reader`.
pub fn parse_reader<R>(reader: R, options: ParseOptions) -> Result<AST, ParseError>
where
    R: Read,
{
    let tokenizer = GreedyTokenizer::new(reader).map_err(TokenizerError::IoError)?;
    RecursiveDescentParser::with_options(tokenizer, options)?.parse()
}
