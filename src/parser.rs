use std::mem;

use thiserror::Error;

use crate::ast::{BinaryOp, AST};
use crate::tok::{Position, Token, TokenAndSpan, Tokenizer, TokenizerError};

const FACTOR_START: &str = "a number, identifier, '-' or '('";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    /// Maximum nesting of factors (parentheses, negation, call arguments).
    /// `None` leaves nesting unbounded.
    pub max_depth: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    TokenizerError(#[from] TokenizerError),
    #[error("expected {expected} at {at}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: Token,
        at: Position,
    },
    #[error("expected {expected} at {at}, found end of input")]
    UnexpectedEof { expected: &'static str, at: Position },
    #[error("'(' opened at {open} is not closed, found {found} at {at}")]
    UnclosedParen {
        open: Position,
        found: Token,
        at: Position,
    },
    #[error("unexpected {found} after complete expression at {at}")]
    TrailingInput { found: Token, at: Position },
    #[error("expression nested deeper than {limit} levels at {at}")]
    TooDeep { limit: usize, at: Position },
}

impl ParseError {
    fn unexpected(expected: &'static str, found: TokenAndSpan) -> Self {
        match found.token {
            Token::Eof => ParseError::UnexpectedEof {
                expected,
                at: found.from,
            },
            token => ParseError::UnexpectedToken {
                expected,
                found: token,
                at: found.from,
            },
        }
    }
}

/// LL(1) parser for a single arithmetic expression.
///
/// ```text
/// expression := term { ('+' | '-') term }
/// term       := factor { ('*' | '/') factor }
/// factor     := number
///             | identifier ['(' [expression {',' expression}] ')']
///             | '-' factor
///             | '(' expression ')'
/// ```
pub struct RecursiveDescentParser<T>
where
    T: Tokenizer,
{
    tokenizer: T,
    current: TokenAndSpan,
    options: ParseOptions,
    depth: usize,
}

impl<T> RecursiveDescentParser<T>
where
    T: Tokenizer,
{
    pub fn new(tokenizer: T) -> Result<Self, ParseError> {
        Self::with_options(tokenizer, ParseOptions::default())
    }

    pub fn with_options(tokenizer: T, options: ParseOptions) -> Result<Self, ParseError> {
        let mut parser = Self {
            tokenizer,
            current: TokenAndSpan {
                token: Token::Eof,
                from: Position {
                    line: 0,
                    position: 0,
                },
                to: Position {
                    line: 0,
                    position: 0,
                },
            },
            options,
            depth: 0,
        };

        // prime the lookahead
        parser.current = parser.next_token()?;

        Ok(parser)
    }

    /// Parses the whole input as one expression. Anything left over after
    /// the expression is an error, and no partial tree is returned.
    pub fn parse(mut self) -> Result<AST, ParseError> {
        let expr = self.parse_expression()?;

        match self.current.token {
            Token::Eof => {
                log::debug!("parsed expression {}", expr);
                Ok(expr)
            }
            _ => Err(ParseError::TrailingInput {
                found: self.current.token,
                at: self.current.from,
            }),
        }
    }

    /// Unrecognised characters come through as `Token::Unknown` and fail
    /// wherever the grammar meets them, never silently dropped.
    fn next_token(&mut self) -> Result<TokenAndSpan, ParseError> {
        let token_and_span = self.tokenizer.get_token()?;
        log::trace!("token {}", token_and_span);
        Ok(token_and_span)
    }

    /// Consumes the lookahead token and returns it.
    fn advance(&mut self) -> Result<TokenAndSpan, ParseError> {
        let next = self.next_token()?;
        Ok(mem::replace(&mut self.current, next))
    }

    fn parse_expression(&mut self) -> Result<AST, ParseError> {
        let mut lhs = self.parse_term()?;

        loop {
            let op = match self.current.token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance()?;

            let rhs = self.parse_term()?;
            lhs = AST::binary(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> Result<AST, ParseError> {
        let mut lhs = self.parse_factor()?;

        loop {
            let op = match self.current.token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance()?;

            let rhs = self.parse_factor()?;
            lhs = AST::binary(op, lhs, rhs);
        }
    }

    fn parse_factor(&mut self) -> Result<AST, ParseError> {
        if let Some(limit) = self.options.max_depth {
            if self.depth >= limit {
                return Err(ParseError::TooDeep {
                    limit,
                    at: self.current.from,
                });
            }
        }

        self.depth += 1;
        let factor = self.parse_factor_at_depth();
        self.depth -= 1;

        factor
    }

    fn parse_factor_at_depth(&mut self) -> Result<AST, ParseError> {
        let start = self.advance()?;

        match start.token {
            Token::Number(value) => Ok(AST::NumberExpr(value)),
            Token::Identifier(name) => {
                if self.current.token == Token::OpenParen {
                    let open = self.advance()?;
                    let args = self.parse_arguments(open.from)?;
                    Ok(AST::CallExpr { callee: name, args })
                } else {
                    Ok(AST::VariableExpr(name))
                }
            }
            Token::Minus => Ok(AST::NegateExpr(Box::new(self.parse_factor()?))),
            Token::OpenParen => {
                let expr = self.parse_expression()?;
                self.expect_close_paren(start.from)?;
                Ok(expr)
            }
            _ => Err(ParseError::unexpected(FACTOR_START, start)),
        }
    }

    /// Arguments after the opening paren of a call, up to and including
    /// the closing paren.
    fn parse_arguments(&mut self, open: Position) -> Result<Vec<AST>, ParseError> {
        let mut args = vec![];
        if self.current.token == Token::CloseParen {
            self.advance()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);

            if self.current.token == Token::Comma {
                self.advance()?;
            } else {
                self.expect_close_paren(open)?;
                return Ok(args);
            }
        }
    }

    fn expect_close_paren(&mut self, open: Position) -> Result<(), ParseError> {
        let found = self.advance()?;
        match found.token {
            Token::CloseParen => Ok(()),
            token => Err(ParseError::UnclosedParen {
                open,
                found: token,
                at: found.from,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate rstest;

    use rstest::*;

    use super::*;
    use crate::tok::GreedyTokenizer;

    struct MockyTokenizer {
        returns: Vec<Result<TokenAndSpan, TokenizerError>>,
    }

    impl MockyTokenizer {
        fn new(tokens_and_spans: Vec<TokenAndSpan>) -> MockyTokenizer {
            MockyTokenizer {
                returns: tokens_and_spans.into_iter().map(Result::Ok).rev().collect(),
            }
        }

        /// Every token gets its index in the list as its position.
        fn new_in_sequence(tokens: Vec<Token>) -> MockyTokenizer {
            Self::new(
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(position, token)| TokenAndSpan {
                        token,
                        from: Position { line: 0, position },
                        to: Position { line: 0, position },
                    })
                    .collect(),
            )
        }

        fn new_with_errors(
            tokens_and_spans: Vec<TokenAndSpan>,
            error: TokenizerError,
        ) -> MockyTokenizer {
            MockyTokenizer {
                returns: tokens_and_spans
                    .into_iter()
                    .map(Result::Ok)
                    .chain(vec![Result::Err(error)])
                    .rev()
                    .collect(),
            }
        }
    }

    impl Tokenizer for MockyTokenizer {
        fn get_token(&mut self) -> Result<TokenAndSpan, TokenizerError> {
            // keep answering Eof once the script runs out, like the real thing
            self.returns.pop().unwrap_or_else(|| {
                Ok(TokenAndSpan {
                    token: Token::Eof,
                    from: Position {
                        line: 0,
                        position: 99,
                    },
                    to: Position {
                        line: 0,
                        position: 99,
                    },
                })
            })
        }
    }

    fn parse_str(source: &str) -> Result<AST, ParseError> {
        parse_str_with(source, ParseOptions::default())
    }

    fn parse_str_with(source: &str, options: ParseOptions) -> Result<AST, ParseError> {
        let tokenizer = GreedyTokenizer::new(source.as_bytes()).map_err(TokenizerError::IoError)?;
        RecursiveDescentParser::with_options(tokenizer, options)?.parse()
    }

    fn num(value: f64) -> AST {
        AST::NumberExpr(value)
    }

    fn var(name: &str) -> AST {
        AST::VariableExpr(String::from(name))
    }

    #[test]
    fn it_wraps_tokenizer_error_with_parse_error() {
        let tok = MockyTokenizer::new_with_errors(
            vec![],
            TokenizerError::MalformedNumber {
                text: String::from("."),
                message: String::from("who dat"),
                from: Position {
                    line: 0,
                    position: 0,
                },
                to: Position {
                    line: 0,
                    position: 0,
                },
            },
        );
        let expr = RecursiveDescentParser::new(tok).and_then(RecursiveDescentParser::parse);

        // expect the error is what we passed in wrapped in a ParseError
        match expr.unwrap_err() {
            ParseError::TokenizerError(TokenizerError::MalformedNumber { message, from, .. }) => {
                assert_eq!(message, String::from("who dat"));
                assert_eq!(
                    from,
                    Position {
                        line: 0,
                        position: 0
                    }
                );
            }
            _ => panic!("Unexpected error here"),
        };
    }

    #[test]
    fn it_rejects_empty_token_stream() {
        let tok = MockyTokenizer::new(vec![]);

        let parser = RecursiveDescentParser::new(tok).unwrap();
        assert!(matches!(
            parser.parse().unwrap_err(),
            ParseError::UnexpectedEof { .. }
        ));
    }

    #[rstest]
    #[case(Token::Number(0.0), num(0.0))]
    #[case(Token::Number(188.5), num(188.5))]
    #[case(Token::Identifier(String::from("something")), var("something"))]
    fn it_parses_leaf_tokens(#[case] token: Token, #[case] expr: AST) {
        let tok = MockyTokenizer::new_in_sequence(vec![token]);

        let parser = RecursiveDescentParser::new(tok).unwrap();
        assert_eq!(parser.parse().unwrap(), expr);
    }

    #[test]
    fn it_parses_no_args_calls() {
        let tok = MockyTokenizer::new_in_sequence(vec![
            Token::Identifier(String::from("something")),
            Token::OpenParen,
            Token::CloseParen,
        ]);

        let parser = RecursiveDescentParser::new(tok).unwrap();
        assert_eq!(
            parser.parse().unwrap(),
            AST::CallExpr {
                callee: String::from("something"),
                args: vec![]
            }
        );
    }

    #[test]
    fn it_parses_calls_with_args_that_are_expressions() {
        let tok = MockyTokenizer::new_in_sequence(vec![
            Token::Identifier(String::from("something")),
            Token::OpenParen,
            Token::Number(1.0),
            Token::Comma,
            Token::Identifier(String::from("something_else")),
            Token::OpenParen,
            Token::Number(2.0),
            Token::Star,
            Token::Identifier(String::from("x")),
            Token::CloseParen,
            Token::CloseParen,
        ]);

        let parser = RecursiveDescentParser::new(tok).unwrap();
        assert_eq!(
            parser.parse().unwrap(),
            AST::CallExpr {
                callee: String::from("something"),
                args: vec![
                    num(1.0),
                    AST::CallExpr {
                        callee: String::from("something_else"),
                        args: vec![AST::binary(BinaryOp::Mul, num(2.0), var("x"))]
                    }
                ]
            }
        );
    }

    #[test]
    fn it_rejects_unknown_tokens_where_a_factor_belongs() {
        let tok = MockyTokenizer::new_in_sequence(vec![
            Token::Number(1.0),
            Token::Plus,
            Token::Unknown('@'),
            Token::Number(2.0),
        ]);

        let err = RecursiveDescentParser::new(tok)
            .and_then(RecursiveDescentParser::parse)
            .unwrap_err();
        match err {
            ParseError::UnexpectedToken { found, at, .. } => {
                assert_eq!(found, Token::Unknown('@'));
                assert_eq!(at, Position { line: 0, position: 2 });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }
    }

    #[test]
    fn it_rejects_unknown_tokens_after_a_complete_expression() {
        let tok = MockyTokenizer::new_in_sequence(vec![
            Token::Number(1.0),
            Token::Plus,
            Token::Number(2.0),
            Token::Unknown('@'),
        ]);

        let err = RecursiveDescentParser::new(tok)
            .and_then(RecursiveDescentParser::parse)
            .unwrap_err();
        match err {
            ParseError::TrailingInput { found, at } => {
                assert_eq!(found, Token::Unknown('@'));
                assert_eq!(at, Position { line: 0, position: 3 });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }
    }

    #[rstest]
    #[case("1+2@", Token::Unknown('@'), 3)]
    #[case("1@2", Token::Unknown('@'), 1)]
    fn it_reports_stray_characters_as_trailing_input(
        #[case] source: &str,
        #[case] expected: Token,
        #[case] position: usize,
    ) {
        match parse_str(source).unwrap_err() {
            ParseError::TrailingInput { found, at } => {
                assert_eq!(found, expected);
                assert_eq!(at, Position { line: 0, position });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }
    }

    #[rstest]
    #[case("@1", '@', 0)]
    #[case("1 + $2", '$', 4)]
    #[case("f(#)", '#', 2)]
    fn it_reports_stray_characters_where_a_factor_belongs(
        #[case] source: &str,
        #[case] chr: char,
        #[case] position: usize,
    ) {
        match parse_str(source).unwrap_err() {
            ParseError::UnexpectedToken { found, at, .. } => {
                assert_eq!(found, Token::Unknown(chr));
                assert_eq!(at, Position { line: 0, position });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }
    }

    #[test]
    fn it_respects_precedence() {
        assert_eq!(
            parse_str("2+3*4").unwrap(),
            AST::binary(
                BinaryOp::Add,
                num(2.0),
                AST::binary(BinaryOp::Mul, num(3.0), num(4.0))
            )
        );
    }

    #[rstest]
    #[case("10-3-2", BinaryOp::Sub, 10.0, 3.0, 2.0)]
    #[case("100/10/2", BinaryOp::Div, 100.0, 10.0, 2.0)]
    #[case("1+2+3", BinaryOp::Add, 1.0, 2.0, 3.0)]
    #[case("2*3*4", BinaryOp::Mul, 2.0, 3.0, 4.0)]
    fn it_groups_same_precedence_to_the_left(
        #[case] source: &str,
        #[case] op: BinaryOp,
        #[case] a: f64,
        #[case] b: f64,
        #[case] c: f64,
    ) {
        assert_eq!(
            parse_str(source).unwrap(),
            AST::binary(op, AST::binary(op, num(a), num(b)), num(c))
        );
    }

    #[test]
    fn it_nests_unary_minus() {
        assert_eq!(
            parse_str("- -3").unwrap(),
            AST::NegateExpr(Box::new(AST::NegateExpr(Box::new(num(3.0)))))
        );

        // binds tighter than any binary operator
        assert_eq!(
            parse_str("-x*2").unwrap(),
            AST::binary(BinaryOp::Mul, AST::NegateExpr(Box::new(var("x"))), num(2.0))
        );
    }

    #[test]
    fn it_lets_parens_reset_precedence() {
        assert_eq!(
            parse_str("(2+3)*4").unwrap(),
            AST::binary(
                BinaryOp::Mul,
                AST::binary(BinaryOp::Add, num(2.0), num(3.0)),
                num(4.0)
            )
        );
    }

    #[test]
    fn it_reports_unclosed_paren() {
        match parse_str("(1+2").unwrap_err() {
            ParseError::UnclosedParen { open, found, at } => {
                assert_eq!(open, Position { line: 0, position: 0 });
                assert_eq!(found, Token::Eof);
                assert_eq!(at, Position { line: 0, position: 4 });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }

        assert!(matches!(
            parse_str("f(1, 2").unwrap_err(),
            ParseError::UnclosedParen { .. }
        ));
    }

    #[test]
    fn it_reports_missing_operand() {
        match parse_str("1+").unwrap_err() {
            ParseError::UnexpectedEof { at, .. } => {
                assert_eq!(at, Position { line: 0, position: 2 });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }
    }

    #[test]
    fn it_reports_trailing_input() {
        match parse_str("1 2").unwrap_err() {
            ParseError::TrailingInput { found, at } => {
                assert_eq!(found, Token::Number(2.0));
                assert_eq!(at, Position { line: 0, position: 2 });
            }
            other => panic!("Unexpected error here: {:?}", other),
        }

        assert!(matches!(
            parse_str("(1))").unwrap_err(),
            ParseError::TrailingInput { .. }
        ));
    }

    #[rstest]
    #[case("*2")]
    #[case("()")]
    #[case("f(1,)")]
    #[case("f(,1)")]
    #[case(")")]
    fn it_reports_unexpected_tokens(#[case] source: &str) {
        assert!(matches!(
            parse_str(source).unwrap_err(),
            ParseError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn it_reports_malformed_numbers() {
        assert!(matches!(
            parse_str("1 + .").unwrap_err(),
            ParseError::TokenizerError(TokenizerError::MalformedNumber { .. })
        ));
    }

    #[test]
    fn it_limits_nesting_when_asked() {
        let options = ParseOptions {
            max_depth: Some(3),
        };

        assert!(parse_str_with("((1))", options).is_ok());
        assert!(parse_str_with("--1", options).is_ok());
        assert!(matches!(
            parse_str_with("(((1)))", options).unwrap_err(),
            ParseError::TooDeep { limit: 3, .. }
        ));
        assert!(matches!(
            parse_str_with("f(g(h(1)))", options).unwrap_err(),
            ParseError::TooDeep { limit: 3, .. }
        ));

        // sequences at one level do not add depth
        assert!(parse_str_with("1+2+3+4+5*6*7", options).is_ok());
    }

    #[test]
    fn it_parses_deep_nesting_without_a_limit() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse_str(&source).unwrap(), num(1.0));
    }
}
