use std::fmt::Display;
use std::io::{self, Read};

use thiserror::Error;

const NEWLINE_CHAR: char = '\n';
const CARRIAGE_RETURN_CHAR: char = '\r';
const DECIMAL_POINT: char = '.';

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // standard symbols
    Eof,
    Plus,
    Minus,
    Star,
    Slash,
    OpenParen,
    CloseParen,
    Comma,

    // more complex stuff
    Identifier(String),
    Number(f64),
    Unknown(char),
}

impl Token {
    fn from_char(char_value: char) -> Option<Token> {
        match char_value {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::OpenParen),
            ')' => Some(Token::CloseParen),
            ',' => Some(Token::Comma),
            _ => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Eof => write!(formatter, "end of input"),
            Token::Plus => write!(formatter, "'+'"),
            Token::Minus => write!(formatter, "'-'"),
            Token::Star => write!(formatter, "'*'"),
            Token::Slash => write!(formatter, "'/'"),
            Token::OpenParen => write!(formatter, "'('"),
            Token::CloseParen => write!(formatter, "')'"),
            Token::Comma => write!(formatter, "','"),
            Token::Identifier(name) => write!(formatter, "identifier '{}'", name),
            Token::Number(value) => write!(formatter, "number {}", value),
            Token::Unknown(chr) => write!(formatter, "character '{}'", chr.escape_debug()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub position: usize,
}

impl Display for Position {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "line {} char {}", self.line, self.position)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct TokenAndSpan {
    pub token: Token,
    pub from: Position,
    pub to: Position,
}

impl TokenAndSpan {
    fn single(token: Token, at: Position) -> Self {
        TokenAndSpan {
            token,
            from: at,
            to: at,
        }
    }
}

impl Display for TokenAndSpan {
    fn fmt(
        &self,
        formatter: &mut std::fmt::Formatter<'_>,
    ) -> std::result::Result<(), std::fmt::Error> {
        if self.from == self.to {
            write!(
                formatter,
                "{:?}[line {} char {}]",
                self.token, self.from.line, self.from.position
            )
        } else {
            write!(
                formatter,
                "{:?}[line {} char {} -> line {} char {}]",
                self.token, self.from.line, self.from.position, self.to.line, self.to.position
            )
        }
    }
}

#[derive(Clone, Copy)]
struct CharAndPosition {
    chr: Option<char>,
    line: usize,
    position: usize,
}

impl CharAndPosition {
    fn at(&self) -> Position {
        Position {
            line: self.line,
            position: self.position,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("unable to read expression: {0}")]
    IoError(#[from] io::Error),
    #[error("unable to parse number '{text}' at {from}: {message}")]
    MalformedNumber {
        text: String,
        message: String,
        from: Position,
        to: Position,
    },
}

impl TokenizerError {
    fn from(
        text: String,
        from: Position,
        to: Position,
        float_parse_error: std::num::ParseFloatError,
    ) -> TokenizerError {
        TokenizerError::MalformedNumber {
            text,
            message: float_parse_error.to_string(),
            from,
            to,
        }
    }
}

pub trait Tokenizer {
    fn get_token(&mut self) -> Result<TokenAndSpan, TokenizerError>;
}

/// Single-pass tokenizer over any byte stream holding UTF-8 text.
///
/// Keeps exactly one character of lookahead. Characters that start no token
/// are handed back as `Token::Unknown`, which no grammar rule accepts.
pub struct GreedyTokenizer<T>
where
    T: Read,
{
    inbuf: T,
    // byte read past a truncated UTF-8 sequence, starts the next char
    pending_byte: Option<u8>,
    line: usize,
    position: usize,
    current_char: CharAndPosition,
}

impl<T> GreedyTokenizer<T>
where
    T: Read,
{
    pub fn new(inbuf: T) -> io::Result<Self> {
        let mut tok = GreedyTokenizer {
            inbuf,
            pending_byte: None,
            line: 0,
            position: 0,
            current_char: CharAndPosition {
                chr: None,
                line: 0,
                position: 0,
            },
        };

        // start it off
        tok.step_next_char()?;

        Ok(tok)
    }

    fn step_next_char(&mut self) -> io::Result<()> {
        match self.read_char()? {
            Some(chr) => {
                self.current_char = CharAndPosition {
                    chr: Some(chr),
                    line: self.line,
                    position: self.position,
                };

                self.position += 1;
                if chr == NEWLINE_CHAR || chr == CARRIAGE_RETURN_CHAR {
                    self.line += 1;
                    self.position = 0;
                }
            }
            None => {
                self.current_char = CharAndPosition {
                    chr: None,
                    line: self.line,
                    position: self.position,
                };
            }
        }

        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pending_byte.take() {
            return Ok(Some(byte));
        }

        let mut buffer: [u8; 1] = [0];
        let bytes_read = self.inbuf.read(&mut buffer)?;
        Ok(if bytes_read > 0 { Some(buffer[0]) } else { None })
    }

    fn read_char(&mut self) -> io::Result<Option<char>> {
        let lead_byte = match self.read_byte()? {
            Some(byte) => byte,
            None => return Ok(None),
        };

        let mut buffer: [u8; 4] = [lead_byte, 0, 0, 0];
        let width = utf8_width(lead_byte);
        let mut filled = 1;
        while filled < width {
            match self.read_byte()? {
                Some(byte) if is_continuation_byte(byte) => {
                    buffer[filled] = byte;
                    filled += 1;
                }
                Some(byte) => {
                    self.pending_byte = Some(byte);
                    break;
                }
                None => break,
            }
        }

        // invalid sequences still occupy one position so spans stay aligned
        Ok(Some(
            std::str::from_utf8(&buffer[..filled])
                .ok()
                .and_then(|decoded| decoded.chars().next())
                .unwrap_or(char::REPLACEMENT_CHARACTER),
        ))
    }

    fn step_while<F>(&mut self, text: &mut String, mut accept: F) -> io::Result<CharAndPosition>
    where
        F: FnMut(char) -> bool,
    {
        let mut last = self.current_char;
        while let Some(chr) = self.current_char.chr.filter(|&chr| accept(chr)) {
            text.push(chr);
            last = self.current_char;
            self.step_next_char()?;
        }
        Ok(last)
    }
}

impl<T> Tokenizer for GreedyTokenizer<T>
where
    T: Read,
{
    fn get_token(&mut self) -> Result<TokenAndSpan, TokenizerError> {
        // remove any whitespace
        while self.current_char.chr.map_or(false, char::is_whitespace) {
            self.step_next_char()?;
        }

        let tok = self.current_char;
        let chr = match tok.chr {
            Some(chr) => chr,
            None => return Ok(TokenAndSpan::single(Token::Eof, tok.at())),
        };

        // recognize any identifiers
        if is_identifier_start(chr) {
            let mut ident = String::new();
            let last = self.step_while(&mut ident, is_identifier_like)?;

            return Ok(TokenAndSpan {
                token: Token::Identifier(ident),
                from: tok.at(),
                to: last.at(),
            });
        }

        // recognizing any numeric things, at most one decimal point each
        if is_number_start(chr) {
            let mut numstr = String::new();
            let mut seen_decimal_point = false;
            let last = self.step_while(&mut numstr, |chr| {
                if chr == DECIMAL_POINT {
                    let accept = !seen_decimal_point;
                    seen_decimal_point = true;
                    accept
                } else {
                    chr.is_ascii_digit()
                }
            })?;

            // str::parse is locale independent, '.' is always the decimal point
            return match numstr.parse() {
                Ok(parsed) => Ok(TokenAndSpan {
                    token: Token::Number(parsed),
                    from: tok.at(),
                    to: last.at(),
                }),
                Err(e) => Err(TokenizerError::from(numstr, tok.at(), last.at(), e)),
            };
        }

        // every other case is either a reserved char or simply an unknown char
        self.step_next_char()?;
        let token = Token::from_char(chr).unwrap_or(Token::Unknown(chr));
        Ok(TokenAndSpan::single(token, tok.at()))
    }
}

fn utf8_width(lead_byte: u8) -> usize {
    match lead_byte {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn is_continuation_byte(byte: u8) -> bool {
    (0x80..=0xBF).contains(&byte)
}

fn is_identifier_start(chr: char) -> bool {
    chr.is_alphabetic() || chr == '_'
}

// decimal digits only, so '²' or '½' end an identifier
fn is_identifier_like(chr: char) -> bool {
    chr.is_alphabetic() || chr.is_ascii_digit() || chr == '_'
}

fn is_number_start(chr: char) -> bool {
    chr.is_ascii_digit() || chr == DECIMAL_POINT
}
