// Lexer (tokenizer) for the expression language

use super::value::{parse_date, parse_datetime, parse_time};
use std::fmt;

/// Token types in the expression language
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Date(String),
    Time(String),
    DateTime(String),
    /// Key-path segment, bare or double-quoted
    Ident(String),

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Dot,      // .
    At,       // @

    // Arithmetic operators
    OpAdd, // +
    OpSub, // -
    OpMul, // *
    OpDiv, // /

    // Comparison operators
    OpEq,           // ==
    OpNeq,          // !=
    OpLt,           // <
    OpLe,           // <=
    OpGt,           // >
    OpGe,           // >=
    OpMatch,        // =~
    OpNotMatch,     // !=~
    OpMatchCase,    // =~~
    OpNotMatchCase, // !=~~

    // Logical operators
    OpAnd, // &
    OpOr,  // |
    OpNot, // !

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Date(s) | Token::Time(s) | Token::DateTime(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::At => write!(f, "@"),
            Token::OpAdd => write!(f, "+"),
            Token::OpSub => write!(f, "-"),
            Token::OpMul => write!(f, "*"),
            Token::OpDiv => write!(f, "/"),
            Token::OpEq => write!(f, "=="),
            Token::OpNeq => write!(f, "!="),
            Token::OpLt => write!(f, "<"),
            Token::OpLe => write!(f, "<="),
            Token::OpGt => write!(f, ">"),
            Token::OpGe => write!(f, ">="),
            Token::OpMatch => write!(f, "=~"),
            Token::OpNotMatch => write!(f, "!=~"),
            Token::OpMatchCase => write!(f, "=~~"),
            Token::OpNotMatchCase => write!(f, "!=~~"),
            Token::OpAnd => write!(f, "&"),
            Token::OpOr => write!(f, "|"),
            Token::OpNot => write!(f, "!"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Token together with the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: usize,
}

/// Lexer error with position information
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at position {pos}: {message}")]
pub struct LexError {
    pub pos: usize,
    pub message: String,
}

/// Lexer for tokenizing expression strings
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    current_char: Option<char>,
}

impl Lexer {
    /// Create a new lexer from input string
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Lexer {
            input: chars,
            pos: 0,
            current_char,
        }
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.pos += 1;
        self.current_char = self.input.get(self.pos).copied();
    }

    /// Peek `n` characters ahead without advancing
    fn peek(&self, n: usize) -> Option<char> {
        self.input.get(self.pos + n).copied()
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a quoted literal, handling backslash escapes. Used for both
    /// single-quoted strings and double-quoted identifier segments.
    fn read_quoted(&mut self, quote: char) -> Result<String, LexError> {
        let start_pos = self.pos;
        let mut result = String::new();

        // Skip opening quote
        self.advance();

        while let Some(ch) = self.current_char {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    self.advance();
                    match self.current_char {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some(ch) => result.push(ch), // \\, \', \" and anything else
                        None => {
                            return Err(LexError {
                                pos: self.pos,
                                message: "Unterminated escape sequence".to_string(),
                            });
                        }
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError {
            pos: start_pos,
            message: if quote == '\'' {
                "Unterminated string literal".to_string()
            } else {
                "Unterminated quoted identifier".to_string()
            },
        })
    }

    /// Read an integer or decimal number with an optional exponent
    fn read_number(&mut self) -> Result<f64, LexError> {
        let start_pos = self.pos;
        let mut text = String::new();

        self.read_digits(&mut text);

        // A dot only belongs to the number when a digit follows; `1.trim()`
        // is a method call on `1`.
        if self.current_char == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        if matches!(self.current_char, Some('e') | Some('E')) {
            let sign = matches!(self.peek(1), Some('+') | Some('-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                text.push('e');
                self.advance();
                if sign {
                    text.push(self.current_char.unwrap_or('+'));
                    self.advance();
                }
                self.read_digits(&mut text);
            }
        }

        let number = text.parse::<f64>().map_err(|e| LexError {
            pos: start_pos,
            message: format!("Invalid number '{}': {}", text, e),
        })?;
        if !number.is_finite() {
            return Err(LexError {
                pos: start_pos,
                message: format!("Number '{}' is out of range", text),
            });
        }
        Ok(number)
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a bare identifier segment
    fn read_ident(&mut self) -> String {
        let mut result = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        result
    }

    /// Consume `len` characters and return `token`
    fn single(&mut self, len: usize, token: Token) -> Result<Token, LexError> {
        for _ in 0..len {
            self.advance();
        }
        Ok(token)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        match self.current_char {
            None => Ok(Token::Eof),

            Some('(') => self.single(1, Token::LParen),
            Some(')') => self.single(1, Token::RParen),
            Some('[') => self.single(1, Token::LBracket),
            Some(']') => self.single(1, Token::RBracket),
            Some(',') => self.single(1, Token::Comma),
            Some('.') => self.single(1, Token::Dot),
            Some('@') => self.single(1, Token::At),
            Some('+') => self.single(1, Token::OpAdd),
            Some('-') => self.single(1, Token::OpSub),
            Some('*') => self.single(1, Token::OpMul),
            Some('/') => self.single(1, Token::OpDiv),
            Some('&') => self.single(1, Token::OpAnd),
            Some('|') => self.single(1, Token::OpOr),

            Some('<') => match self.peek(1) {
                Some('=') => self.single(2, Token::OpLe),
                _ => self.single(1, Token::OpLt),
            },

            Some('>') => match self.peek(1) {
                Some('=') => self.single(2, Token::OpGe),
                _ => self.single(1, Token::OpGt),
            },

            Some('=') => match (self.peek(1), self.peek(2)) {
                (Some('='), _) => self.single(2, Token::OpEq),
                (Some('~'), Some('~')) => self.single(3, Token::OpMatchCase),
                (Some('~'), _) => self.single(2, Token::OpMatch),
                _ => Err(LexError {
                    pos: self.pos,
                    message: "Expected '==' or '=~' but found single '='".to_string(),
                }),
            },

            Some('!') => match (self.peek(1), self.peek(2), self.peek(3)) {
                (Some('='), Some('~'), Some('~')) => self.single(4, Token::OpNotMatchCase),
                (Some('='), Some('~'), _) => self.single(3, Token::OpNotMatch),
                (Some('='), _, _) => self.single(2, Token::OpNeq),
                _ => self.single(1, Token::OpNot),
            },

            Some('\'') => {
                let s = self.read_quoted('\'')?;
                Ok(classify_quoted(s))
            }

            Some('"') => {
                let s = self.read_quoted('"')?;
                Ok(Token::Ident(s))
            }

            Some(ch) if ch.is_ascii_digit() => Ok(Token::Number(self.read_number()?)),

            Some(ch) if ch.is_alphabetic() || ch == '_' => Ok(Token::Ident(self.read_ident())),

            Some(ch) => Err(LexError {
                pos: self.pos,
                message: format!("Unexpected character: '{}'", ch),
            }),
        }
    }

    /// Tokenize the entire input, ending with `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let pos = self.pos;
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(SpannedToken { token, pos });
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

/// Tokenize a source string
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    Lexer::new(input).tokenize()
}

/// Quoted literals shaped like ISO dates or times become temporal tokens
fn classify_quoted(s: String) -> Token {
    if has_date_shape(&s) && parse_date(&s).is_some() {
        Token::Date(s)
    } else if has_time_shape(&s) && parse_time(&s).is_some() {
        Token::Time(s)
    } else if s.get(..10).is_some_and(has_date_shape)
        && matches!(s.as_bytes().get(10), Some(b'T') | Some(b' '))
        && s.get(11..).is_some_and(has_time_shape)
        && parse_datetime(&s).is_some()
    {
        Token::DateTime(s)
    } else {
        Token::String(s)
    }
}

/// `YYYY-MM-DD`
fn has_date_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

/// `HH:MM` or `HH:MM:SS`
fn has_time_shape(s: &str) -> bool {
    let b = s.as_bytes();
    (b.len() == 5 || b.len() == 8)
        && b.iter().enumerate().all(|(i, c)| match i {
            2 | 5 => *c == b':',
            _ => c.is_ascii_digit(),
        })
}
