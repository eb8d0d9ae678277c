//! Formula tokenizer
//!
//! Splits formula text into a flat sequence of typed tokens. Tokens borrow
//! their text from the source string; whitespace, comments and line ends are
//! emitted too so that callers can track line numbers.

use crate::error::TokenError;
use std::rc::Rc;

/// Words with a fixed meaning in the language
pub const KEYWORDS: &[&str] = &[
    "def",
    "where",
    "not",
    "and",
    "or",
    "functions",
    "fai",
    "wfl",
    "faiend",
    "wflend",
    "end",
];

/// Multi-character operators, longest first
const LONG_OPERATORS: &[&str] = &["..", ".+", ".-", ".*", "./", "!=", "<=", ">=", "->"];

const SHORT_OPERATORS: &[char] = &['+', '-', '*', '/', '%', '^', '~', '.', '=', '<', '>'];

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Decimal,
    StringLiteral,
    Operator,
    Keyword,
    LParens,
    RParens,
    LSquare,
    RSquare,
    Comma,
    /// `->`
    Pointer,
    Semicolon,
    Whitespace,
    Comment,
    Eol,
}

impl TokenKind {
    /// Tokens that carry no meaning for the parser
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::Eol
        )
    }
}

/// A token borrowing its text from the scanned source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of `text` in the scanned source
    pub offset: usize,
    pub file: Rc<str>,
    pub line: usize,
}

impl<'a> Token<'a> {
    /// Byte offset one past the end of the token
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == word
    }
}

/// Incremental scanner over formula text
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    file: Rc<str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, file: Rc<str>, first_line: usize) -> Self {
        Self {
            input,
            pos: 0,
            line: first_line,
            file,
        }
    }

    /// Current line number
    pub fn line(&self) -> usize {
        self.line
    }

    /// Scan the next token, or `None` once the input is exhausted
    pub fn next_token(&mut self) -> Option<Result<Token<'a>, TokenError>> {
        let c = self.peek_char()?;
        let start = self.pos;
        let line = self.line;

        let kind = match c {
            '\'' => match self.scan_string() {
                Ok(()) => TokenKind::StringLiteral,
                Err(e) => return Some(Err(e)),
            },
            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(),
            '#' => {
                while self.peek_char().map_or(false, |c| c != '\n') {
                    self.advance();
                }
                TokenKind::Comment
            }
            '\n' => {
                self.advance();
                self.line += 1;
                TokenKind::Eol
            }
            c if c.is_whitespace() => {
                while self
                    .peek_char()
                    .map_or(false, |c| c.is_whitespace() && c != '\n')
                {
                    self.advance();
                }
                TokenKind::Whitespace
            }
            '(' => self.single(TokenKind::LParens),
            ')' => self.single(TokenKind::RParens),
            '[' => self.single(TokenKind::LSquare),
            ']' => self.single(TokenKind::RSquare),
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            _ => match self.scan_operator() {
                Some(kind) => kind,
                None => {
                    self.advance();
                    return Some(Err(TokenError::Unrecognized {
                        fragment: self.input[start..self.pos].to_string(),
                        offset: start,
                    }));
                }
            },
        };

        Some(Ok(Token {
            kind,
            text: &self.input[start..self.pos],
            offset: start,
            file: self.file.clone(),
            line,
        }))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn scan_string(&mut self) -> Result<(), TokenError> {
        let start = self.pos;
        self.advance(); // Skip opening quote

        // Quotes inside a `[...]` substitution do not end the string. If a
        // substitution is never closed, the string ends at the last quote
        // seen and the parser reports the open substitution.
        let mut depth = 0usize;
        let mut last_quote = None;
        while let Some(c) = self.peek_char() {
            self.advance();
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '\'' if depth == 0 => return Ok(()),
                '\'' => last_quote = Some((self.pos, self.line)),
                '\n' => self.line += 1,
                _ => {}
            }
        }

        if let Some((pos, line)) = last_quote {
            self.pos = pos;
            self.line = line;
            return Ok(());
        }

        Err(TokenError::UnterminatedString {
            fragment: self.input[start..].to_string(),
            offset: start,
        })
    }

    fn scan_number(&mut self) -> TokenKind {
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // A '.' only continues the number when a digit follows it
        if self.peek_char() == Some('.')
            && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
            return TokenKind::Decimal;
        }

        TokenKind::Integer
    }

    fn scan_word(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        {
            self.advance();
        }

        let word = &self.input[start..self.pos];
        if word == "d" {
            TokenKind::Operator
        } else if KEYWORDS.contains(&word) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        }
    }

    fn scan_operator(&mut self) -> Option<TokenKind> {
        let rest = &self.input[self.pos..];
        if let Some(op) = LONG_OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            self.pos += op.len();
            return Some(if *op == "->" {
                TokenKind::Pointer
            } else {
                TokenKind::Operator
            });
        }

        let c = self.peek_char()?;
        if SHORT_OPERATORS.contains(&c) {
            self.advance();
            return Some(TokenKind::Operator);
        }
        None
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, TokenError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Scan a whole formula, including trivia tokens
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, TokenError> {
    Tokenizer::new(input, Rc::from("formula"), 1).collect()
}
