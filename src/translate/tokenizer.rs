//! Tokenizer for Tableau calculation formulas
//!
//! Converts formula strings like `SUM([Profit]) / SUM([Sales])` into a
//! sequence of tokens. Each token remembers whether whitespace preceded it
//! so the emitter can keep the author's operator spacing.

use super::TranslateError;
use std::iter::Peekable;
use std::str::Chars;

/// Token payload
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal, kept as written (e.g. `12`, `0.5`, `1e3`)
    Number(String),
    /// String literal, quotes removed and escapes resolved
    Text(String),
    /// Date literal between `#` marks, e.g. `#2024-01-31#`
    Date(String),
    /// `[Name]` or `[Source].[Name]`
    Field { source: Option<String>, name: String },
    /// Function names and keywords (IF, THEN, AND, ...)
    Identifier(String),
    /// + - * / % ^ = == != <> < <= > >=
    Operator(String),
    OpenParen,
    CloseParen,
    Comma,
    /// Opening brace of a level-of-detail expression
    OpenBrace,
    CloseBrace,
    Colon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset in the formula
    pub position: usize,
    /// Whitespace or a comment preceded this token
    pub spaced: bool,
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula
    pub fn tokenize(mut self) -> Result<Vec<Token>, TranslateError> {
        let mut tokens = Vec::new();
        loop {
            let spaced = self.skip_trivia()?;
            let position = self.position;
            match self.next_kind()? {
                Some(kind) => tokens.push(Token {
                    kind,
                    position,
                    spaced,
                }),
                None => break,
            }
        }
        Ok(tokens)
    }

    fn next_kind(&mut self) -> Result<Option<TokenKind>, TranslateError> {
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '"' | '\'' => self.read_string()?,
            '[' => self.read_field()?,
            '#' => self.read_date()?,
            '(' => self.single(TokenKind::OpenParen),
            ')' => self.single(TokenKind::CloseParen),
            ',' => self.single(TokenKind::Comma),
            '{' => self.single(TokenKind::OpenBrace),
            '}' => self.single(TokenKind::CloseBrace),
            ':' => self.single(TokenKind::Colon),
            '+' | '-' | '*' | '/' | '%' | '^' => {
                self.advance();
                TokenKind::Operator(c.to_string())
            }
            '=' | '!' | '<' | '>' => self.read_comparison()?,
            c if c.is_ascii_digit() => self.read_number(),
            '.' if self.second_char().is_some_and(|d| d.is_ascii_digit()) => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c => {
                return Err(TranslateError::syntax(
                    format!("unexpected character '{c}'"),
                    self.position,
                ))
            }
        };
        Ok(Some(kind))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Skip whitespace, `//` line comments and `/* */` block comments.
    /// Returns true if anything was skipped.
    fn skip_trivia(&mut self) -> Result<bool, TranslateError> {
        let mut skipped = false;
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                    skipped = true;
                }
                Some('/') if self.second_char() == Some('/') => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                    skipped = true;
                }
                Some('/') if self.second_char() == Some('*') => {
                    let start = self.position;
                    self.advance();
                    self.advance();
                    let mut previous = None;
                    loop {
                        match self.advance() {
                            Some('/') if previous == Some('*') => break,
                            Some(c) => previous = Some(c),
                            None => {
                                return Err(TranslateError::syntax("unterminated comment", start));
                            }
                        }
                    }
                    skipped = true;
                }
                _ => return Ok(skipped),
            }
        }
    }

    fn second_char(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    /// Read a string literal. A doubled quote inside is an escaped quote.
    fn read_string(&mut self) -> Result<TokenKind, TranslateError> {
        let start = self.position;
        let quote = self.advance().unwrap_or('"');
        let mut value = String::new();

        loop {
            match self.advance() {
                None => return Err(TranslateError::syntax("unterminated string literal", start)),
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        value.push(quote);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(TokenKind::Text(value))
    }

    /// Read `[Name]`, optionally followed by `.[Name]`
    fn read_field(&mut self) -> Result<TokenKind, TranslateError> {
        let first = self.read_bracketed()?;

        let mut ahead = self.chars.clone();
        if ahead.next() == Some('.') && ahead.next() == Some('[') {
            self.advance();
            let name = self.read_bracketed()?;
            return Ok(TokenKind::Field {
                source: Some(first),
                name,
            });
        }

        Ok(TokenKind::Field {
            source: None,
            name: first,
        })
    }

    /// Read one bracketed identifier. `]]` is an escaped `]`.
    fn read_bracketed(&mut self) -> Result<String, TranslateError> {
        let start = self.position;
        self.advance(); // [
        let mut name = String::new();

        loop {
            match self.advance() {
                None => return Err(TranslateError::syntax("unterminated field reference", start)),
                Some(']') => {
                    if self.peek() == Some(']') {
                        name.push(']');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => name.push(c),
            }
        }

        if name.trim().is_empty() {
            return Err(TranslateError::syntax("empty field reference", start));
        }
        Ok(name)
    }

    fn read_date(&mut self) -> Result<TokenKind, TranslateError> {
        let start = self.position;
        self.advance(); // #
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(TranslateError::syntax("unterminated date literal", start)),
                Some('#') => break,
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::Date(value.trim().to_string()))
    }

    fn read_comparison(&mut self) -> Result<TokenKind, TranslateError> {
        let start = self.position;
        let first = self.advance().unwrap_or('=');
        let op = match (first, self.peek()) {
            ('=', Some('='))
            | ('!', Some('='))
            | ('<', Some('='))
            | ('>', Some('='))
            | ('<', Some('>')) => {
                let second = self.advance().unwrap_or('=');
                format!("{first}{second}")
            }
            ('!', _) => return Err(TranslateError::syntax("expected '=' after '!'", start)),
            _ => first.to_string(),
        };
        Ok(TokenKind::Operator(op))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> TokenKind {
        let mut text = String::new();
        self.take_digits(&mut text);

        if self.peek() == Some('.') {
            text.push('.');
            self.advance();
            self.take_digits(&mut text);
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            let mut ahead = self.chars.clone();
            ahead.next();
            let next = ahead.next();
            let exponent_follows = match next {
                Some(d) if d.is_ascii_digit() => true,
                Some('+' | '-') => ahead.next().is_some_and(|d| d.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                text.push(e);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.advance();
                }
                self.take_digits(&mut text);
            }
        }

        TokenKind::Number(text)
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Identifier(ident)
    }
}
