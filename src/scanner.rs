//! Lexical analysis.
//!
//! Contains the [Scanner] which implements an [Iterator] that yields [Lexeme]s, each of which
//! represents a [Token].
//!
//! # Example
//!
//! ```
//! use lox_arith::scanner::{Scanner, Token};
//! let scanner = Scanner::new("(1 + 2) ^ 3!");
//! let tokens: Vec<_> = scanner.map(|lexeme| lexeme.token()).collect();
//!
//! use Token::*;
//! assert_eq!(
//!     vec![LeftParen, Number, Plus, Number, RightParen, Caret, Number, Bang, Eof],
//!     tokens
//! );
//! ```
//!
//! # Note on terminology
//!
//! The kind of a lexeme is a [Token]; the lexeme itself, with its text and position, is a
//! [Lexeme]. This avoids using "type" as an identifier.

use std::iter::FusedIterator;
use std::ops::Range;

use enum_map::Enum;

/// A lexeme from one contiguous string of source code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme<'a> {
    /// The [Token] of this lexeme.
    token: Token,
    /// The actual text from the source code, or the diagnostic for [Token::Error].
    text: &'a str,
    /// Byte offset of the lexeme's first character in the source.
    offset: usize,
    /// The line where this lexeme came from.
    line: usize,
}

/// What _kind_ of [Lexeme] you have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[rustfmt::skip]
pub enum Token {
    // Single-character tokens.
    LeftParen, RightParen,
    LeftBrace, RightBrace,
    Comma, Dot, Minus, Plus,
    Semicolon, Star, Slash,
    Question, Colon, Caret,
    // One or two character tokens
    Bang, BangEqual,
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,
    // Literals
    Identifier, StrLiteral, Number,
    // Keywords
    And, Class, Else, False,
    For, Fun, If, Nil, Or,
    Print, Return, Super, This,
    True, Var, While,

    // Others
    Error, Eof
}

/// Scans source code and iteratively yields [Lexeme]s.
///
/// The scanner is stateful, and therefore, can only be used to do one pass over the source code
/// string. Once the whole source code has been scanned, [Scanner::next_token()] will forever
/// return [Token::Eof], while the [Iterator] implementation yields it exactly once.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    source: &'a str,
    start: &'a str,
    current: &'a str,
    line: usize,
    yielded_eof: bool,
}

impl<'a> Scanner<'a> {
    /// Start scanning the given string of source code.
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            start: source,
            current: source,
            line: 1,
            yielded_eof: false,
        }
    }

    /// Yield the next [Lexeme] from the string. Once the scanner has reached the end-of-file, this
    /// function will always return an end-of-file lexeme.
    pub fn next_token(&mut self) -> Lexeme<'a> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_lexeme(Token::Eof);
        }

        match self.advance() {
            c if is_id_start(c) => self.identifier(),
            c if c.is_ascii_digit() => self.number(),
            '(' => self.make_lexeme(Token::LeftParen),
            ')' => self.make_lexeme(Token::RightParen),
            '{' => self.make_lexeme(Token::LeftBrace),
            '}' => self.make_lexeme(Token::RightBrace),
            ';' => self.make_lexeme(Token::Semicolon),
            ',' => self.make_lexeme(Token::Comma),
            '.' => self.make_lexeme(Token::Dot),
            '-' => self.make_lexeme(Token::Minus),
            '+' => self.make_lexeme(Token::Plus),
            '/' => self.make_lexeme(Token::Slash),
            '*' => self.make_lexeme(Token::Star),
            '?' => self.make_lexeme(Token::Question),
            ':' => self.make_lexeme(Token::Colon),
            '^' => self.make_lexeme(Token::Caret),
            '!' => self.one_or_two('=', Token::BangEqual, Token::Bang),
            '=' => self.one_or_two('=', Token::EqualEqual, Token::Equal),
            '<' => self.one_or_two('=', Token::LessEqual, Token::Less),
            '>' => self.one_or_two('=', Token::GreaterEqual, Token::Greater),
            '"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    /// Returns `true` if we've reached the end of the source code.
    pub fn is_at_end(&self) -> bool {
        self.current.is_empty()
    }

    /// Returns an error lexeme that does not come from the source. Useful as a placeholder before
    /// the first real lexeme has been scanned.
    pub fn make_sentinel(&self, message: &'static str) -> Lexeme<'a> {
        Lexeme {
            token: Token::Error,
            text: message,
            offset: 0,
            line: 0,
        }
    }

    /// Advances self.current, s.t., self.start < self.current are a reference to the same str.
    /// Returns the next valid char.
    ///
    /// # Panics
    ///
    /// If this is called at the end of string.
    fn advance(&mut self) -> char {
        let c = match self.current.chars().next() {
            Some(c) => c,
            None => panic!("called advance() at end of file"),
        };

        self.current = &self.current[c.len_utf8()..];
        c
    }

    /// Peek at the first char in self.current.
    fn peek(&self) -> char {
        self.current.chars().next().unwrap_or('\0')
    }

    /// Peek at the second char in self.current.
    fn peek_next(&self) -> char {
        let mut chars = self.current.chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    /// Matches the expected character. If the next character matches, returns true and advances
    /// self.current. Otherwise, return false and does not update anything.
    fn match_and_advance(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }

        self.current = &self.current[expected.len_utf8()..];
        true
    }

    /// Makes `double` if the next char is `second`, otherwise `single`.
    fn one_or_two(&mut self, second: char, double: Token, single: Token) -> Lexeme<'a> {
        let token = if self.match_and_advance(second) {
            double
        } else {
            single
        };
        self.make_lexeme(token)
    }

    /// Skips whitespace and comments.
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                // Comments are "whitespace"
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => return,
            };
        }
    }

    /// Scan an identifier or keyword.
    fn identifier(&mut self) -> Lexeme<'a> {
        while is_id_continue(self.peek()) {
            self.advance();
        }

        self.make_lexeme(self.identifier_type())
    }

    /// Scan a string literal. Expects the starting quote to have been consumed.
    fn string(&mut self) -> Lexeme<'a> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        // The closing quote.
        self.advance();
        self.make_lexeme(Token::StrLiteral)
    }

    /// Scan a number literal. Expects the first digit to have already been consumed.
    ///
    /// There is no exponent notation: `1e3` is a number followed by an identifier.
    fn number(&mut self) -> Lexeme<'a> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            // Consume the decimal point
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make_lexeme(Token::Number)
    }

    /// Check if the identifier is a keyword, or a normal identifier.
    fn identifier_type(&self) -> Token {
        let mut chars = self.start.chars();

        match chars.next().unwrap_or('\0') {
            'a' => self.check_keyword("and", Token::And),
            'c' => self.check_keyword("class", Token::Class),
            'e' => self.check_keyword("else", Token::Else),
            'f' => match chars.next().unwrap_or('\0') {
                'a' => self.check_keyword("false", Token::False),
                'o' => self.check_keyword("for", Token::For),
                'u' => self.check_keyword("fun", Token::Fun),
                _ => Token::Identifier,
            },
            'i' => self.check_keyword("if", Token::If),
            'n' => self.check_keyword("nil", Token::Nil),
            'o' => self.check_keyword("or", Token::Or),
            'p' => self.check_keyword("print", Token::Print),
            'r' => self.check_keyword("return", Token::Return),
            's' => self.check_keyword("super", Token::Super),
            't' => match chars.next().unwrap_or('\0') {
                'h' => self.check_keyword("this", Token::This),
                'r' => self.check_keyword("true", Token::True),
                _ => Token::Identifier,
            },
            'v' => self.check_keyword("var", Token::Var),
            'w' => self.check_keyword("while", Token::While),
            _ => Token::Identifier,
        }
    }

    /// Confirms that the current lexeme is a keyword or an identifier.
    fn check_keyword(&self, keyword_text: &'static str, keyword: Token) -> Token {
        if self.current_text() == keyword_text {
            keyword
        } else {
            Token::Identifier
        }
    }

    /// The source text between self.start and self.current.
    fn current_text(&self) -> &'a str {
        let extent = self.start.len() - self.current.len();
        &self.start[..extent]
    }

    /// Byte offset of self.start in the source.
    fn start_offset(&self) -> usize {
        self.source.len() - self.start.len()
    }

    /// Returns a lexeme with [Token::Error] as its token.
    fn error_token(&self, message: &'static str) -> Lexeme<'a> {
        debug_assert_ne!(self.start.len(), self.current.len());
        Lexeme {
            token: Token::Error,
            text: message,
            offset: self.start_offset(),
            line: self.line,
        }
    }

    /// Returns a [Lexeme] from the span between self.start and self.current with the given
    /// [Token].
    fn make_lexeme(&self, token: Token) -> Lexeme<'a> {
        Lexeme {
            token,
            text: self.current_text(),
            offset: self.start_offset(),
            line: self.line,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Lexeme<'a>;

    fn next(&mut self) -> Option<Lexeme<'a>> {
        if self.yielded_eof {
            return None;
        }

        let lexeme = self.next_token();
        self.yielded_eof = lexeme.token() == Token::Eof;
        Some(lexeme)
    }
}

impl FusedIterator for Scanner<'_> {}

impl<'a> Lexeme<'a> {
    /// Return the line number this token was found on.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Return the literal text of this token. For string literals, this always includes the
    /// quotes. For [Token::Error], this is the diagnostic message.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Return the [Token] of this lexeme.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Byte offset of the start of this lexeme in the source.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The byte range of the source this lexeme was scanned from. Empty for [Token::Error] and
    /// [Token::Eof], whose text does not come from the source.
    pub fn span(&self) -> Range<usize> {
        match self.token {
            Token::Error | Token::Eof => self.offset..self.offset,
            _ => self.offset..self.offset + self.text.len(),
        }
    }
}

///////////////////////////////////////////// Helpers /////////////////////////////////////////////

/// Returns true if this char can start an identifier or keyword.
fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns true if this char can be used after the first character of an identifier or keyword.
fn is_id_continue(c: char) -> bool {
    is_id_start(c) || c.is_ascii_digit()
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////
