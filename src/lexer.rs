//! Tokenizer for AddNMult source text.
//!
//! The parser only depends on the [`TokenSource`] trait, so any producer of
//! tokens (this lexer, or a prebuilt list via [`VecSource`]) can feed it.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Number,
    Ident,
    True,
    False,
    Let,
    Set,
    If,
    Else,
    Return,
    Assign,
    Plus,
    Star,
    EqEq,
    NotEq,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Eof => "end of input",
            TokenKind::Number => "number",
            TokenKind::Ident => "identifier",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Let => "'let'",
            TokenKind::Set => "'set'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::Return => "'return'",
            TokenKind::Assign => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Star => "'*'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
        };
        f.write_str(text)
    }
}

/// A single token. `value` is set for numbers, `text` for identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: Option<u64>,
    pub text: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self { kind, value: None, text: None }
    }

    pub fn number(value: u64) -> Self {
        Self { kind: TokenKind::Number, value: Some(value), text: None }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self { kind: TokenKind::Ident, value: None, text: Some(name.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("number literal `{literal}` does not fit in 64 bits")]
    NumberOverflow { literal: String },
}

/// Anything that can hand the parser its next token.
///
/// Implementations must keep returning `Eof` once the input is exhausted.
pub trait TokenSource {
    fn next_token(&mut self) -> Result<Token, LexError>;
}

/// Byte-oriented scanner over a source string.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Drain the whole input, including the trailing `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            out.push(tok);
            if done {
                return Ok(out);
            }
        }
    }

    fn peek_byte(&self, ahead: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + ahead).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek_byte(0) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'/' && self.peek_byte(1) == Some(b'/') {
                while let Some(c) = self.peek_byte(0) {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek_byte(0).is_some_and(&pred) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }
}

impl TokenSource for Lexer<'_> {
    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let Some(b) = self.peek_byte(0) else {
            return Ok(Token::new(TokenKind::Eof));
        };

        if b.is_ascii_digit() {
            let literal = self.take_while(|c| c.is_ascii_digit());
            return literal
                .parse::<u64>()
                .map(Token::number)
                .map_err(|_| LexError::NumberOverflow { literal: literal.to_string() });
        }

        if b.is_ascii_alphabetic() || b == b'_' {
            let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
            let kind = match word {
                "let" => TokenKind::Let,
                "set" => TokenKind::Set,
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "return" => TokenKind::Return,
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                _ => return Ok(Token::ident(word)),
            };
            return Ok(Token::new(kind));
        }

        let (kind, width) = match (b, self.peek_byte(1)) {
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            _ => {
                let ch = self.src[self.pos..].chars().next().unwrap_or('\0');
                return Err(LexError::UnexpectedChar { ch, offset: self.pos });
            }
        };
        self.pos += width;
        Ok(Token::new(kind))
    }
}

/// Token source backed by an already materialized token list.
pub struct VecSource {
    tokens: std::vec::IntoIter<Token>,
}

impl From<Vec<Token>> for VecSource {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens: tokens.into_iter() }
    }
}

impl TokenSource for VecSource {
    fn next_token(&mut self) -> Result<Token, LexError> {
        Ok(self.tokens.next().unwrap_or_else(|| Token::new(TokenKind::Eof)))
    }
}
