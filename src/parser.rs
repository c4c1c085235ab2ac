//! Recursive-descent parser with one token of lookahead.
//!
//! Grammar, lowest binding first:
//!
//! ```text
//! program    := { statement }
//! statement  := let | set | if | return
//! let        := "let" IDENT "=" compare
//! set        := "set" IDENT "=" compare
//! if         := "if" compare "{" { statement } "}" [ "else" "{" { statement } "}" ]
//! return     := "return" compare
//! compare    := sum [ ("==" | "!=") sum ]
//! sum        := product { "+" product }
//! product    := atom { "*" atom }
//! atom       := NUMBER | IDENT | "true" | "false" | "(" compare ")"
//! ```
//!
//! The first malformed construct aborts parsing; no partial tree is returned.

use thiserror::Error;
use tracing::debug;

use crate::ast::{BinOp, Expr, Program, Stmt};
use crate::lexer::{LexError, Lexer, Token, TokenKind, TokenSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    Expected {
        expected: &'static str,
        found: TokenKind,
    },
    #[error("{kind} token carries no payload")]
    MissingPayload { kind: TokenKind },
    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Parse a complete program from raw source text.
pub fn parse(src: &str) -> Result<Program, ParseError> {
    Parser::new(Lexer::new(src))?.parse_program()
}

pub struct Parser<S> {
    source: S,
    token: Token,
}

impl<S: TokenSource> Parser<S> {
    /// Wrap a token source and prime the lookahead token.
    pub fn new(mut source: S) -> Result<Self, ParseError> {
        let token = source.next_token()?;
        Ok(Self { source, token })
    }

    /// Consume statements until end of input.
    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        while !self.is(TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        debug!(statements = stmts.len(), "parsed program");
        Ok(Program { stmts })
    }

    fn is(&self, kind: TokenKind) -> bool {
        self.token.kind == kind
    }

    fn at_statement_start(&self) -> bool {
        matches!(
            self.token.kind,
            TokenKind::Let | TokenKind::Set | TokenKind::If | TokenKind::Return
        )
    }

    /// Move to the next token and hand back the one just consumed.
    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.source.next_token()?;
        Ok(std::mem::replace(&mut self.token, next))
    }

    fn expect(&mut self, kind: TokenKind, what: &'static str) -> Result<Token, ParseError> {
        if !self.is(kind) {
            return Err(self.unexpected(what));
        }
        self.advance()
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(TokenKind::Ident, "identifier")?;
        tok.text.ok_or(ParseError::MissingPayload { kind: TokenKind::Ident })
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::Expected {
            expected,
            found: self.token.kind,
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.token.kind {
            TokenKind::Let => {
                let (name, init) = self.parse_binding(TokenKind::Let, "'let'")?;
                Ok(Stmt::Let { name, init })
            }
            TokenKind::Set => {
                let (name, value) = self.parse_binding(TokenKind::Set, "'set'")?;
                Ok(Stmt::Set { name, value })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::Return => {
                self.advance()?;
                let value = self.parse_compare()?;
                Ok(Stmt::Return { value })
            }
            _ => Err(self.unexpected("statement")),
        }
    }

    // `let` and `set` share the `<kw> IDENT "=" compare` shape.
    fn parse_binding(
        &mut self,
        keyword: TokenKind,
        what: &'static str,
    ) -> Result<(String, Expr), ParseError> {
        self.expect(keyword, what)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Assign, "'='")?;
        let expr = self.parse_compare()?;
        Ok((name, expr))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.parse_compare()?;
        let then_body = self.parse_block()?;

        let else_body = if self.is(TokenKind::Else) {
            self.advance()?;
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while self.at_statement_start() {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    /// At most one comparison; `a == b == c` leaves the second `==` unconsumed.
    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_sum()?;
        let op = match self.token.kind {
            TokenKind::EqEq => BinOp::Equal,
            TokenKind::NotEq => BinOp::NotEqual,
            _ => return Ok(lhs),
        };
        self.advance()?;
        let rhs = self.parse_sum()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_product()?;
        while self.is(TokenKind::Plus) {
            self.advance()?;
            let rhs = self.parse_product()?;
            lhs = Expr::binary(BinOp::Add, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_atom()?;
        while self.is(TokenKind::Star) {
            self.advance()?;
            let rhs = self.parse_atom()?;
            lhs = Expr::binary(BinOp::Mul, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.token.kind {
            TokenKind::Number => {
                let tok = self.advance()?;
                tok.value
                    .map(Expr::Number)
                    .ok_or(ParseError::MissingPayload { kind: TokenKind::Number })
            }
            TokenKind::Ident => Ok(Expr::Var(self.expect_ident()?)),
            TokenKind::True => {
                self.advance()?;
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expr::Bool(false))
            }
            TokenKind::LParen => {
                self.advance()?;
                let inner = self.parse_compare()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("a number, variable, or parenthesis")),
        }
    }
}
