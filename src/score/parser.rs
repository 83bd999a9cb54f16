//! Syntax tree and parser for score files.
//!
//! A score is a short script in a JavaScript-like syntax:
//!
//! ```text
//! program    := statement*
//! statement  := ('const' | 'let' | 'var') ident '=' expr ';'?
//!             | expr ';'?
//! expr       := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := '-' unary | postfix
//! postfix    := primary ('.' ident | '(' args ')')*
//! primary    := number | string | ident | '(' expr ')' | object | array
//! object     := '{' (key ':' expr),* '}'
//! array      := '[' expr,* ']'
//! ```

use super::lexer::{tokenize, Pos, Spanned, Token};
use crate::error::ScoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Ident(String),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Member { object: Box<Expr>, name: String },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Neg(Box<Expr>),
}

/// An expression and where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Bind { name: String, value: Expr, pos: Pos },
    Expr(Expr),
}

/// A parsed score file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let token = self.peek().clone();
        if token.token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if &self.peek().token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, at: Pos, message: impl Into<String>) -> ScoreError {
        ScoreError::Syntax {
            line: at.line,
            column: at.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, token: Token) -> Result<Spanned, ScoreError> {
        let next = self.peek().clone();
        if next.token == token {
            Ok(self.advance())
        } else {
            Err(self.error(next.pos, format!("expected {}, found {}", token, next.token)))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Pos), ScoreError> {
        let next = self.advance();
        match next.token {
            Token::Ident(name) => Ok((name, next.pos)),
            other => Err(self.error(next.pos, format!("expected a name, found {}", other))),
        }
    }

    fn program(&mut self) -> Result<Program, ScoreError> {
        let mut statements = Vec::new();
        while self.peek().token != Token::Eof {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement, ScoreError> {
        let next = self.peek().clone();
        if let Token::Ident(keyword) = &next.token {
            if matches!(keyword.as_str(), "const" | "let" | "var") {
                self.advance();
                let (name, pos) = self.expect_ident()?;
                self.expect(Token::Equals)?;
                let value = self.expr()?;
                self.eat(&Token::Semicolon);
                return Ok(Statement::Bind { name, value, pos });
            }
        }
        let expr = self.expr()?;
        self.eat(&Token::Semicolon);
        Ok(Statement::Expr(expr))
    }

    fn expr(&mut self) -> Result<Expr, ScoreError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ScoreError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScoreError> {
        let pos = self.peek().pos;
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Neg(Box::new(inner)),
                pos,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScoreError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let (name, _) = self.expect_ident()?;
                let pos = expr.pos;
                expr = Expr {
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        name,
                    },
                    pos,
                };
            } else if self.peek().token == Token::OpenParen {
                let args = self.delimited(Token::OpenParen, Token::CloseParen, Self::expr)?;
                let pos = expr.pos;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    pos,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated items between `open` and `close`, trailing comma allowed
    fn delimited<T>(
        &mut self,
        open: Token,
        close: Token,
        mut item: impl FnMut(&mut Self) -> Result<T, ScoreError>,
    ) -> Result<Vec<T>, ScoreError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(item(self)?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScoreError> {
        let next = self.peek().clone();
        let pos = next.pos;
        let kind = match next.token {
            Token::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            Token::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Token::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            Token::OpenParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Token::CloseParen)?;
                return Ok(inner);
            }
            Token::OpenBrace => {
                let entries =
                    self.delimited(Token::OpenBrace, Token::CloseBrace, Self::object_entry)?;
                ExprKind::Object(entries)
            }
            Token::OpenBracket => {
                let items = self.delimited(Token::OpenBracket, Token::CloseBracket, Self::expr)?;
                ExprKind::Array(items)
            }
            other => return Err(self.error(pos, format!("unexpected {}", other))),
        };
        Ok(Expr { kind, pos })
    }

    fn object_entry(&mut self) -> Result<(String, Expr), ScoreError> {
        let next = self.advance();
        let key = match next.token {
            Token::Ident(name) | Token::Str(name) => name,
            other => {
                return Err(self.error(next.pos, format!("expected an object key, found {}", other)))
            }
        };
        self.expect(Token::Colon)?;
        Ok((key, self.expr()?))
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let pos = lhs.pos;
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        pos,
    }
}

/// Parse score source into a syntax tree.
pub fn parse_program(source: &str) -> Result<Program, ScoreError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}
