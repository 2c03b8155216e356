// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Arithmetic correction expressions over record fields
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := unary ('^' factor)?
//! unary   := '-' unary | primary
//! primary := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Identifiers name observation types of the record being corrected. Only
//! the functions `abs`, `min`, `max`, `sqrt` and `round` exist; nothing else
//! can be called.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::Record;

/// Expression errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {found} at offset {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("field '{0}' is missing or null")]
    MissingValue(String),

    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "'{}'", n),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Op(op) => write!(f, "'{}'", op),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos] as char;
        match ch {
            c if c.is_ascii_whitespace() => pos += 1,
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push((Token::Op(ch), pos));
                pos += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                pos += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                pos += 1;
            }
            ',' => {
                tokens.push((Token::Comma, pos));
                pos += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                // Exponent suffix, e.g. 1.5e-3
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut end = pos + 1;
                    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                        end += 1;
                    }
                    if end < bytes.len() && bytes[end].is_ascii_digit() {
                        while end < bytes.len() && bytes[end].is_ascii_digit() {
                            end += 1;
                        }
                        pos = end;
                    }
                }
                let text = &source[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.to_string()))?;
                tokens.push((Token::Number(value), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                tokens.push((Token::Ident(source[start..pos].to_string()), start));
            }
            _ => {
                // Report the full character, not a UTF-8 fragment
                let ch = source[pos..].chars().next().unwrap_or(ch);
                return Err(ExprError::UnexpectedChar { ch, pos });
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Min,
    Max,
    Sqrt,
    Round,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Func::Abs),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "sqrt" => Some(Func::Sqrt),
            "round" => Some(Func::Round),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
            Func::Sqrt => "sqrt",
            Func::Round => "round",
        }
    }

    fn check_arity(self, found: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            Func::Abs | Func::Sqrt | Func::Round => (found == 1, "1"),
            Func::Min | Func::Max => (found >= 1, "1 or more"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                name: self.name(),
                expected,
                found,
            })
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Func::Abs => args[0].abs(),
            Func::Sqrt => args[0].sqrt(),
            Func::Round => args[0].round(),
            Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Field(String),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Result<(Token, usize), ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let (token, pos) = self.next()?;
        if token == want {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                pos,
            })
        }
    }

    fn expr(&mut self) -> Result<Node, ExprError> {
        let mut node = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = if *op == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, ExprError> {
        let mut node = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = if *op == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.factor()?));
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Node, ExprError> {
        let base = self.unary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            // Right associative
            let exponent = self.factor()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        let (token, pos) = self.next()?;
        match token {
            Token::Number(value) => Ok(Node::Number(value)),
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Node::Field(name));
                }
                let func = Func::lookup(&name).ok_or(ExprError::UnknownFunction(name))?;
                self.pos += 1;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen)?;
                func.check_arity(args.len())?;
                Ok(Node::Call(func, args))
            }
            Token::LParen => {
                let node = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(node)
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                pos,
            }),
        }
    }
}

impl Node {
    fn eval(&self, record: &Record) -> Result<f64, ExprError> {
        Ok(match self {
            Node::Number(value) => *value,
            Node::Field(name) => record
                .get(name)
                .ok_or_else(|| ExprError::MissingValue(name.clone()))?,
            Node::Neg(inner) => -inner.eval(record)?,
            Node::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(record)?, rhs.eval(record)?);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Node::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(record))
                    .collect::<Result<Vec<_>, _>>()?;
                func.apply(&values)
            }
        })
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Node::Number(_) => {}
            Node::Field(name) => {
                out.insert(name);
            }
            Node::Neg(inner) => inner.collect_fields(out),
            Node::Binary(_, lhs, rhs) => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            Node::Call(_, args) => args.iter().for_each(|arg| arg.collect_fields(out)),
        }
    }
}

/// A parsed correction expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
        };
        let root = parser.expr()?;
        if let Some((token, pos)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                pos: *pos,
            });
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Evaluate against the current values of `record`
    pub fn eval(&self, record: &Record) -> Result<f64, ExprError> {
        let value = self.root.eval(record)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NotFinite)
        }
    }

    /// Observation types the expression reads
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.root.collect_fields(&mut out);
        out
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for Expression {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
