//! Expression parsing — tokenizer, precedence-climbing parser, name resolution.
//!
//! Purpose
//! -------
//! Turn the textual expressions of a model file (utilities, definitions,
//! availability, derived columns, exclusion rules) into resolved [`Expr`]
//! trees. Every identifier is bound to a parameter, draw, definition or data
//! column while parsing, so an unknown name is a configuration error raised
//! before any data is touched by the likelihood.
//!
//! Grammar
//! -------
//! Lowest to highest precedence:
//!
//! ```text
//! or      := and  ( "||" and )*
//! and     := cmp  ( "&&" cmp )*
//! cmp     := add  ( ("<" | "<=" | ">" | ">=" | "==" | "!=") add )?
//! add     := mul  ( ("+" | "-") mul )*
//! mul     := unary ( ("*" | "/") unary )*
//! unary   := ("-" | "!") unary | atom
//! atom    := number | ident | ident "(" or ")" | "(" or ")"
//! ```
//!
//! Functions: `exp`, `log` (alias `ln`) and `abs`.
//!
//! Conventions
//! -----------
//! - Resolution order is parameters, draws, definitions, then data columns.
//!   Names in the first three namespaces are unique across them
//!   ([`Scope`] rejects duplicates).
//! - Error positions are byte offsets into the original text.
use std::{collections::HashMap, sync::Arc};

use crate::choice::{
    core::expr::{BinaryOp, Definition, Expr, UnaryOp},
    errors::{ChoiceError, ChoiceResult},
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

/// Name bindings available to the parser.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    parameters: HashMap<String, usize>,
    draws: HashMap<String, usize>,
    definitions: HashMap<String, Arc<Definition>>,
    covariates: HashMap<String, usize>,
}

impl Scope {
    /// Scope for row-level rules: data columns only.
    pub fn data_only<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut scope = Scope::default();
        scope.set_covariates(columns);
        scope
    }

    /// Replace the data-column bindings (column index = position).
    pub fn set_covariates<S: AsRef<str>>(&mut self, columns: &[S]) {
        self.covariates =
            columns.iter().enumerate().map(|(i, c)| (c.as_ref().to_string(), i)).collect();
    }

    pub fn add_parameter(&mut self, name: &str, index: usize) -> ChoiceResult<()> {
        self.ensure_unbound(name)?;
        self.parameters.insert(name.to_string(), index);
        Ok(())
    }

    pub fn add_draw(&mut self, name: &str, index: usize) -> ChoiceResult<()> {
        self.ensure_unbound(name)?;
        self.draws.insert(name.to_string(), index);
        Ok(())
    }

    pub fn add_definition(&mut self, def: Arc<Definition>) -> ChoiceResult<()> {
        self.ensure_unbound(&def.name)?;
        self.definitions.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<usize> {
        self.parameters.get(name).copied()
    }

    pub fn covariate(&self, name: &str) -> Option<usize> {
        self.covariates.get(name).copied()
    }

    fn ensure_unbound(&self, name: &str) -> ChoiceResult<()> {
        if self.parameters.contains_key(name)
            || self.draws.contains_key(name)
            || self.definitions.contains_key(name)
        {
            return Err(ChoiceError::DuplicateName { name: name.to_string() });
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<Expr> {
        if let Some(&i) = self.parameters.get(name) {
            return Some(Expr::Param(i));
        }
        if let Some(&i) = self.draws.get(name) {
            return Some(Expr::Draw(i));
        }
        if let Some(def) = self.definitions.get(name) {
            return Some(Expr::Named(Arc::clone(def)));
        }
        self.covariates.get(name).map(|&i| Expr::Covariate(i))
    }
}

/// Parse `input` and resolve its names against `scope`.
///
/// # Errors
/// - [`ChoiceError::Parse`] for lexical or syntax errors (with byte offset).
/// - [`ChoiceError::UnknownIdentifier`] for names bound in no namespace.
pub fn parse_expr(input: &str, scope: &Scope) -> ChoiceResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { input, tokens: &tokens, pos: 0, scope };
    let expr = parser.parse_or()?;
    if parser.pos < tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> ChoiceResult<Vec<(Token, usize)>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let two = if i + 1 < bytes.len() { &bytes[i..i + 2] } else { &bytes[i..i + 1] };
        let pair = match two {
            b"&&" => Some(Token::And),
            b"||" => Some(Token::Or),
            b"==" => Some(Token::Eq),
            b"!=" => Some(Token::Ne),
            b"<=" => Some(Token::Le),
            b">=" => Some(Token::Ge),
            _ => None,
        };
        if let Some(t) = pair {
            tokens.push((t, i));
            i += 2;
            continue;
        }

        let single = match c {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'<' => Some(Token::Lt),
            b'>' => Some(Token::Gt),
            b'!' => Some(Token::Not),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push((t, i));
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit()
                    || bytes[i] == b'.'
                    || bytes[i] == b'e'
                    || bytes[i] == b'E'
                    || ((bytes[i] == b'+' || bytes[i] == b'-')
                        && i > start
                        && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
            {
                i += 1;
            }
            let text = &input[start..i];
            let value: f64 = text.parse().map_err(|_| ChoiceError::Parse {
                expr: input.to_string(),
                position: start,
                message: format!("invalid number '{text}'"),
            })?;
            tokens.push((Token::Num(value), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((Token::Ident(input[start..i].to_string()), start));
            continue;
        }

        return Err(ChoiceError::Parse {
            expr: input.to_string(),
            position: i,
            message: "unexpected character".to_string(),
        });
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [(Token, usize)],
    pos: usize,
    scope: &'a Scope,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|&(_, p)| p).unwrap_or(self.input.len())
    }

    fn error(&self, message: &str) -> ChoiceError {
        ChoiceError::Parse {
            expr: self.input.to_string(),
            position: self.offset(),
            message: message.to_string(),
        }
    }

    fn expect_rparen(&mut self) -> ChoiceResult<()> {
        match self.peek() {
            Some(Token::RParen) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error("expected ')'")),
        }
    }

    fn parse_or(&mut self) -> ChoiceResult<Expr> {
        let mut lhs = self.parse_and()?;
        while let Some(Token::Or) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ChoiceResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while let Some(Token::And) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_cmp()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> ChoiceResult<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_add()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_add(&mut self) -> ChoiceResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> ChoiceResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> ChoiceResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let arg = self.parse_unary()?;
                Ok(match arg {
                    Expr::Const(c) => Expr::Const(-c),
                    other => Expr::unary(UnaryOp::Neg, other),
                })
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> ChoiceResult<Expr> {
        match self.peek() {
            Some(Token::Num(v)) => {
                self.pos += 1;
                Ok(Expr::Const(*v))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let at = self.offset();
                self.pos += 1;
                if let Some(Token::LParen) = self.peek() {
                    let op = match name.as_str() {
                        "exp" => UnaryOp::Exp,
                        "log" | "ln" => UnaryOp::Log,
                        "abs" => UnaryOp::Abs,
                        _ => {
                            return Err(ChoiceError::Parse {
                                expr: self.input.to_string(),
                                position: at,
                                message: format!("unknown function '{name}'"),
                            });
                        }
                    };
                    self.pos += 1;
                    let arg = self.parse_or()?;
                    self.expect_rparen()?;
                    return Ok(Expr::unary(op, arg));
                }
                self.scope
                    .resolve(name)
                    .ok_or_else(|| ChoiceError::UnknownIdentifier { name: name.clone() })
            }
            Some(_) => Err(self.error("unexpected token")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}
