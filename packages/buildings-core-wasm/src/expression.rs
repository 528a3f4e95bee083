//! Numeric expressions evaluated against feature attributes.
//!
//! Attribute references are written in brackets: `[height] * 1.2`,
//! `max([levels] * 3.5, 6)`. Supported: numbers, `+ - * / %`, unary minus,
//! parentheses and the functions `min max abs round floor ceil`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::BuildError;
use crate::feature::Feature;

// Bounds on nesting and on source length keep parsing and evaluation off deep stacks
const MAX_DEPTH: usize = 64;
const MAX_SOURCE_LEN: usize = 4096;

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(f64),
    Attribute(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, Op, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Func {
    Min,
    Max,
    Abs,
    Round,
    Floor,
    Ceil,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "abs" => Some(Func::Abs),
            "round" => Some(Func::Round),
            "floor" => Some(Func::Floor),
            "ceil" => Some(Func::Ceil),
            _ => None,
        }
    }

    fn arity_ok(&self, n: usize) -> bool {
        match self {
            Func::Min | Func::Max => n >= 1,
            _ => n == 1,
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct NumericExpression {
    source: String,
    expr: Expr,
}

impl NumericExpression {
    pub fn parse(source: &str) -> Result<Self, BuildError> {
        let mut parser = Parser {
            src: source,
            chars: source.char_indices().peekable(),
            depth: 0,
        };
        if source.len() > MAX_SOURCE_LEN {
            return Err(parser.error(format!("longer than {} bytes", MAX_SOURCE_LEN)));
        }
        let expr = parser.expr()?;
        parser.skip_ws();
        if let Some(&(at, c)) = parser.chars.peek() {
            return Err(parser.error(format!("unexpected '{}' at {}", c, at)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn literal(value: f64) -> Self {
        Self {
            source: value.to_string(),
            expr: Expr::Number(value),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `None` when a referenced attribute is missing or not numeric.
    pub fn eval(&self, feature: &Feature) -> Option<f64> {
        eval(&self.expr, feature)
    }
}

fn eval(expr: &Expr, feature: &Feature) -> Option<f64> {
    Some(match expr {
        Expr::Number(v) => *v,
        Expr::Attribute(name) => feature.get_f64(name)?,
        Expr::Neg(inner) => -eval(inner, feature)?,
        Expr::Binary(lhs, op, rhs) => {
            let a = eval(lhs, feature)?;
            let b = eval(rhs, feature)?;
            match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => a / b,
                Op::Rem => a % b,
            }
        }
        Expr::Call(func, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, feature))
                .collect::<Option<Vec<f64>>>()?;
            match func {
                Func::Min => values.into_iter().fold(f64::INFINITY, f64::min),
                Func::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
                Func::Abs => values[0].abs(),
                Func::Round => values[0].round(),
                Func::Floor => values[0].floor(),
                Func::Ceil => values[0].ceil(),
            }
        }
    })
}

struct Parser<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: String) -> BuildError {
        BuildError::Expression {
            expr: self.src.to_string(),
            reason,
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, BuildError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat('+') {
                Op::Add
            } else if self.eat('-') {
                Op::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, BuildError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat('*') {
                Op::Mul
            } else if self.eat('/') {
                Op::Div
            } else if self.eat('%') {
                Op::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    // Every nested construct passes through here
    fn unary(&mut self) -> Result<Expr, BuildError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep".into()));
        }
        self.depth += 1;
        let result = if self.eat('-') {
            self.unary().map(|inner| Expr::Neg(Box::new(inner)))
        } else {
            self.primary()
        };
        self.depth -= 1;
        result
    }

    fn primary(&mut self) -> Result<Expr, BuildError> {
        let src = self.src;
        self.skip_ws();
        let Some(&(start, c)) = self.chars.peek() else {
            return Err(self.error("unexpected end of expression".into()));
        };

        if c == '(' {
            self.chars.next();
            let inner = self.expr()?;
            if !self.eat(')') {
                return Err(self.error("missing ')'".into()));
            }
            return Ok(inner);
        }

        if c == '[' {
            self.chars.next();
            let mut name = String::new();
            loop {
                match self.chars.next() {
                    Some((_, ']')) => break,
                    Some((_, ch)) => name.push(ch),
                    None => return Err(self.error("missing ']'".into())),
                }
            }
            let name = name.trim();
            if name.is_empty() {
                return Err(self.error("empty attribute reference".into()));
            }
            return Ok(Expr::Attribute(name.to_string()));
        }

        if c.is_ascii_digit() || c == '.' {
            let end = self.take_while(|ch| ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E');
            let text = &src[start..end];
            return text
                .parse()
                .map(Expr::Number)
                .map_err(|_| self.error(format!("bad number '{}'", text)));
        }

        if c.is_ascii_alphabetic() {
            let end = self.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
            let name = &src[start..end];
            let func = Func::lookup(name).ok_or_else(|| self.error(format!("unknown function '{}'", name)))?;
            if !self.eat('(') {
                return Err(self.error(format!("expected '(' after {}", name)));
            }
            let mut args = Vec::new();
            if !self.eat(')') {
                loop {
                    args.push(self.expr()?);
                    if self.eat(')') {
                        break;
                    }
                    if !self.eat(',') {
                        return Err(self.error("expected ',' or ')'".into()));
                    }
                }
            }
            if !func.arity_ok(args.len()) {
                return Err(self.error(format!("wrong argument count for {}", name)));
            }
            return Ok(Expr::Call(func, args));
        }

        Err(self.error(format!("unexpected '{}' at {}", c, start)))
    }

    // Consume while `pred` holds; returns the byte offset just past the run
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let mut end = self.src.len();
        while let Some(&(at, ch)) = self.chars.peek() {
            if pred(ch) {
                self.chars.next();
            } else {
                end = at;
                break;
            }
        }
        end
    }
}

impl fmt::Debug for NumericExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NumericExpression({})", self.source)
    }
}

impl Serialize for NumericExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for NumericExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(NumericExpression::literal(v)),
            Raw::Text(s) => NumericExpression::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
