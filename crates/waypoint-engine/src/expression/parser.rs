//! Recursive-descent parser.
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, `== !=`, `< <= > >=`, `+ -`,
//! `* / %`, unary `! -`, postfix `.field` / `[index]`.

use serde_json::Value;

use super::ParseError;
use super::ast::{BinaryOp, Expr, Function, PathBase, UnaryOp};
use super::lexer::{Spanned, Token, tokenize};
use crate::path::PathSegment;

pub(crate) fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {}", other.describe()))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {what}, found {}",
                self.peek().describe()
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.tokens[self.pos].offset, message)
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon, "':' in conditional")?;
        let otherwise = self.ternary()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            // Fold negative numeric literals.
            if let Expr::Literal(Value::Number(n)) = &operand {
                if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                    return Ok(Expr::Literal(Value::from(i)));
                }
                if let Some(f) = n.as_f64()
                    && !n.is_i64()
                {
                    return Ok(Expr::Literal(Value::from(-f)));
                }
            }
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let segment = match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.field_name()?;
                    PathSegment::Field(name)
                }
                Token::LBracket => {
                    self.advance();
                    let index = match self.advance() {
                        Token::Int(n) if n >= 0 => n as usize,
                        other => {
                            return Err(self.error(format!(
                                "expected non-negative array index, found {}",
                                other.describe()
                            )));
                        }
                    };
                    self.expect(Token::RBracket, "']'")?;
                    PathSegment::Index(index)
                }
                _ => return Ok(expr),
            };
            expr = match expr {
                Expr::Path { base, mut segments } => {
                    segments.push(segment);
                    Expr::Path { base, segments }
                }
                other => Expr::Path {
                    base: PathBase::Expr(Box::new(other)),
                    segments: vec![segment],
                },
            };
        }
    }

    fn field_name(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            Token::True => Ok("true".into()),
            Token::False => Ok("false".into()),
            Token::Null => Ok("null".into()),
            other => Err(self.error(format!(
                "expected field name, found {}",
                other.describe()
            ))),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.tokens[self.pos].offset;
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ParseError::new(offset, "number literal is out of range")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Dollar => Ok(Expr::Path {
                base: PathBase::Root,
                segments: Vec::new(),
            }),
            Token::At => Ok(Expr::Path {
                base: PathBase::Item,
                segments: Vec::new(),
            }),
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    self.call(name, offset)
                } else {
                    Ok(Expr::Path {
                        base: PathBase::Root,
                        segments: vec![PathSegment::Field(name)],
                    })
                }
            }
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBrace => self.record(),
            Token::LBracket => {
                let items = self.list(Token::RBracket, "']'")?;
                Ok(Expr::Array(items))
            }
            other => Err(ParseError::new(
                offset,
                format!("expected a value, found {}", other.describe()),
            )),
        }
    }

    fn call(&mut self, name: String, offset: usize) -> Result<Expr, ParseError> {
        let function = Function::lookup(&name)
            .ok_or_else(|| ParseError::new(offset, format!("unknown function '{name}'")))?;
        self.expect(Token::LParen, "'('")?;
        let args = self.list(Token::RParen, "')'")?;

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(ParseError::new(
                offset,
                format!(
                    "{}() takes {expected} argument(s), got {}",
                    function.name(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call { function, args })
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.ternary()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }

    fn record(&mut self) -> Result<Expr, ParseError> {
        let mut fields: Vec<(String, Expr)> = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                return Ok(Expr::Record(fields));
            }
            let key = match self.peek_at(0).clone() {
                Token::Str(s) => {
                    self.advance();
                    s
                }
                _ => self.field_name()?,
            };
            if fields.iter().any(|(existing, _)| existing == &key) {
                return Err(self.error(format!("duplicate record key '{key}'")));
            }
            self.expect(Token::Colon, "':' after record key")?;
            let value = self.ternary()?;
            fields.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "'}'")?;
                return Ok(Expr::Record(fields));
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
