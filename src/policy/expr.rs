// ABOUTME: Sandboxed boolean expression language for route authorization policies
// ABOUTME: Recursive-descent parser and evaluator; no function calls, no mutation, no I/O
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::RequestFacts;

/// Expression evaluation failure. The gate treats every variant as a denial.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExprError {
    /// The expression text could not be parsed
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the failure
        offset: usize,
        /// What went wrong
        message: String,
    },
    /// An identifier outside the fact sheet was referenced
    #[error("unknown identifier: {name}")]
    UnknownIdentifier {
        /// The offending identifier
        name: String,
    },
    /// Operands had incompatible types
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// What was compared with what
        message: String,
    },
}

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    And,
    Or,
    Not,
    In,
    EqEq,
    NotEq,
    LParen,
    RParen,
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Ident(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    In,
    NotIn,
}

/// Evaluate a policy expression against the request fact sheet.
///
/// The expression must produce a boolean; any other result type, unknown
/// identifier, or parse failure is an error, which the gate treats as a
/// denial.
///
/// # Errors
/// Returns the parse or evaluation failure
pub fn evaluate(source: &str, facts: &RequestFacts) -> Result<bool, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse {
            offset: source.len(),
            message: "unexpected trailing input".to_owned(),
        });
    }

    match eval(&expr, facts)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::TypeMismatch {
            message: format!("expression result is {}, expected bool", other.type_name()),
        }),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::Parse {
                        offset: i,
                        message: "single '=' is not an operator; use '=='".to_owned(),
                    });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(ExprError::Parse {
                        offset: i,
                        message: "single '&' is not an operator; use '&&'".to_owned(),
                    });
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(ExprError::Parse {
                        offset: i,
                        message: "single '|' is not an operator; use '||'".to_owned(),
                    });
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != quote {
                    j += 1;
                }
                if j == bytes.len() {
                    return Err(ExprError::Parse {
                        offset: i,
                        message: "unterminated string literal".to_owned(),
                    });
                }
                tokens.push(Token::Str(source[start..j].to_owned()));
                i = j + 1;
            }
            '0'..='9' | '-' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &source[start..i];
                let value: i64 = text.parse().map_err(|_| ExprError::Parse {
                    offset: start,
                    message: format!("invalid integer literal: {text}"),
                })?;
                tokens.push(Token::Int(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.')
                {
                    i += 1;
                }
                let word = &source[start..i];
                tokens.push(match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_owned()),
                });
            }
            other => {
                return Err(ExprError::Parse {
                    offset: i,
                    message: format!("unexpected character: {other}"),
                });
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_error(&self, message: &str) -> ExprError {
        ExprError::Parse {
            offset: self.pos,
            message: message.to_owned(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_primary()?;

        let op = match self.peek() {
            Some(Token::EqEq) => {
                self.advance();
                CmpOp::Eq
            }
            Some(Token::NotEq) => {
                self.advance();
                CmpOp::Ne
            }
            Some(Token::In) => {
                self.advance();
                CmpOp::In
            }
            // "not in" in operator position
            Some(Token::Not) if self.tokens.get(self.pos + 1) == Some(&Token::In) => {
                self.advance();
                self.advance();
                CmpOp::NotIn
            }
            _ => return Ok(left),
        };

        let right = self.parse_primary()?;
        Ok(Expr::Cmp(Box::new(left), op, Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(self.parse_error("expected ')'"));
                }
                Ok(inner)
            }
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Int(value)) => Ok(Expr::Literal(Value::Int(value))),
            Some(Token::Str(value)) => Ok(Expr::Literal(Value::Str(value))),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(_) => Err(self.parse_error("expected a value, identifier, or '('")),
            None => Err(self.parse_error("unexpected end of expression")),
        }
    }
}

fn eval(expr: &Expr, facts: &RequestFacts) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => resolve(name, facts),
        Expr::Not(operand) => match eval(operand, facts)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ExprError::TypeMismatch {
                message: format!("cannot negate {}", other.type_name()),
            }),
        },
        Expr::And(left, right) => {
            // short-circuit: a falsy left side never evaluates the right
            if expect_bool(eval(left, facts)?)? {
                Ok(Value::Bool(expect_bool(eval(right, facts)?)?))
            } else {
                Ok(Value::Bool(false))
            }
        }
        Expr::Or(left, right) => {
            if expect_bool(eval(left, facts)?)? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(expect_bool(eval(right, facts)?)?))
            }
        }
        Expr::Cmp(left, op, right) => {
            let left = eval(left, facts)?;
            let right = eval(right, facts)?;
            compare(&left, *op, &right)
        }
    }
}

fn expect_bool(value: Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::TypeMismatch {
            message: format!("expected bool, got {}", other.type_name()),
        }),
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> Result<Value, ExprError> {
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = match (left, right) {
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                _ => {
                    return Err(ExprError::TypeMismatch {
                        message: format!(
                            "cannot compare {} with {}",
                            left.type_name(),
                            right.type_name()
                        ),
                    });
                }
            };
            Ok(Value::Bool(match op {
                CmpOp::Eq => equal,
                _ => !equal,
            }))
        }
        CmpOp::In | CmpOp::NotIn => {
            let (Value::Str(needle), Value::List(haystack)) = (left, right) else {
                return Err(ExprError::TypeMismatch {
                    message: format!(
                        "'in' needs a string and a list, got {} and {}",
                        left.type_name(),
                        right.type_name()
                    ),
                });
            };
            let contained = haystack.contains(needle);
            Ok(Value::Bool(match op {
                CmpOp::In => contained,
                _ => !contained,
            }))
        }
    }
}

/// Resolve a dotted identifier against the fact sheet. The fact sheet is the
/// entire visible world: anything else is an unknown identifier.
fn resolve(name: &str, facts: &RequestFacts) -> Result<Value, ExprError> {
    match name {
        "oauth.authorized" => Ok(Value::Bool(facts.oauth.authorized)),
        "oauth.grant" => Ok(Value::Str(
            facts.oauth.grant.clone().unwrap_or_default(),
        )),
        "oauth.scopes" => Ok(Value::List(facts.oauth.scopes.clone())),
        "subject.logged_in" => Ok(Value::Bool(facts.subject.logged_in)),
        "subject.id" => Ok(Value::Str(
            facts.subject.id.clone().unwrap_or_default(),
        )),
        "subject.groups" => Ok(Value::List(facts.subject.groups.clone())),
        _ => Err(ExprError::UnknownIdentifier {
            name: name.to_owned(),
        }),
    }
}
