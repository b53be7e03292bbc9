//! Lexer and recursive descent parser for general expressions
//!
//! ```text
//! or         := and (("||" | "or") and)*
//! and        := equality (("&&" | "and") equality)*
//! equality   := comparison (("==" | "=" | "!=" | "<>") comparison)*
//! comparison := additive (("<" | "<=" | ">" | ">=") additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("!" | "not" | "-") unary | primary
//! primary    := number | string | "[" property "]" | true | false | null
//!             | function "(" args ")" | label | "(" or ")"
//! ```
//!
//! Property names are collected while parsing so the caller knows which
//! subscriptions the expression needs. Function names and arity are checked
//! here; bare identifiers are resolved against the label dictionary.

use super::error::ExpressionError;
use super::eval::Value;
use std::collections::{BTreeSet, HashMap};

/// Named sub-resources a bare identifier may refer to
pub type Labels = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Property(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(i) => format!("number {i}"),
            Token::Float(f) => format!("number {f}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Property(p) => format!("property [{p}]"),
            Token::Ident(i) => format!("identifier '{i}'"),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    If,
    IsNull,
    Abs,
    Round,
    Floor,
    Ceiling,
    Min,
    Max,
    Int,
    Double,
    Str,
    Format,
}

impl Function {
    fn lookup(name: &str) -> Option<(Function, usize, usize)> {
        let entry = match name.to_ascii_lowercase().as_str() {
            "if" => (Function::If, 3, 3),
            "isnull" => (Function::IsNull, 2, 2),
            "abs" => (Function::Abs, 1, 1),
            "round" => (Function::Round, 1, 2),
            "floor" => (Function::Floor, 1, 1),
            "ceiling" => (Function::Ceiling, 1, 1),
            "min" => (Function::Min, 2, 2),
            "max" => (Function::Max, 2, 2),
            "int" => (Function::Int, 1, 1),
            "double" => (Function::Double, 1, 1),
            "str" => (Function::Str, 1, 1),
            "format" => (Function::Format, 2, 2),
            _ => return None,
        };
        Some(entry)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::If => "if",
            Function::IsNull => "isnull",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
            Function::Min => "min",
            Function::Max => "max",
            Function::Int => "int",
            Function::Double => "double",
            Function::Str => "str",
            Function::Format => "format",
        }
    }
}

/// Parsed general expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Property(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' if next == Some('=') => {
                i += 1;
                Token::Eq
            }
            '=' => Token::Eq,
            '!' if next == Some('=') => {
                i += 1;
                Token::Ne
            }
            '!' => Token::Not,
            '<' if next == Some('=') => {
                i += 1;
                Token::Le
            }
            '<' if next == Some('>') => {
                i += 1;
                Token::Ne
            }
            '<' => Token::Lt,
            '>' if next == Some('=') => {
                i += 1;
                Token::Ge
            }
            '>' => Token::Gt,
            '&' if next == Some('&') => {
                i += 1;
                Token::And
            }
            '|' if next == Some('|') => {
                i += 1;
                Token::Or
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or(ExpressionError::UnterminatedProperty(start))?;
                let name: String = chars[i + 1..i + 1 + close].iter().collect();
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ExpressionError::MissingProperty(text.to_string()));
                }
                i += close + 1;
                Token::Property(name)
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(ExpressionError::UnterminatedString(start)),
                        Some('\\') => {
                            let escaped = chars
                                .get(j + 1)
                                .ok_or(ExpressionError::UnterminatedString(start))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            j += 2;
                        }
                        Some(&ch) if ch == quote => break,
                        Some(&ch) => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                i = j;
                Token::Str(value)
            }
            _ if c.is_ascii_digit() => {
                let mut j = i;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                let is_float = chars.get(j) == Some(&'.')
                    && chars.get(j + 1).is_some_and(|ch| ch.is_ascii_digit());
                if is_float {
                    j += 1;
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                }
                let literal: String = chars[i..j].iter().collect();
                i = j - 1;
                if is_float {
                    Token::Float(
                        literal
                            .parse()
                            .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?,
                    )
                } else {
                    Token::Int(
                        literal
                            .parse()
                            .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?,
                    )
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len()
                    && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.')
                {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                i = j - 1;
                match word.to_ascii_lowercase().as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                }
            }
            _ => {
                return Err(ExpressionError::UnexpectedChar {
                    found: c,
                    position: start,
                })
            }
        };

        tokens.push((token, start));
        i += 1;
    }

    Ok(tokens)
}

/// Bound on parentheses, call arguments and unary operators nested in each other
pub const MAX_NESTING: usize = 64;

/// Bound on the token count, which also bounds operator chains
pub const MAX_TOKENS: usize = 1024;

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    labels: Option<&'a Labels>,
    used_properties: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                expected: expected.describe(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd(expected.describe())),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(ExpressionError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn binary_level(
        &mut self,
        operators: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        loop {
            let op = match self.peek() {
                Some(token) => operators
                    .iter()
                    .find(|(candidate, _)| candidate == token)
                    .map(|(_, op)| *op),
                None => None,
            };
            let Some(op) = op else {
                return Ok(left);
            };
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            &[(Token::Eq, BinaryOp::Eq), (Token::Ne, BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Negate),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let operand = self.nested(Self::unary)?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let (token, position) = self
            .advance()
            .ok_or_else(|| ExpressionError::UnexpectedEnd("a value".to_string()))?;

        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Property(name) => {
                self.used_properties.insert(name.clone());
                Ok(Expr::Property(name))
            }
            Token::LParen => {
                let inner = self.nested(Self::or)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if self.peek() == Some(&Token::LParen) => self.call(name),
            Token::Ident(name) => self.label(name),
            other => Err(ExpressionError::UnexpectedToken {
                found: other.describe(),
                expected: "a value".to_string(),
                position,
            }),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let (function, min_args, max_args) =
            Function::lookup(&name).ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.nested(Self::or)?);
                match self.advance() {
                    Some((Token::Comma, _)) => continue,
                    Some((Token::RParen, _)) => break,
                    Some((token, position)) => {
                        return Err(ExpressionError::UnexpectedToken {
                            found: token.describe(),
                            expected: "',' or ')'".to_string(),
                            position,
                        })
                    }
                    None => return Err(ExpressionError::UnexpectedEnd("')'".to_string())),
                }
            }
        }

        if args.len() < min_args || args.len() > max_args {
            let expected = if min_args == max_args {
                min_args.to_string()
            } else {
                format!("{min_args}-{max_args}")
            };
            return Err(ExpressionError::ArgumentCount {
                name: function.name().to_string(),
                expected,
                got: args.len(),
            });
        }

        Ok(Expr::Call { function, args })
    }

    fn label(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let labels = self
            .labels
            .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone()))?;
        let value = labels.get(&name).or_else(|| {
            labels
                .iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(&name))
                .map(|(_, value)| value)
        });
        match value {
            Some(value) => Ok(Expr::Literal(Value::Str(value.clone()))),
            None => Err(ExpressionError::UnknownIdentifier(name)),
        }
    }
}

/// Parses `text` into an expression tree plus the property names it uses
pub fn parse(
    text: &str,
    labels: Option<&Labels>,
) -> Result<(Expr, BTreeSet<String>), ExpressionError> {
    let tokens = tokenize(text)?;
    if tokens.len() > MAX_TOKENS {
        return Err(ExpressionError::TooLong(MAX_TOKENS));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        labels,
        used_properties: BTreeSet::new(),
    };

    let expr = parser.or()?;
    if let Some((token, position)) = parser.advance() {
        return Err(ExpressionError::UnexpectedToken {
            found: token.describe(),
            expected: "end of expression".to_string(),
            position,
        });
    }

    Ok((expr, parser.used_properties))
}
