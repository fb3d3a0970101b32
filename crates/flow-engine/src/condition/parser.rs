//! Lexer and recursive-descent parser for condition expressions

use serde_json::Value;

use super::ast::{BinaryOp, Expr, Method, UnaryOp};
use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("\"{}\"", s),
            Token::Ident(name) => name.clone(),
            Token::Punct(p) => (*p).to_string(),
        }
    }
}

// Longest first so that `===` wins over `==` and `=`
const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%",
    "(", ")", "[", "]", "{", "}", ",", ":", ".", "?",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                i += 1;
                if i < chars.len() && matches!(chars[i].1, '+' | '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            let end = chars.get(i).map(|(p, _)| *p).unwrap_or(src.len());
            let text = &src[chars[start].0..end];
            let number = text
                .parse::<f64>()
                .map_err(|_| ExprError::UnexpectedToken {
                    found: text.to_string(),
                    position,
                })?;
            tokens.push((position, Token::Number(number)));
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (text, next) = read_string(&chars, i, ch)?;
            tokens.push((position, Token::Str(text)));
            i = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
            {
                i += 1;
            }
            let end = chars.get(i).map(|(p, _)| *p).unwrap_or(src.len());
            tokens.push((position, Token::Ident(src[chars[start].0..end].to_string())));
            continue;
        }

        let rest = &src[position..];
        match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            Some(punct) => {
                tokens.push((position, Token::Punct(*punct)));
                i += punct.len();
            }
            None => return Err(ExprError::UnexpectedChar { ch, position }),
        }
    }

    Ok(tokens)
}

/// Read a quoted string starting at `chars[start]`; returns the text and the next index
fn read_string(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(String, usize), ExprError> {
    let position = chars[start].0;
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let ch = chars[i].1;
        if ch == quote {
            return Ok((text, i + 1));
        }
        if ch == '\\' {
            let escaped = chars
                .get(i + 1)
                .map(|(_, c)| *c)
                .ok_or(ExprError::UnterminatedString(position))?;
            i += 2;
            match escaped {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                'b' => text.push('\u{0008}'),
                'f' => text.push('\u{000C}'),
                'u' => {
                    let hex: String = chars.iter().skip(i).take(4).map(|(_, c)| *c).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .ok_or_else(|| ExprError::UnexpectedToken {
                            found: format!("\\u{}", hex),
                            position,
                        })?;
                    text.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    i += 4;
                }
                other => text.push(other),
            }
            continue;
        }
        text.push(ch);
        i += 1;
    }

    Err(ExprError::UnterminatedString(position))
}

/// Deepest expression tree the parser will build
///
/// Nesting, unary operators and operator or postfix chains all count, so the
/// evaluator never recurses deeper than this.
pub const MAX_DEPTH: usize = 100;

/// Parse an expression into an AST
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_conditional()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((position, token)) => Err(ExprError::UnexpectedToken {
            found: token.describe(),
            position: *position,
        }),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.peek_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ExprError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|(_, t)| t.clone())
            .ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self) -> ExprError {
        match self.tokens.get(self.pos) {
            Some((position, token)) => ExprError::UnexpectedToken {
                found: token.describe(),
                position: *position,
            },
            None => ExprError::UnexpectedEnd,
        }
    }

    /// Consume the first matching operator from `ops`
    fn eat_operator(&mut self, ops: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        let found = ops.iter().find(|(p, _)| self.peek_punct(p)).map(|(_, op)| *op);
        if found.is_some() {
            self.pos += 1;
        }
        found
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = self.parse_ternary();
        self.depth -= 1;
        expr
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let condition = self.parse_or()?;
        if !self.eat_punct("?") {
            return Ok(condition);
        }
        let then = self.parse_conditional()?;
        self.expect_punct(":")?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        let mut chained = 0;
        while let Some(op) = self.eat_operator(ops) {
            self.enter()?;
            chained += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(&[("||", BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(&[("&&", BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = if self.eat_punct("!") {
            UnaryOp::Not
        } else if self.eat_punct("-") {
            UnaryOp::Negate
        } else {
            return self.parse_postfix();
        };
        self.enter()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;

        loop {
            if self.peek_punct(".") || self.peek_punct("[") {
                self.enter()?;
                chained += 1;
            }
            if self.eat_punct(".") {
                let name = match self.next()? {
                    Token::Ident(name) => name,
                    other => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.describe(),
                            position: self.tokens[self.pos - 1].0,
                        })
                    }
                };
                if self.eat_punct("(") {
                    let method = Method::from_name(&name)
                        .ok_or_else(|| ExprError::UnknownMethod(name.clone()))?;
                    let args = self.parse_list(")")?;
                    if args.len() != method.arity() {
                        return Err(ExprError::Arity {
                            method: method.name(),
                            expected: method.arity(),
                            found: args.len(),
                        });
                    }
                    expr = Expr::Call(Box::new(expr), method, args);
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat_punct("[") {
                let index = self.parse_conditional()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                self.depth -= chained;
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat_punct(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_conditional()?);
            if self.eat_punct(close) {
                return Ok(items);
            }
            self.expect_punct(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let position = self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(0);
        match self.next()? {
            Token::Number(n) => Ok(Expr::Literal(number_value(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "undefined" => Ok(Expr::Undefined),
                _ => Err(ExprError::UnknownIdentifier(name)),
            },
            Token::Punct("(") => {
                let inner = self.parse_conditional()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.parse_list("]")?)),
            Token::Punct("{") => self.parse_object(),
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                position,
            }),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, ExprError> {
        let mut fields = Vec::new();
        if self.eat_punct("}") {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.next()? {
                Token::Str(s) | Token::Ident(s) => s,
                Token::Number(n) => n.to_string(),
                other => {
                    return Err(ExprError::UnexpectedToken {
                        found: other.describe(),
                        position: self.tokens[self.pos - 1].0,
                    })
                }
            };
            self.expect_punct(":")?;
            fields.push((key, self.parse_conditional()?));
            if self.eat_punct("}") {
                return Ok(Expr::Object(fields));
            }
            self.expect_punct(",")?;
        }
    }
}

/// Integral values stay integers so results serialize as `3`, not `3.0`
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
