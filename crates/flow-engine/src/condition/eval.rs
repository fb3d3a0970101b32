//! Tree-walking evaluator with JavaScript-style comparison rules

use serde_json::{Map, Value};

use super::ast::{BinaryOp, Expr, Method, UnaryOp};
use super::parser::number_value;
use super::ExprError;

/// A runtime value; `Undefined` is distinct from JSON `null`
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Undefined,
    Value(Value),
}

impl Operand {
    pub fn into_value(self) -> Value {
        match self {
            Operand::Undefined => Value::Null,
            Operand::Value(v) => v,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Operand::Undefined => "undefined",
            Operand::Value(Value::Null) => "null",
            Operand::Value(Value::Bool(_)) => "boolean",
            Operand::Value(Value::Number(_)) => "number",
            Operand::Value(Value::String(_)) => "string",
            Operand::Value(Value::Array(_)) => "array",
            Operand::Value(Value::Object(_)) => "object",
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, Operand::Undefined | Operand::Value(Value::Null))
    }

    /// Arrays and objects compare by identity, and no two are the same
    fn is_composite(&self) -> bool {
        matches!(self, Operand::Value(Value::Array(_) | Value::Object(_)))
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Value(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// String rendering used by `+` concatenation
    fn concat_text(&self) -> String {
        match self {
            Operand::Undefined => "undefined".to_string(),
            Operand::Value(Value::String(s)) => s.clone(),
            Operand::Value(other) => other.to_string(),
        }
    }
}

/// JavaScript truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy(operand: &Operand) -> bool {
    match operand {
        Operand::Undefined => false,
        Operand::Value(v) => is_truthy(v),
    }
}

fn mismatch(operation: &str, expected: &'static str, found: &Operand) -> ExprError {
    ExprError::TypeMismatch {
        operation: operation.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

fn finite(n: f64) -> Result<Operand, ExprError> {
    if n.is_finite() {
        Ok(Operand::Value(number_value(n)))
    } else {
        Err(ExprError::NonFinite)
    }
}

/// Evaluate a parsed expression
pub fn evaluate(expr: &Expr) -> Result<Operand, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(Operand::Value(v.clone())),
        Expr::Undefined => Ok(Operand::Undefined),
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item).map(Operand::into_value))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Operand::Value(Value::Array(values)))
        }
        Expr::Object(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), evaluate(value)?.into_value());
            }
            Ok(Operand::Value(Value::Object(map)))
        }
        Expr::Unary(op, operand) => {
            let value = evaluate(operand)?;
            match op {
                UnaryOp::Not => Ok(Operand::Value(Value::Bool(!truthy(&value)))),
                UnaryOp::Negate => value
                    .as_number()
                    .ok_or_else(|| mismatch("-", "number", &value))
                    .and_then(|n| finite(-n)),
            }
        }
        Expr::Binary(op, left, right) => evaluate_binary(*op, left, right),
        Expr::Conditional(condition, then, otherwise) => {
            if truthy(&evaluate(condition)?) {
                evaluate(then)
            } else {
                evaluate(otherwise)
            }
        }
        Expr::Member(target, property) => member(evaluate(target)?, property),
        Expr::Index(target, index) => {
            let target = evaluate(target)?;
            let index = evaluate(index)?;
            index_into(target, index)
        }
        Expr::Call(target, method, args) => {
            let target = evaluate(target)?;
            let args = args.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
            call(target, *method, args)
        }
    }
}

fn evaluate_binary(op: BinaryOp, left: &Expr, right: &Expr) -> Result<Operand, ExprError> {
    let lhs = evaluate(left)?;

    // && and || return an operand, not a boolean, and skip the right side when decided
    match op {
        BinaryOp::And if !truthy(&lhs) => return Ok(lhs),
        BinaryOp::Or if truthy(&lhs) => return Ok(lhs),
        BinaryOp::And | BinaryOp::Or => return evaluate(right),
        _ => {}
    }

    let rhs = evaluate(right)?;
    let boolean = |b: bool| -> Result<Operand, ExprError> { Ok(Operand::Value(Value::Bool(b))) };

    match op {
        BinaryOp::LooseEq => boolean(loose_eq(&lhs, &rhs)),
        BinaryOp::LooseNe => boolean(!loose_eq(&lhs, &rhs)),
        BinaryOp::StrictEq => boolean(strict_eq(&lhs, &rhs)),
        BinaryOp::StrictNe => boolean(!strict_eq(&lhs, &rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, &lhs, &rhs)?;
            boolean(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::Add => {
            if lhs.as_str().is_some() || rhs.as_str().is_some() {
                return Ok(Operand::Value(Value::String(format!(
                    "{}{}",
                    lhs.concat_text(),
                    rhs.concat_text()
                ))));
            }
            let (a, b) = numbers(op, &lhs, &rhs)?;
            finite(a + b)
        }
        BinaryOp::Sub => numbers(op, &lhs, &rhs).and_then(|(a, b)| finite(a - b)),
        BinaryOp::Mul => numbers(op, &lhs, &rhs).and_then(|(a, b)| finite(a * b)),
        BinaryOp::Div => numbers(op, &lhs, &rhs).and_then(|(a, b)| finite(a / b)),
        BinaryOp::Rem => numbers(op, &lhs, &rhs).and_then(|(a, b)| finite(a % b)),
        BinaryOp::And | BinaryOp::Or => Ok(rhs),
    }
}

fn numbers(op: BinaryOp, lhs: &Operand, rhs: &Operand) -> Result<(f64, f64), ExprError> {
    let a = lhs.as_number().ok_or_else(|| mismatch(op.symbol(), "number", lhs))?;
    let b = rhs.as_number().ok_or_else(|| mismatch(op.symbol(), "number", rhs))?;
    Ok((a, b))
}

fn compare(
    op: BinaryOp,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<std::cmp::Ordering, ExprError> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| mismatch(op.symbol(), "comparable numbers", lhs));
    }
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        return Ok(a.cmp(b));
    }
    let culprit = if lhs.as_number().is_some() || lhs.as_str().is_some() {
        rhs
    } else {
        lhs
    };
    Err(mismatch(op.symbol(), "two numbers or two strings", culprit))
}

/// Numeric view used by loose equality: numbers, numeric strings, booleans
fn loose_number(operand: &Operand) -> Option<f64> {
    match operand {
        Operand::Value(Value::Number(n)) => n.as_f64(),
        Operand::Value(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Operand::Value(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse().ok()
            }
        }
        _ => None,
    }
}

fn loose_eq(lhs: &Operand, rhs: &Operand) -> bool {
    if lhs.is_nullish() || rhs.is_nullish() {
        return lhs.is_nullish() && rhs.is_nullish();
    }
    if lhs.is_composite() || rhs.is_composite() {
        return false;
    }
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        return a == b;
    }
    match (loose_number(lhs), loose_number(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn strict_eq(lhs: &Operand, rhs: &Operand) -> bool {
    if lhs.is_composite() || rhs.is_composite() {
        return false;
    }
    match (lhs, rhs) {
        (Operand::Undefined, Operand::Undefined) => true,
        (Operand::Value(Value::Number(a)), Operand::Value(Value::Number(b))) => {
            a.as_f64() == b.as_f64()
        }
        (Operand::Value(a), Operand::Value(b)) => a == b,
        _ => false,
    }
}

fn member(target: Operand, property: &str) -> Result<Operand, ExprError> {
    match target {
        Operand::Undefined | Operand::Value(Value::Null) => Err(ExprError::NullAccess {
            property: property.to_string(),
            target: target.type_name(),
        }),
        Operand::Value(Value::String(s)) if property == "length" => {
            Ok(Operand::Value(Value::from(s.chars().count())))
        }
        Operand::Value(Value::Array(items)) if property == "length" => {
            Ok(Operand::Value(Value::from(items.len())))
        }
        Operand::Value(Value::Object(mut map)) => Ok(map
            .remove(property)
            .map(Operand::Value)
            .unwrap_or(Operand::Undefined)),
        Operand::Value(_) => Ok(Operand::Undefined),
    }
}

fn index_into(target: Operand, index: Operand) -> Result<Operand, ExprError> {
    if let Some(key) = index.as_str() {
        return member(target, key);
    }
    let position = match index.as_number() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
        Some(_) => return Ok(Operand::Undefined),
        None => return Err(mismatch("[]", "number or string index", &index)),
    };

    match target {
        Operand::Undefined | Operand::Value(Value::Null) => Err(ExprError::NullAccess {
            property: position.to_string(),
            target: target.type_name(),
        }),
        Operand::Value(Value::Array(mut items)) if position < items.len() => {
            Ok(Operand::Value(items.swap_remove(position)))
        }
        Operand::Value(Value::String(s)) => Ok(s
            .chars()
            .nth(position)
            .map(|c| Operand::Value(Value::String(c.to_string())))
            .unwrap_or(Operand::Undefined)),
        Operand::Value(Value::Object(mut map)) => Ok(map
            .remove(&position.to_string())
            .map(Operand::Value)
            .unwrap_or(Operand::Undefined)),
        Operand::Value(_) => Ok(Operand::Undefined),
    }
}

fn call(target: Operand, method: Method, args: Vec<Operand>) -> Result<Operand, ExprError> {
    let string_arg = |args: &[Operand]| -> Result<String, ExprError> {
        match args.first() {
            Some(arg) if arg.as_str().is_some() => Ok(arg.concat_text()),
            Some(Operand::Value(v @ (Value::Number(_) | Value::Bool(_)))) => Ok(v.to_string()),
            Some(other) => Err(mismatch(method.name(), "string argument", other)),
            None => Err(ExprError::Arity {
                method: method.name(),
                expected: method.arity(),
                found: 0,
            }),
        }
    };

    if let (Method::Includes, Operand::Value(Value::Array(items))) = (method, &target) {
        let needle = args.first().cloned().unwrap_or(Operand::Undefined);
        let found = items
            .iter()
            .any(|item| strict_eq(&Operand::Value(item.clone()), &needle));
        return Ok(Operand::Value(Value::Bool(found)));
    }

    let text = target
        .as_str()
        .ok_or_else(|| mismatch(method.name(), "string", &target))?;

    let result = match method {
        Method::Includes => Value::Bool(text.contains(string_arg(&args)?.as_str())),
        Method::StartsWith => Value::Bool(text.starts_with(string_arg(&args)?.as_str())),
        Method::EndsWith => Value::Bool(text.ends_with(string_arg(&args)?.as_str())),
        Method::ToLowerCase => Value::String(text.to_lowercase()),
        Method::ToUpperCase => Value::String(text.to_uppercase()),
        Method::Trim => Value::String(text.trim().to_string()),
    };
    Ok(Operand::Value(result))
}
