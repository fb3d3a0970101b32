//! Boolean conditions over node input
//!
//! Conditions are small expressions such as `{{input.total}} > 100 &&
//! {{input.status}} === "paid"`. Tokens are first replaced with literal
//! renderings of the resolved values, then the text is parsed into an
//! [`Expr`] and interpreted. Nothing here executes user code: there are no
//! identifiers, assignments, loops or function definitions, only literals,
//! operators, property access and a handful of string/array methods.
//!
//! [`evaluate_condition`] is fail-closed: any parse or evaluation error
//! yields `false`.

mod ast;
mod eval;
mod parser;

use serde_json::Value;
use thiserror::Error;

use crate::template;

pub use ast::{BinaryOp, Expr, Method, UnaryOp};
pub use eval::is_truthy;
pub use parser::parse;

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Method '{method}' expects {expected} argument(s), got {found}")]
    Arity {
        method: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Type mismatch in '{operation}': expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: &'static str,
        found: String,
    },

    #[error("Cannot read property '{property}' of {target}")]
    NullAccess {
        property: String,
        target: &'static str,
    },

    #[error("Arithmetic result is not a finite number")]
    NonFinite,

    #[error("Expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Replace `{{...}}` tokens with literals the parser understands
///
/// Resolved values are rendered as JSON (strings quoted); unresolved paths
/// become `undefined`. A token already wrapped in quotes is spliced in as
/// escaped string content instead.
pub fn substitute(expression: &str, input: &Value) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut cursor = 0;

    for (range, inner) in template::tokens(expression) {
        out.push_str(&expression[cursor..range.start]);
        cursor = range.end;

        let resolved = template::resolve_token(inner, input);
        let quote = ['"', '\''].into_iter().find(|q| {
            expression[..range.start].ends_with(*q) && expression[range.end..].starts_with(*q)
        });

        match (quote, resolved) {
            (Some(q), Some(value)) => out.push_str(&escape_quoted(&template::stringify(&value), q)),
            (Some(_), None) => out.push_str("undefined"),
            (None, Some(value)) => out.push_str(&value.to_string()),
            (None, None) => out.push_str("undefined"),
        }
    }

    out.push_str(&expression[cursor..]);
    out
}

fn escape_quoted(text: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c if c == quote => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Substitute, parse and evaluate, returning the computed value
///
/// `undefined` results are reported as `null`.
pub fn evaluate_expression(expression: &str, input: &Value) -> Result<Value, ExprError> {
    let source = substitute(expression, input);
    let ast = parse(&source)?;
    eval::evaluate(&ast).map(eval::Operand::into_value)
}

/// Evaluate a condition; errors count as `false`
pub fn evaluate_condition(expression: &str, input: &Value) -> bool {
    match evaluate_expression(expression, input) {
        Ok(value) => is_truthy(&value),
        Err(e) => {
            log::debug!("Condition '{}' evaluated to false: {}", expression, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_condition() {
        let input = json!({"value": 10});
        assert!(evaluate_condition("{{input.value}} > 5", &input));
        assert!(!evaluate_condition("{{input.value}} > 50", &input));
    }

    #[test]
    fn test_substitution_renders_typed_literals() {
        let input = json!({"name": "Ada", "ok": true, "n": null, "tags": ["a"]});
        assert_eq!(
            substitute("{{input.name}} {{input.ok}} {{input.n}} {{input.tags}} {{input.x}}", &input),
            r#""Ada" true null ["a"] undefined"#
        );
    }

    #[test]
    fn test_quoted_token_is_spliced_as_text() {
        let input = json!({"status": "say \"hi\""});
        assert_eq!(
            substitute(r#""{{input.status}}" === 'x'"#, &input),
            r#""say \"hi\"" === 'x'"#
        );
        assert!(evaluate_condition(
            "'{{input.status}}'.includes('hi')",
            &input
        ));
    }

    #[test]
    fn test_whole_input_token() {
        assert!(evaluate_condition("{{input}} === 'go'", &json!("go")));
        assert!(evaluate_condition("{{input}}.items.length == 2", &json!({"items": [1, 2]})));
    }

    #[test]
    fn test_malformed_expression_is_false() {
        let input = json!({"value": 1});
        assert!(!evaluate_condition("{{input.missing}} >", &input));
        assert!(!evaluate_condition("{{input.missing}} > 5", &input));
        assert!(!evaluate_condition("{{input.missing}}.foo", &input));
        assert!(!evaluate_condition("require('fs')", &input));
        assert!(!evaluate_condition("", &input));
    }

    #[test]
    fn test_runaway_nesting_is_false() {
        let input = json!({});
        let parens = format!("{}1{} > 0", "(".repeat(10_000), ")".repeat(10_000));
        assert!(!evaluate_condition(&parens, &input));
        assert!(!evaluate_condition(&format!("{}true", "!".repeat(200_000)), &input));
        assert!(!evaluate_condition(&"[".repeat(5_000), &input));

        let chain = vec!["1"; 500].join(" + ");
        assert_eq!(
            parse(&chain),
            Err(ExprError::TooDeep {
                limit: parser::MAX_DEPTH
            })
        );
    }

    #[test]
    fn test_reasonable_nesting_still_evaluates() {
        let input = json!({"a": {"b": {"c": 3}}});
        let nested = format!("{}{{{{input.a}}}}.b.c{} === 3", "(".repeat(20), ")".repeat(20));
        assert!(evaluate_condition(&nested, &input));
        assert!(evaluate_condition("!!!!true", &input));
        let chain = vec!["1"; 30].join(" + ");
        assert_eq!(evaluate_expression(&format!("{} == 30", chain), &input), Ok(json!(true)));
    }

    #[test]
    fn test_string_comparisons() {
        let input = json!({"status": "PAID", "email": "ops@example.com"});
        assert!(evaluate_condition(
            "{{input.status}}.toLowerCase() === 'paid' && {{input.email}}.endsWith('@example.com')",
            &input
        ));
        assert!(evaluate_condition("{{input.status}} != 'open'", &input));
    }

    #[test]
    fn test_missing_value_equals_undefined() {
        assert!(evaluate_condition(
            "{{input.missing}} === undefined",
            &json!({})
        ));
        assert!(evaluate_condition("{{input.missing}} == null", &json!({})));
    }

    #[test]
    fn test_evaluate_expression_returns_value() {
        let input = json!({"price": 4, "qty": 3});
        assert_eq!(
            evaluate_expression("{{input.price}} * {{input.qty}}", &input).unwrap(),
            json!(12)
        );
        assert!(evaluate_expression("1 +", &input).is_err());
    }
}
