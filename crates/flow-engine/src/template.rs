//! `{{path}}` interpolation against a data value
//!
//! Tokens that cannot be resolved are left in place verbatim, so a
//! half-configured node still produces readable output instead of failing.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("template token pattern is valid"));

/// One step of a lookup path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split `a.b[2].c` into segments; `None` if the path is malformed
fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut remaining = path.trim();

    while !remaining.is_empty() {
        if let Some(rest) = remaining.strip_prefix('[') {
            let end = rest.find(']')?;
            let index = rest[..end].trim().parse::<usize>().ok()?;
            segments.push(Segment::Index(index));
            remaining = &rest[end + 1..];
        } else {
            let stop = remaining.find(['.', '[']).unwrap_or(remaining.len());
            let key = &remaining[..stop];
            if key.is_empty() {
                return None;
            }
            segments.push(Segment::Key(key));
            remaining = &remaining[stop..];
        }
        if let Some(rest) = remaining.strip_prefix('.') {
            if rest.is_empty() {
                return None;
            }
            remaining = rest;
        }
    }

    Some(segments)
}

/// Parse a string that looks like encoded JSON
fn decode_embedded(value: &Value) -> Option<Cow<'_, Value>> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).ok().map(Cow::Owned)
            } else {
                None
            }
        }
        other => Some(Cow::Borrowed(other)),
    }
}

/// Walk a dotted/indexed path through a value
///
/// String values holding encoded objects or arrays are decoded before
/// descending into them. An empty path returns the value itself.
pub fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    let segments = parse_path(path)?;
    let mut current: Cow<'_, Value> = Cow::Borrowed(value);

    for segment in segments {
        let container = decode_embedded(current.as_ref())?.into_owned();
        let next = match segment {
            Segment::Key(key) => container.get(key)?.clone(),
            Segment::Index(index) => container.get(index)?.clone(),
        };
        current = Cow::Owned(next);
    }

    Some(current.into_owned())
}

/// Render a value the way templates embed it
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve the expression inside one token
///
/// `input` is the whole context; `input.x` and `input[0]` walk it. Any other
/// path is looked up directly, falling back to the literal `input` key when
/// the context carries one.
pub(crate) fn resolve_token(expr: &str, ctx: &Value) -> Option<Value> {
    if expr == "input" {
        return Some(ctx.clone());
    }
    if let Some(rest) = expr.strip_prefix("input") {
        if let Some(path) = rest.strip_prefix('.') {
            return lookup_path(ctx, path).or_else(|| lookup_path(ctx, expr));
        }
        if rest.starts_with('[') {
            return lookup_path(ctx, rest);
        }
    }
    lookup_path(ctx, expr)
}

/// Replace every resolvable token with its string rendering
pub fn resolve(template: &str, ctx: &Value) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            match resolve_token(&caps[1], ctx) {
                Some(value) => stringify(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Resolve a template, keeping the value's type when the whole string is one token
pub fn resolve_value(template: &str, ctx: &Value) -> Value {
    let trimmed = template.trim();
    if let Some(caps) = TOKEN.captures(trimmed) {
        if caps.get(0).map(|m| m.as_str().len()) == Some(trimmed.len()) {
            return resolve_token(&caps[1], ctx).unwrap_or_else(|| Value::String(template.to_string()));
        }
    }
    Value::String(resolve(template, ctx))
}

/// Apply the resolver to every string inside a config value
pub fn resolve_config(config: &Value, ctx: &Value) -> Value {
    match config {
        Value::String(s) => resolve_value(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_config(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_config(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Iterate `(whole_token, inner_expression)` pairs in a template
pub(crate) fn tokens(template: &str) -> impl Iterator<Item = (std::ops::Range<usize>, &str)> {
    TOKEN.captures_iter(template).filter_map(|caps| {
        let whole = caps.get(0)?;
        let inner = caps.get(1)?;
        Some((whole.range(), inner.as_str()))
    })
}
