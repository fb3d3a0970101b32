//! Pure data-shaping handlers
//!
//! Each is a deterministic function of its input and config. Bad input
//! shapes are reported as validation errors on the `input` field.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{expect_array, parse_config};
use crate::condition::{evaluate_condition, evaluate_expression};
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::registry::NodeHandler;
use crate::template::{self, lookup_path};
use crate::types::WorkflowNode;

// ----------------------------------------------------------------------------
// set / format
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SetConfig {
    fields: Map<String, Value>,
    keep_input: bool,
}

/// Builds an object from template-valued fields
pub struct SetHandler;

#[async_trait]
impl NodeHandler for SetHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: SetConfig = parse_config(node)?;

        let mut output = match (&input, config.keep_input) {
            (Value::Object(map), true) => map.clone(),
            _ => Map::new(),
        };
        for (key, value) in &config.fields {
            output.insert(key.clone(), template::resolve_config(value, &input));
        }

        Ok(Value::Object(output))
    }
}

/// Renders `config.template` into `{text}`
pub struct FormatHandler;

#[async_trait]
impl NodeHandler for FormatHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let tpl = node
            .config_str("template")
            .ok_or_else(|| NodeError::missing("template"))?;
        Ok(json!({ "text": template::resolve(tpl, &input) }))
    }
}

// ----------------------------------------------------------------------------
// merge
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MergeMode {
    #[default]
    Append,
    Combine,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeConfig {
    mode: MergeMode,
}

/// Joins the outputs of several upstream nodes
///
/// The input is the per-source map (or an array). `append` collects the
/// values into one array, flattening array values; `combine` shallow-merges
/// object values, later sources winning.
pub struct MergeHandler;

#[async_trait]
impl NodeHandler for MergeHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: MergeConfig = parse_config(node)?;

        let parts: Vec<Value> = match input {
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Array(items) => items,
            _ => {
                return Err(NodeError::validation(
                    "input",
                    "expected object or array input",
                ))
            }
        };

        match config.mode {
            MergeMode::Append => {
                let mut merged = Vec::new();
                for part in parts {
                    match part {
                        Value::Array(items) => merged.extend(items),
                        other => merged.push(other),
                    }
                }
                Ok(Value::Array(merged))
            }
            MergeMode::Combine => {
                let mut merged = Map::new();
                for part in parts {
                    match part {
                        Value::Object(map) => merged.extend(map),
                        Value::Null => {}
                        other => {
                            return Err(NodeError::validation(
                                "input",
                                format!("combine expects objects, got {}", type_name(&other)),
                            ))
                        }
                    }
                }
                Ok(Value::Object(merged))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// aggregate
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AggregateOp {
    #[default]
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Concat,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AggregateConfig {
    operation: AggregateOp,
    field: Option<String>,
    separator: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            operation: AggregateOp::Count,
            field: None,
            separator: ", ".to_string(),
        }
    }
}

/// Reduces an array to `{result, count}`
pub struct AggregateHandler;

#[async_trait]
impl NodeHandler for AggregateHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: AggregateConfig = parse_config(node)?;
        let items = expect_array(&input)?;

        let values: Vec<Value> = items
            .iter()
            .filter_map(|item| match config.field.as_deref() {
                Some(field) if !field.is_empty() => lookup_path(item, field),
                _ => Some(item.clone()),
            })
            .collect();

        let numbers = || -> Result<Vec<f64>, NodeError> {
            values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    as_number(v).ok_or_else(|| {
                        NodeError::validation("input", format!("expected numeric values, got {}", v))
                    })
                })
                .collect()
        };

        let result = match config.operation {
            AggregateOp::Count => json!(values.len()),
            AggregateOp::Sum => number(numbers()?.iter().sum()),
            AggregateOp::Avg => {
                let nums = numbers()?;
                if nums.is_empty() {
                    Value::Null
                } else {
                    number(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            AggregateOp::Min => numbers()?
                .into_iter()
                .reduce(f64::min)
                .map(number)
                .unwrap_or(Value::Null),
            AggregateOp::Max => numbers()?
                .into_iter()
                .reduce(f64::max)
                .map(number)
                .unwrap_or(Value::Null),
            AggregateOp::Concat => Value::String(
                values
                    .iter()
                    .map(template::stringify)
                    .collect::<Vec<_>>()
                    .join(&config.separator),
            ),
        };

        Ok(json!({ "result": result, "count": values.len() }))
    }
}

// ----------------------------------------------------------------------------
// sort / filter
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SortConfig {
    field: Option<String>,
    order: SortOrder,
}

/// Stable sort of an array, optionally by a field path
///
/// Numbers sort numerically, everything else by its string form; missing
/// keys sort last.
pub struct SortHandler;

#[async_trait]
impl NodeHandler for SortHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: SortConfig = parse_config(node)?;
        let mut items = expect_array(&input)?.clone();

        let key = |item: &Value| match config.field.as_deref() {
            Some(field) if !field.is_empty() => lookup_path(item, field),
            _ => Some(item.clone()),
        };

        items.sort_by(|a, b| {
            let ordering = match (key(a), key(b)) {
                (Some(x), Some(y)) => compare_values(&x, &y),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
            };
            match config.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(Value::Array(items))
    }
}

/// Keeps array items for which `config.condition` holds
///
/// Each item is exposed to the condition as `input`.
pub struct FilterHandler;

#[async_trait]
impl NodeHandler for FilterHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let condition = node
            .config_str("condition")
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NodeError::missing("condition"))?;
        let items = expect_array(&input)?;

        let kept: Vec<Value> = items
            .iter()
            .filter(|item| evaluate_condition(condition, item))
            .cloned()
            .collect();

        log::debug!("Filter '{}' kept {}/{} items", node.id, kept.len(), items.len());
        Ok(Value::Array(kept))
    }
}

// ----------------------------------------------------------------------------
// json-filter / expression / noop
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JsonFilterConfig {
    /// Path such as `data.items[0].name` or `[0].content`
    path: String,
    /// Returned as `value` when the path does not exist
    default_value: Option<Value>,
}

/// Extracts a value by path into `{value, found}`
pub struct JsonFilterHandler;

#[async_trait]
impl NodeHandler for JsonFilterHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: JsonFilterConfig = parse_config(node)?;

        let (value, found) = match lookup_path(&input, &config.path) {
            Some(value) => (value, true),
            None => (config.default_value.unwrap_or(Value::Null), false),
        };

        Ok(json!({ "value": value, "found": found }))
    }
}

/// Evaluates `config.expression` into `{result}`
pub struct ExpressionHandler;

#[async_trait]
impl NodeHandler for ExpressionHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let expression = node
            .config_str("expression")
            .ok_or_else(|| NodeError::missing("expression"))?;
        let result = evaluate_expression(expression, &input)
            .map_err(|e| NodeError::failed(format!("Expression error: {}", e)))?;
        Ok(json!({ "result": result }))
    }
}

/// Passes input through
pub struct NoopHandler;

#[async_trait]
impl NodeHandler for NoopHandler {
    async fn execute(
        &self,
        _node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        Ok(input)
    }
}

// ----------------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------------

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => template::stringify(a).cmp(&template::stringify(b)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
