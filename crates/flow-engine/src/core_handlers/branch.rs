//! If/else and switch handlers
//!
//! Both wrap their input in an envelope that records the
//! branch decision. The controller reads the decision from the envelope and
//! records it for the router.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{case_value, parse_config};
use crate::condition::evaluate_condition;
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::registry::NodeHandler;
use crate::template;
use crate::types::WorkflowNode;

/// Evaluates `config.condition` against the input
///
/// Output: `{condition: bool, input}`.
pub struct IfElseHandler;

#[async_trait]
impl NodeHandler for IfElseHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let condition = match node.config.get("condition") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(expr)) if !expr.trim().is_empty() => evaluate_condition(expr, &input),
            Some(Value::String(_)) | None => return Err(NodeError::missing("condition")),
            Some(other) => {
                return Err(NodeError::validation(
                    "condition",
                    format!("expected an expression string, got {}", other),
                ))
            }
        };

        log::debug!("If/else '{}' evaluated to {}", node.id, condition);
        Ok(json!({ "condition": condition, "input": input }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SwitchConfig {
    /// Template resolved against the input; `value` is accepted as an alias
    #[serde(alias = "value")]
    expression: Option<String>,
    cases: Vec<Value>,
}

/// Resolves `config.expression` and compares it with each declared case
///
/// Output: `{matchedCase: value|null, caseLabel, input}`.
pub struct SwitchHandler;

#[async_trait]
impl NodeHandler for SwitchHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: SwitchConfig = parse_config(node)?;

        let expression = config
            .expression
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| NodeError::missing("expression"))?;
        let resolved = template::resolve(&expression, &input);
        let resolved = resolved.trim();

        let matched = config
            .cases
            .iter()
            .find(|case| case_value(case).as_deref() == Some(resolved));

        let (matched_case, case_label) = match matched {
            Some(case) => {
                let value = case_value(case).map(Value::String).unwrap_or(Value::Null);
                let label = case
                    .get("label")
                    .filter(|l| l.is_string())
                    .cloned()
                    .unwrap_or_else(|| value.clone());
                (value, label)
            }
            None => (Value::Null, Value::Null),
        };

        log::debug!(
            "Switch '{}' resolved '{}' -> {}",
            node.id,
            resolved,
            matched_case
        );
        Ok(json!({
            "matchedCase": matched_case,
            "caseLabel": case_label,
            "input": input,
        }))
    }
}
