//! Built-in node handlers
//!
//! Triggers, branching, the error trigger, bounded waits and the pure data
//! transforms. External actions live in the `flow-nodes` crate.

mod branch;
mod transform;
mod trigger;
mod wait;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::NodeError;
use crate::registry::{NodeDescriptor, NodeRegistry};
use crate::types::{NodeKind, TriggerKind, WorkflowNode};

pub use branch::{IfElseHandler, SwitchHandler};
pub use transform::{
    AggregateHandler, ExpressionHandler, FilterHandler, FormatHandler, JsonFilterHandler,
    MergeHandler, NoopHandler, SetHandler, SortHandler,
};
pub use trigger::{ErrorTriggerHandler, TriggerHandler};
pub use wait::WaitHandler;

/// Register every built-in handler
pub fn register_core_handlers(registry: &mut NodeRegistry, config: &EngineConfig) {
    for kind in TriggerKind::ALL {
        registry.register(
            NodeDescriptor::new(kind.node_type(), "trigger", trigger_label(kind)),
            Arc::new(TriggerHandler::new(kind, config.max_schedule_wait())),
        );
    }
    registry.register(
        NodeDescriptor::new("error-trigger", "trigger", "On Error")
            .with_description("Runs only when another node fails"),
        Arc::new(ErrorTriggerHandler),
    );

    let if_else = Arc::new(IfElseHandler);
    registry.register(
        NodeDescriptor::new("if-else", "logic", "If / Else")
            .with_description("Routes to the true or false branch"),
        if_else.clone(),
    );
    registry.register(NodeDescriptor::new("if", "logic", "If"), if_else);
    registry.register(
        NodeDescriptor::new("switch", "logic", "Switch")
            .with_description("Routes to the branch whose case matches"),
        Arc::new(SwitchHandler),
    );

    registry.register(
        NodeDescriptor::new("wait", "flow", "Wait")
            .with_description("Delays the run for a bounded time"),
        Arc::new(WaitHandler::new(config.max_wait())),
    );
    registry.register(
        NodeDescriptor::new("noop", "flow", "No Operation"),
        Arc::new(NoopHandler),
    );

    registry.register(
        NodeDescriptor::new("set", "transform", "Set Fields"),
        Arc::new(SetHandler),
    );
    registry.register(
        NodeDescriptor::new("format", "transform", "Format Text"),
        Arc::new(FormatHandler),
    );
    registry.register(
        NodeDescriptor::new("merge", "transform", "Merge"),
        Arc::new(MergeHandler),
    );
    registry.register(
        NodeDescriptor::new("aggregate", "transform", "Aggregate"),
        Arc::new(AggregateHandler),
    );
    registry.register(
        NodeDescriptor::new("sort", "transform", "Sort"),
        Arc::new(SortHandler),
    );
    registry.register(
        NodeDescriptor::new("filter", "transform", "Filter"),
        Arc::new(FilterHandler),
    );
    registry.register(
        NodeDescriptor::new("json-filter", "transform", "JSON Filter")
            .with_description("Extracts a value by path"),
        Arc::new(JsonFilterHandler),
    );
    registry.register(
        NodeDescriptor::new("expression", "transform", "Expression"),
        Arc::new(ExpressionHandler),
    );
}

fn trigger_label(kind: TriggerKind) -> &'static str {
    match kind {
        TriggerKind::Manual => "Manual Trigger",
        TriggerKind::Schedule => "Schedule Trigger",
        TriggerKind::Webhook => "Webhook Trigger",
        TriggerKind::Chat => "Chat Trigger",
        TriggerKind::Interval => "Interval Trigger",
        TriggerKind::Workflow => "Workflow Trigger",
    }
}

/// Deserialize a node's config into a typed struct
pub(crate) fn parse_config<T: DeserializeOwned>(node: &WorkflowNode) -> Result<T, NodeError> {
    serde_json::from_value(node.config.clone())
        .map_err(|e| NodeError::Config(format!("{} config: {}", node.node_type, e)))
}

/// The string a switch case matches on
///
/// Cases are either `{"value": ..., "label": ...}` objects or bare values.
pub fn case_value(case: &Value) -> Option<String> {
    let raw = match case {
        Value::Object(map) => map.get("value")?,
        other => other,
    };
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(_) | Value::Bool(_) => Some(raw.to_string()),
        _ => None,
    }
}

/// Strip the envelope from an if/else or switch node's output
///
/// Only branch nodes produce envelopes; output from any other kind passes
/// through untouched even when it happens to carry `condition` and `input`.
pub fn unwrap_branch_envelope(source: NodeKind, value: Value) -> Value {
    if !source.is_branch() {
        return value;
    }
    match value {
        Value::Object(mut map) if map.contains_key("input") => {
            map.remove("input").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Array view of a transform's input
///
/// Accepts an array, or an object carrying its array under `items`.
pub(crate) fn expect_array(input: &Value) -> Result<&Vec<Value>, NodeError> {
    match input {
        Value::Array(items) => Ok(items),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(NodeError::validation("input", "expected array input")),
        },
        _ => Err(NodeError::validation("input", "expected array input")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_value_forms() {
        assert_eq!(case_value(&json!({"value": " a "})), Some("a".to_string()));
        assert_eq!(case_value(&json!("b")), Some("b".to_string()));
        assert_eq!(case_value(&json!({"value": 3})), Some("3".to_string()));
        assert_eq!(case_value(&json!({"label": "x"})), None);
    }

    #[test]
    fn test_unwrap_branch_envelope() {
        assert_eq!(
            unwrap_branch_envelope(NodeKind::IfElse, json!({"condition": true, "input": {"v": 1}})),
            json!({"v": 1})
        );
        assert_eq!(
            unwrap_branch_envelope(
                NodeKind::Switch,
                json!({"matchedCase": "a", "caseLabel": "A", "input": [1]})
            ),
            json!([1])
        );
        // same shape from an ordinary node is data
        let data = json!({"condition": true, "input": "payload"});
        assert_eq!(unwrap_branch_envelope(NodeKind::Action, data.clone()), data);
        assert_eq!(unwrap_branch_envelope(NodeKind::IfElse, json!("x")), json!("x"));
    }

    #[test]
    fn test_expect_array() {
        assert_eq!(expect_array(&json!([1, 2])).unwrap().len(), 2);
        assert_eq!(expect_array(&json!({"items": [1]})).unwrap().len(), 1);
        assert_eq!(
            expect_array(&json!({"a": 1})).unwrap_err().to_string(),
            "Invalid value for 'input': expected array input"
        );
    }
}
