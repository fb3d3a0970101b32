//! Trigger and error-trigger handlers

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::parse_config;
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::registry::NodeHandler;
use crate::types::{TriggerKind, WorkflowNode};

/// Normalizes the run's triggering payload into an envelope
///
/// Object payloads keep their fields and gain `triggerType`, `triggeredAt`
/// and `nodeId` (payload fields win on conflict). Other payloads are
/// placed under `data`.
pub struct TriggerHandler {
    kind: TriggerKind,
    max_schedule_wait: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScheduleConfig {
    /// Time of day, `HH:MM` in UTC
    time: Option<String>,
    wait_until_scheduled: bool,
}

impl TriggerHandler {
    pub fn new(kind: TriggerKind, max_schedule_wait: Duration) -> Self {
        Self {
            kind,
            max_schedule_wait,
        }
    }

    async fn schedule_fields(&self, node: &WorkflowNode) -> Result<Map<String, Value>, NodeError> {
        let config: ScheduleConfig = parse_config(node)?;
        let mut fields = Map::new();

        let Some(time) = config.time.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(fields);
        };

        let now = Utc::now();
        let scheduled = next_occurrence(now, time)?;
        fields.insert("scheduledFor".to_string(), Value::String(scheduled.to_rfc3339()));

        let mut waited = false;
        if config.wait_until_scheduled {
            let wait = (scheduled - now).to_std().unwrap_or_default();
            if wait <= self.max_schedule_wait {
                log::info!(
                    "Schedule trigger '{}' waiting {:?} until {}",
                    node.id,
                    wait,
                    scheduled
                );
                tokio::time::sleep(wait).await;
                waited = true;
            } else {
                log::warn!(
                    "Schedule trigger '{}' target {} is beyond the {:?} wait limit; continuing now",
                    node.id,
                    scheduled,
                    self.max_schedule_wait
                );
            }
        }
        fields.insert("waited".to_string(), Value::Bool(waited));

        Ok(fields)
    }
}

#[async_trait]
impl NodeHandler for TriggerHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let payload = match (self.kind, input) {
            (TriggerKind::Chat, Value::String(message)) => {
                serde_json::json!({ "message": message })
            }
            (_, other) => other,
        };

        let mut envelope = envelope_for(self.kind.as_str(), &node.id, payload);

        if self.kind == TriggerKind::Schedule {
            let fields = self.schedule_fields(node).await?;
            if let Value::Object(map) = &mut envelope {
                map.extend(fields);
            }
        }

        Ok(envelope)
    }
}

/// Build a trigger envelope around a payload
fn envelope_for(trigger_type: &str, node_id: &str, payload: Value) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };

    let defaults = [
        ("triggerType", Value::String(trigger_type.to_string())),
        ("triggeredAt", Value::String(Utc::now().to_rfc3339())),
        ("nodeId", Value::String(node_id.to_string())),
    ];
    for (key, value) in defaults {
        map.entry(key).or_insert(value);
    }

    Value::Object(map)
}

/// Next UTC instant at the given `HH:MM`, today or tomorrow
fn next_occurrence(now: DateTime<Utc>, time: &str) -> Result<DateTime<Utc>, NodeError> {
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| NodeError::validation("time", format!("expected HH:MM, got '{}'", time)))?;
    let today = now.date_naive().and_time(time).and_utc();
    if today >= now {
        Ok(today)
    } else {
        Ok(today + chrono::Duration::days(1))
    }
}

/// Entry point of the recovery path
///
/// Receives the synthesized failure description and stamps it as an
/// `error` trigger.
pub struct ErrorTriggerHandler;

#[async_trait]
impl NodeHandler for ErrorTriggerHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let mut map = match input {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        map.insert("triggerType".to_string(), Value::String("error".to_string()));
        map.insert("triggeredAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        map.entry("nodeId").or_insert_with(|| Value::String(node.id.clone()));
        Ok(Value::Object(map))
    }
}
