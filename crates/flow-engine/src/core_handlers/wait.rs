use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::registry::NodeHandler;
use crate::types::WorkflowNode;

/// Pauses the run, then passes its input through unchanged
///
/// Reads `ms`, or `seconds` when `ms` is absent. Requests above the
/// configured ceiling are clamped to it.
pub struct WaitHandler {
    max_wait: Duration,
}

impl WaitHandler {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    fn requested(node: &WorkflowNode) -> Result<Duration, NodeError> {
        if node.config.get("ms").is_some() {
            return node
                .config_u64("ms")
                .map(Duration::from_millis)
                .ok_or_else(|| NodeError::validation("ms", "expected a non-negative number"));
        }
        if node.config.get("seconds").is_some() {
            return node
                .config_u64("seconds")
                .map(Duration::from_secs)
                .ok_or_else(|| NodeError::validation("seconds", "expected a non-negative number"));
        }
        Err(NodeError::missing("ms"))
    }
}

#[async_trait]
impl NodeHandler for WaitHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let requested = Self::requested(node)?;
        let wait = requested.min(self.max_wait);
        if wait < requested {
            log::warn!(
                "Wait node '{}' asked for {:?}; clamped to {:?}",
                node.id,
                requested,
                self.max_wait
            );
        }

        tokio::time::sleep(wait).await;
        Ok(input)
    }
}
