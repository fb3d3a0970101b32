//! Engine configuration
//!
//! Bounds and defaults applied by the controller and built-in handlers.
//! Loaded as part of the server configuration; every field has a default
//! so a partial JSON document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default ceiling for wait/delay nodes (10 seconds)
pub const DEFAULT_MAX_WAIT_MS: u64 = 10_000;

/// Default ceiling for a schedule trigger blocking on its target time (5 minutes)
pub const DEFAULT_MAX_SCHEDULE_WAIT_MS: u64 = 5 * 60 * 1000;

/// Runtime limits for workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Upper bound for a single wait node, in milliseconds
    pub max_wait_ms: u64,
    /// Upper bound for a schedule trigger waiting for its time of day
    pub max_schedule_wait_ms: u64,
    /// Attempts made by external-action handlers on transient failures
    pub http_retries: u32,
    /// Base backoff between attempts; attempt N waits N times this
    pub retry_backoff_ms: u64,
    /// Per-request timeout for external calls
    pub http_timeout_ms: u64,
    /// Conversation turns loaded for AI nodes that do not set `memorySize`
    pub default_memory_size: usize,
    /// Hard cap on conversation turns regardless of node config
    pub max_memory_turns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            max_schedule_wait_ms: DEFAULT_MAX_SCHEDULE_WAIT_MS,
            http_retries: 3,
            retry_backoff_ms: 500,
            http_timeout_ms: 30_000,
            default_memory_size: 10,
            max_memory_turns: 50,
        }
    }
}

impl EngineConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn max_schedule_wait(&self) -> Duration {
        Duration::from_millis(self.max_schedule_wait_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Number of conversation turns to load for a node asking for `requested`
    pub fn memory_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_memory_size)
            .min(self.max_memory_turns)
    }
}
