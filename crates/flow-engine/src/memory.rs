//! Conversation memory capability
//!
//! AI-category nodes receive a bounded slice of prior turns through their
//! [`NodeContext`](crate::NodeContext). The store behind it is injected by
//! the host; the engine only reads history before a node runs, and handlers
//! append to it.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Session-keyed conversation history
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// The most recent `limit` turns, oldest first
    async fn history(&self, session: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Append turns to the end of a session
    async fn append(&self, session: &str, turns: Vec<ConversationTurn>) -> Result<()>;
}

/// Process-local memory, trimmed to a fixed number of turns per session
pub struct InMemoryConversationMemory {
    sessions: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    max_turns: usize,
}

impl InMemoryConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    pub fn session_len(&self, session: &str) -> usize {
        self.sessions.read().get(session).map(|t| t.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn history(&self, session: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let sessions = self.sessions.read();
        let turns = sessions.get(session).map(|t| t.as_slice()).unwrap_or(&[]);
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn append(&self, session: &str, turns: Vec<ConversationTurn>) -> Result<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(session.to_string()).or_default();
        entry.extend(turns);
        if entry.len() > self.max_turns {
            let excess = entry.len() - self.max_turns;
            entry.drain(..excess);
        }
        Ok(())
    }
}
