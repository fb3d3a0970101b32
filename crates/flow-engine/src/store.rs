//! Execution persistence
//!
//! The controller writes through [`ExecutionStore`] after every node
//! (`update_progress`) and once at the end (`finalize`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{EngineError, Result};
use crate::execution::{Execution, ExecutionLog, ExecutionStatus};

/// Storage collaborator for execution records
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new record, replacing any record with the same id
    async fn create(&self, execution: &Execution) -> Result<()>;

    /// Fetch a record by id
    async fn get(&self, id: &str) -> Result<Option<Execution>>;

    /// Replace the logs array and status of an existing record
    async fn update_progress(
        &self,
        id: &str,
        logs: &[ExecutionLog],
        status: ExecutionStatus,
    ) -> Result<()>;

    /// Write the terminal record
    async fn finalize(&self, execution: &Execution) -> Result<()>;
}

/// In-memory store, used by tests and when no data directory is configured
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<String, Execution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        self.executions
            .write()
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().get(id).cloned())
    }

    async fn update_progress(
        &self,
        id: &str,
        logs: &[ExecutionLog],
        status: ExecutionStatus,
    ) -> Result<()> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))?;
        execution.logs = logs.to_vec();
        execution.status = status;
        Ok(())
    }

    async fn finalize(&self, execution: &Execution) -> Result<()> {
        self.executions
            .write()
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }
}

/// One pretty-printed `<id>.json` document per execution
#[derive(Debug, Clone)]
pub struct JsonFileExecutionStore {
    dir: PathBuf,
}

impl JsonFileExecutionStore {
    /// Store under `dir`; the directory is created on first write
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EngineError::InvalidRequest(format!(
                "invalid execution id '{}'",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    async fn write(&self, execution: &Execution) -> Result<()> {
        let path = self.path_for(&execution.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(execution)?;
        tokio::fs::write(&path, content).await?;
        log::debug!("Saved execution '{}' to {:?}", execution.id, path);
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for JsonFileExecutionStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        self.write(execution).await
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>> {
        let path = self.path_for(id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn update_progress(
        &self,
        id: &str,
        logs: &[ExecutionLog],
        status: ExecutionStatus,
    ) -> Result<()> {
        let mut execution = self
            .get(id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))?;
        execution.logs = logs.to_vec();
        execution.status = status;
        self.write(&execution).await
    }

    async fn finalize(&self, execution: &Execution) -> Result<()> {
        self.write(execution).await
    }
}
