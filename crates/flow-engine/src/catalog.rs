//! Workflow catalog with file persistence
//!
//! Holds the stored workflow templates the controller runs. With a
//! persistence directory, each workflow is one `<id>.json` file and the
//! directory is loaded at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::Workflow;

/// Listing entry for a stored workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub node_count: usize,
    pub edge_count: usize,
}

/// In-memory workflow map with optional JSON directory persistence
///
/// # Example
///
/// ```ignore
/// let catalog = WorkflowCatalog::with_persistence("data/workflows");
/// let count = catalog.load_from_disk()?;
/// log::info!("Loaded {} workflows", count);
/// ```
#[derive(Debug, Default)]
pub struct WorkflowCatalog {
    workflows: RwLock<HashMap<String, Workflow>>,
    persist_path: Option<PathBuf>,
}

impl WorkflowCatalog {
    /// Create a new in-memory catalog without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog that persists to the given directory
    ///
    /// The directory is created on first save.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load every `*.json` workflow in the persistence directory
    ///
    /// Files that fail to parse are skipped with a warning. Returns the
    /// number of workflows loaded.
    pub fn load_from_disk(&self) -> Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };

        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.extension().map_or(false, |e| e == "json") {
                let content = std::fs::read_to_string(&file_path)?;
                match serde_json::from_str::<Workflow>(&content) {
                    Ok(workflow) => {
                        log::info!("Loaded workflow '{}' from {:?}", workflow.id, file_path);
                        self.workflows.write().insert(workflow.id.clone(), workflow);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse workflow from {:?}: {}", file_path, e);
                    }
                }
            }
        }
        Ok(count)
    }

    fn file_for(path: &Path, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(EngineError::InvalidRequest(format!(
                "invalid workflow id '{}'",
                id
            )));
        }
        Ok(path.join(format!("{}.json", id)))
    }

    fn save_to_disk(&self, workflow: &Workflow) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let file_path = Self::file_for(path, &workflow.id)?;
        std::fs::create_dir_all(path)?;
        std::fs::write(&file_path, serde_json::to_string_pretty(workflow)?)?;
        log::debug!("Saved workflow '{}' to {:?}", workflow.id, file_path);
        Ok(())
    }

    fn delete_from_disk(&self, id: &str) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let file_path = Self::file_for(path, id)?;
        if file_path.exists() {
            std::fs::remove_file(&file_path)?;
            log::debug!("Deleted workflow '{}' from {:?}", id, file_path);
        }
        Ok(())
    }

    /// Get a copy of a workflow by id
    pub fn get(&self, id: &str) -> Option<Workflow> {
        self.workflows.read().get(id).cloned()
    }

    /// Insert or replace a workflow, persisting it when enabled
    pub fn insert(&self, workflow: Workflow) -> Result<()> {
        self.save_to_disk(&workflow)?;
        self.workflows.write().insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// Remove a workflow, returning it if it existed
    pub fn remove(&self, id: &str) -> Result<Option<Workflow>> {
        self.delete_from_disk(id)?;
        Ok(self.workflows.write().remove(id))
    }

    /// Summaries of every stored workflow, sorted by id
    pub fn list(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .read()
            .values()
            .map(|w| WorkflowSummary {
                id: w.id.clone(),
                name: w.name.clone(),
                node_count: w.nodes.len(),
                edge_count: w.edges.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}
