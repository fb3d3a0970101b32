//! Server configuration
//!
//! Read from a JSON file named by `--config <path>` or `FLOW_CONFIG`, then
//! overridden by `FLOW_BIND_ADDR` and `FLOW_DATA_DIR`.

use std::path::{Path, PathBuf};

use flow_engine::{EngineConfig, EngineError, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "FLOW_CONFIG";
pub const BIND_ADDR_ENV: &str = "FLOW_BIND_ADDR";
pub const DATA_DIR_ENV: &str = "FLOW_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Executions and workflows are kept in memory when unset
    pub data_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            data_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the command line and environment
    pub fn load() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let path = config_path_arg(&args).or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(
            std::env::var(BIND_ADDR_ENV).ok(),
            std::env::var(DATA_DIR_ENV).ok(),
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidRequest(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Empty values are ignored
    pub fn apply_overrides(&mut self, bind_addr: Option<String>, data_dir: Option<String>) {
        if let Some(addr) = bind_addr.filter(|a| !a.trim().is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn executions_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("executions"))
    }

    pub fn workflows_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("workflows"))
    }
}

fn config_path_arg(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
