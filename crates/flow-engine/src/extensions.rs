//! Typed extension map for injected runtime clients
//!
//! Hosts put long-lived, non-serializable objects here (HTTP clients,
//! database pools) once, and every handler in every run can reach them
//! through [`crate::NodeContext::extensions`]. Nothing is held in
//! process-wide statics.
//!
//! # Example
//!
//! ```
//! use flow_engine::ExecutorExtensions;
//! use std::sync::Arc;
//!
//! let mut ext = ExecutorExtensions::new();
//! ext.set("greeting", Arc::new(String::from("hi")));
//!
//! let greeting = ext.get::<Arc<String>>("greeting").unwrap();
//! assert_eq!(greeting.as_str(), "hi");
//! ```

use std::any::Any;
use std::collections::HashMap;

/// Map from string keys to values of arbitrary `Send + Sync` types
#[derive(Default)]
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under the key
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// `None` if the key is absent or holds a different type
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(|k| k.as_str())
    }
}

impl std::fmt::Debug for ExecutorExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}

/// Well-known extension keys
pub mod extension_keys {
    /// Shared `reqwest::Client` used by external-action handlers
    pub const HTTP_CLIENT: &str = "http_client";
}
