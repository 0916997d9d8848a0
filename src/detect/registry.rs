use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Registry of detector backends, keyed by backend name.
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "detector backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Remove and return the default backend, for handing to a frame loop.
    pub fn take_default(&mut self) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .take()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        self.backends
            .remove(&name)
            .ok_or_else(|| anyhow!("detector backend '{}' not registered", name))
    }

    /// List registered backends in name order.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
