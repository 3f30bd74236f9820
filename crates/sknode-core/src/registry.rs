//! Registry of configurable nodes.
//!
//! The external configuration UI works in terms of config paths: list them,
//! show one (current values plus schema), submit an update. The registry maps
//! those requests onto the registered nodes and persists accepted updates.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, Configurable};
use crate::storage::ConfigStorage;

/// Configurable nodes keyed by config path.
pub struct ConfigRegistry {
    storage: Rc<dyn ConfigStorage>,
    nodes: RefCell<BTreeMap<String, Rc<dyn Configurable>>>,
}

impl ConfigRegistry {
    pub fn new(storage: Rc<dyn ConfigStorage>) -> Self {
        Self {
            storage,
            nodes: RefCell::new(BTreeMap::new()),
        }
    }

    /// The storage updates are saved to.
    pub fn storage(&self) -> &Rc<dyn ConfigStorage> {
        &self.storage
    }

    /// Register a node under its config path. Nodes without a path are not
    /// exposed and are returned unchanged.
    pub fn register<C>(&self, node: Rc<C>) -> Result<Rc<C>, ConfigError>
    where
        C: Configurable + 'static,
    {
        let Some(path) = node.config_path().map(String::from) else {
            debug!("Skipping registration of node without config path");
            return Ok(node);
        };

        let mut nodes = self.nodes.borrow_mut();
        if nodes.contains_key(&path) {
            return Err(ConfigError::DuplicatePath(path));
        }
        let entry: Rc<dyn Configurable> = node.clone();
        nodes.insert(path, entry);
        Ok(node)
    }

    /// All registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.borrow().keys().cloned().collect()
    }

    fn node(&self, path: &str) -> Result<Rc<dyn Configurable>, ConfigError> {
        self.nodes
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(path.to_string()))
    }

    /// Current configuration and schema of one node.
    pub fn describe(&self, path: &str) -> Result<Value, ConfigError> {
        let node = self.node(path)?;
        Ok(serde_json::json!({
            "path": path,
            "config": node.configuration(),
            "schema": node.get_config_schema(),
        }))
    }

    /// Apply an update to one node and persist it.
    ///
    /// A rejected update leaves both the node and the stored copy untouched.
    /// An accepted update that fails to save stays applied and is reported
    /// as [`ConfigError::NotPersisted`].
    pub fn update(&self, path: &str, config: &Value) -> Result<(), ConfigError> {
        let node = self.node(path)?;
        if let Err(e) = node.set_configuration(config) {
            warn!("Rejected configuration update for {}: {}", path, e);
            return Err(e);
        }
        if let Err(e) = node.save_configuration(self.storage.as_ref()) {
            error!("Applied configuration for {} but could not save it: {}", path, e);
            return Err(ConfigError::NotPersisted {
                path: path.to_string(),
                reason: e.to_string(),
            });
        }
        info!("Updated configuration for {}", path);
        Ok(())
    }

    /// Persist every registered node.
    pub fn save_all(&self) -> Result<(), ConfigError> {
        let nodes: Vec<Rc<dyn Configurable>> = self.nodes.borrow().values().cloned().collect();
        for node in nodes {
            node.save_configuration(self.storage.as_ref())?;
        }
        Ok(())
    }
}
