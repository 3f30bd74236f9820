//! The configuration contract shared by every node.
//!
//! A node that wants runtime-tunable, persisted settings implements
//! [`Configurable`]. The external configuration UI reads
//! [`Configurable::get_config_schema`] and [`Configurable::get_configuration`]
//! and writes back through [`Configurable::set_configuration`].
//!
//! `set_configuration` fails closed: implementations validate every required
//! key (and its type) before touching any field, so a rejected update leaves
//! the node exactly as it was.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::ConfigStorage;

/// Errors that can occur during configuration operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required key is absent from a configuration update.
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    /// A key is present but its value has the wrong type or range.
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// No configurable is registered under the path.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Another configurable already uses the path.
    #[error("Duplicate configuration path: {0}")]
    DuplicatePath(String),

    /// Failed to read configuration.
    #[error("Read error: {0}")]
    ReadError(String),

    /// Failed to write configuration.
    #[error("Write error: {0}")]
    WriteError(String),

    /// Storage is not available.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An update was applied in memory but could not be saved. The node
    /// runs with the new values until the next boot.
    #[error("Applied configuration for {path} but failed to save it: {reason}")]
    NotPersisted { path: String, reason: String },
}

/// A node with persisted, UI-editable configuration.
pub trait Configurable {
    /// Path scoping this node's stored configuration. `None` means the node
    /// is never persisted.
    fn config_path(&self) -> Option<&str>;

    /// Populate `root` with the current tunable state (and any read-only
    /// telemetry the schema marks as such).
    fn get_configuration(&self, root: &mut Map<String, Value>);

    /// Validate and apply a configuration object.
    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError>;

    /// JSON schema describing the fields of [`get_configuration`](Self::get_configuration).
    fn get_config_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// The current configuration as a JSON object.
    fn configuration(&self) -> Value {
        let mut root = Map::new();
        self.get_configuration(&mut root);
        Value::Object(root)
    }

    /// Apply the stored configuration, if any.
    ///
    /// An empty store (first boot) or a missing path keeps the constructor
    /// defaults and is not an error. A stored object that fails validation
    /// is rejected and the defaults stay in place.
    fn load_configuration(&self, storage: &dyn ConfigStorage) -> Result<(), ConfigError> {
        let Some(path) = self.config_path() else {
            return Ok(());
        };

        match storage.load(path)? {
            Some(stored) => {
                debug!("Loading configuration for {}", path);
                self.set_configuration(&stored)
            }
            None => {
                debug!("No stored configuration for {}, using defaults", path);
                Ok(())
            }
        }
    }

    /// [`load_configuration`](Self::load_configuration) for constructors:
    /// a failure is logged with the path and the current values stay.
    fn restore_configuration(&self, storage: &dyn ConfigStorage) {
        if let Err(e) = self.load_configuration(storage) {
            warn!(
                "Keeping default configuration for {}: {}",
                self.config_path().unwrap_or("<unnamed>"),
                e
            );
        }
    }

    /// Persist the current configuration under [`config_path`](Self::config_path).
    fn save_configuration(&self, storage: &dyn ConfigStorage) -> Result<(), ConfigError> {
        let Some(path) = self.config_path() else {
            return Ok(());
        };
        debug!("Saving configuration for {}", path);
        storage.save(path, &self.configuration())
    }
}

/// Check that `config` is an object containing every key in `keys`.
///
/// Returns the object so callers can go on to read the fields.
pub fn require_keys<'a>(
    config: &'a Value,
    keys: &[&str],
) -> Result<&'a Map<String, Value>, ConfigError> {
    let map = config.as_object().ok_or_else(|| ConfigError::InvalidValue {
        key: "<root>".to_string(),
        reason: "expected a JSON object".to_string(),
    })?;

    if let Some(missing) = keys.iter().find(|key| !map.contains_key(**key)) {
        return Err(ConfigError::MissingKey(missing.to_string()));
    }

    Ok(map)
}

/// Read a numeric field.
pub fn number_field(map: &Map<String, Value>, key: &str) -> Result<f64, ConfigError> {
    let value = map
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    value.as_f64().ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected a number, got {}", value),
    })
}

/// Read a non-negative integer field. Whole floats (`2000.0`) are accepted.
pub fn unsigned_field(map: &Map<String, Value>, key: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        reason: "expected a non-negative integer".to_string(),
    };

    let number = number_field(map, key)?;
    if number < 0.0 || number.fract() != 0.0 || number > f64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok(number as u32)
}

/// Read a string field.
pub fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str, ConfigError> {
    let value = map
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected a string, got {}", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryConfigStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::Cell;

    struct Threshold {
        path: Option<String>,
        level: Cell<f64>,
    }

    impl Configurable for Threshold {
        fn config_path(&self) -> Option<&str> {
            self.path.as_deref()
        }

        fn get_configuration(&self, root: &mut Map<String, Value>) {
            root.insert("level".to_string(), json!(self.level.get()));
        }

        fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
            let map = require_keys(config, &["level"])?;
            self.level.set(number_field(map, "level")?);
            Ok(())
        }
    }

    fn threshold(path: Option<&str>) -> Threshold {
        Threshold {
            path: path.map(String::from),
            level: Cell::new(1.5),
        }
    }

    #[test]
    fn test_require_keys_reports_first_missing() {
        let config = json!({ "k": 1.0 });
        let err = require_keys(&config, &["k", "c"]).unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("c".to_string()));
    }

    #[test]
    fn test_require_keys_rejects_non_object() {
        assert!(matches!(
            require_keys(&json!([1, 2]), &[]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unsigned_field() {
        let config = json!({ "a": 2000, "b": 2000.0, "c": -1, "d": 1.5 });
        let map = config.as_object().unwrap();
        assert_eq!(unsigned_field(map, "a").unwrap(), 2000);
        assert_eq!(unsigned_field(map, "b").unwrap(), 2000);
        assert!(unsigned_field(map, "c").is_err());
        assert!(unsigned_field(map, "d").is_err());
    }

    #[test]
    fn test_load_from_empty_storage_keeps_defaults() {
        let storage = MemoryConfigStorage::new();
        let node = threshold(Some("/threshold"));

        node.load_configuration(&storage).unwrap();

        assert_eq!(node.level.get(), 1.5);
    }

    #[test]
    fn test_save_then_load() {
        let storage = MemoryConfigStorage::new();
        let node = threshold(Some("/threshold"));
        node.level.set(7.0);
        node.save_configuration(&storage).unwrap();

        let fresh = threshold(Some("/threshold"));
        fresh.load_configuration(&storage).unwrap();

        assert_eq!(fresh.level.get(), 7.0);
        assert_eq!(fresh.configuration(), json!({ "level": 7.0 }));
    }

    #[test]
    fn test_invalid_stored_config_keeps_defaults() {
        let storage = MemoryConfigStorage::new();
        storage.save("/threshold", &json!({ "other": 1 })).unwrap();

        let node = threshold(Some("/threshold"));
        let result = node.load_configuration(&storage);

        assert!(result.is_err());
        assert_eq!(node.level.get(), 1.5);
    }

    #[test]
    fn test_restore_keeps_defaults_on_bad_document() {
        let storage = MemoryConfigStorage::new();
        storage.save("/threshold", &json!({ "level": "high" })).unwrap();

        let node = threshold(Some("/threshold"));
        node.restore_configuration(&storage);

        assert_eq!(node.level.get(), 1.5);
    }

    #[test]
    fn test_no_path_is_never_persisted() {
        let storage = MemoryConfigStorage::new();
        let node = threshold(None);

        node.save_configuration(&storage).unwrap();

        assert!(storage.list_paths().unwrap().is_empty());
    }
}
