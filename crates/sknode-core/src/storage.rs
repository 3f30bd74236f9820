//! Configuration storage abstraction.
//!
//! Node configuration is a JSON document keyed by the node's config path.
//! This module provides the storage trait and two backends:
//! - [`MemoryConfigStorage`]: in-memory, for tests and ephemeral setups
//! - [`FileConfigStorage`]: one JSON file per path under a root directory
//!
//! On ESP32 targets the same trait is implemented on top of NVS flash.
//! An absent key is reported as `Ok(None)`, never as an error: a node with
//! nothing stored simply keeps its constructor defaults.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::config::ConfigError;

/// Abstract configuration storage.
///
/// All methods are synchronous to support embedded platforms.
pub trait ConfigStorage {
    /// Load the document stored under `path`. `Ok(None)` on first boot.
    fn load(&self, path: &str) -> Result<Option<Value>, ConfigError>;

    /// Store `value` under `path`, replacing any previous document.
    fn save(&self, path: &str, value: &Value) -> Result<(), ConfigError>;

    /// Check if a path has a stored document.
    fn has_key(&self, path: &str) -> bool;

    /// Delete the document stored under `path`. Deleting a missing path is
    /// not an error.
    fn delete(&self, path: &str) -> Result<(), ConfigError>;

    /// All paths with a stored document.
    fn list_paths(&self) -> Result<Vec<String>, ConfigError>;
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E>(_: E) -> ConfigError {
    ConfigError::StorageUnavailable("storage lock poisoned".to_string())
}

impl ConfigStorage for MemoryConfigStorage {
    fn load(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(path).cloned())
    }

    fn save(&self, path: &str, value: &Value) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(poisoned)?
            .insert(path.to_string(), value.clone());
        Ok(())
    }

    fn has_key(&self, path: &str) -> bool {
        self.data
            .read()
            .map(|data| data.contains_key(path))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<(), ConfigError> {
        self.data.write().map_err(poisoned)?.remove(path);
        Ok(())
    }

    fn list_paths(&self) -> Result<Vec<String>, ConfigError> {
        let data = self.data.read().map_err(poisoned)?;
        let mut paths: Vec<String> = data.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

/// File-based storage: each config path becomes one `.json` file.
///
/// Paths like `/sensors/ina219` are flattened to `sensors__ina219.json` so the
/// root directory stays a single level deep. Every byte other than ASCII
/// alphanumerics, `-` and `.` is escaped as `_` plus two hex digits, so `_`
/// itself becomes `_5f` and distinct paths never share a file. The
/// unflattened path is stored alongside the document so
/// [`list_paths`](ConfigStorage::list_paths) can return it unchanged.
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    root: PathBuf,
}

impl FileConfigStorage {
    /// Use `root` as the storage directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            ConfigError::StorageUnavailable(format!("{}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    /// The storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, path: &str) -> PathBuf {
        let mut name = String::with_capacity(path.len());
        for byte in path.trim_start_matches('/').bytes() {
            match byte {
                b'/' => name.push_str("__"),
                b'-' | b'.' => name.push(byte as char),
                _ if byte.is_ascii_alphanumeric() => name.push(byte as char),
                _ => name.push_str(&format!("_{:02x}", byte)),
            }
        }
        self.root.join(format!("{}.json", name))
    }
}

impl ConfigStorage for FileConfigStorage {
    fn load(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        let file = self.file_for(path);
        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::ReadError(format!("{}: {}", file.display(), e))),
        };

        let mut envelope: Value = serde_json::from_str(&text)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", file.display(), e)))?;
        Ok(envelope.get_mut("config").map(Value::take))
    }

    fn save(&self, path: &str, value: &Value) -> Result<(), ConfigError> {
        let file = self.file_for(path);
        let envelope = serde_json::json!({ "path": path, "config": value });
        let text = serde_json::to_string_pretty(&envelope)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written document.
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, text)
            .and_then(|_| fs::rename(&tmp, &file))
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", file.display(), e)))?;
        debug!("Wrote {}", file.display());
        Ok(())
    }

    fn has_key(&self, path: &str) -> bool {
        self.file_for(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<(), ConfigError> {
        match fs::remove_file(self.file_for(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::WriteError(e.to_string())),
        }
    }

    fn list_paths(&self) -> Result<Vec<String>, ConfigError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let mut paths = Vec::new();
        for entry in entries.flatten() {
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(text) = fs::read_to_string(&file) else {
                continue;
            };
            if let Ok(envelope) = serde_json::from_str::<Value>(&text) {
                if let Some(path) = envelope.get("path").and_then(Value::as_str) {
                    paths.push(path.to_string());
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sknode-storage-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_memory_missing_is_none() {
        let storage = MemoryConfigStorage::new();
        assert_eq!(storage.load("/nothing").unwrap(), None);
        assert!(!storage.has_key("/nothing"));
    }

    #[test]
    fn test_memory_save_load_delete() {
        let storage = MemoryConfigStorage::new();
        storage.save("/a", &json!({ "k": 1 })).unwrap();
        storage.save("/b", &json!({ "k": 2 })).unwrap();

        assert_eq!(storage.load("/a").unwrap(), Some(json!({ "k": 1 })));
        assert_eq!(storage.list_paths().unwrap(), vec!["/a", "/b"]);

        storage.delete("/a").unwrap();
        assert!(!storage.has_key("/a"));
        storage.delete("/a").unwrap();
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let root = temp_root("persist");
        let storage = FileConfigStorage::new(&root).unwrap();
        storage
            .save("/system/networking", &json!({ "hostname": "boat" }))
            .unwrap();

        let reopened = FileConfigStorage::new(&root).unwrap();
        assert_eq!(
            reopened.load("/system/networking").unwrap(),
            Some(json!({ "hostname": "boat" }))
        );
        assert_eq!(reopened.list_paths().unwrap(), vec!["/system/networking"]);
        assert!(root.join("system__networking.json").is_file());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_file_storage_keeps_similar_paths_apart() {
        let root = temp_root("similar");
        let storage = FileConfigStorage::new(&root).unwrap();
        storage
            .save("/engine temp/linear", &json!({ "k": 9.0, "c": 0.0 }))
            .unwrap();
        storage.save("/a/b", &json!({ "n": 1 })).unwrap();

        assert_eq!(storage.load("/engine_temp/linear").unwrap(), None);
        assert_eq!(storage.load("/a__b").unwrap(), None);
        assert!(!storage.has_key("/a_2fb"));

        storage.save("/a__b", &json!({ "n": 2 })).unwrap();
        assert_eq!(storage.load("/a/b").unwrap(), Some(json!({ "n": 1 })));
        assert_eq!(
            storage.list_paths().unwrap(),
            vec!["/a/b", "/a__b", "/engine temp/linear"]
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_file_storage_missing_and_delete() {
        let root = temp_root("missing");
        let storage = FileConfigStorage::new(&root).unwrap();

        assert_eq!(storage.load("/x").unwrap(), None);
        storage.save("/x", &json!(1)).unwrap();
        assert!(storage.has_key("/x"));
        storage.delete("/x").unwrap();
        assert!(!storage.has_key("/x"));
        storage.delete("/x").unwrap();

        let _ = fs::remove_dir_all(&root);
    }
}
