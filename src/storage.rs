//! Storage layer for dayplan
//!
//! Engine state lives under the vault's data directory; task notes and
//! execution logs live in their configured vault folders.
//!
//! # Directory Structure
//!
//! ```text
//! <vault>/
//!   .dayplan.toml                 # Configuration
//!   .dayplan/                     # Engine state (data_dir)
//!     aliases.json                # Alias table: current name -> former names
//!     state/                      # Key-value store, one document per key
//!       deleted-instances-<date>.json
//!       hidden-routines-<date>.json
//!       task-orders-<date>.json
//!       duplicated-instances-<date>.json
//!       deleted-tasks.json        # Legacy global deletion list
//!       slot-overrides.json
//!       running-tasks.json
//!   TaskChute/Task/*.md           # Task definitions (task_folder)
//!   TaskChute/Log/<YYYY-MM>-tasks.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::config::PathsConfig;
use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the alias table document inside the data directory
pub const ALIASES_FILE: &str = "aliases.json";

/// Name of the key-value state directory inside the data directory
pub const STATE_DIR: &str = "state";

/// Path resolver and JSON helpers rooted at one vault
#[derive(Debug, Clone)]
pub struct Storage {
    vault_root: PathBuf,
    paths: PathsConfig,
}

impl Storage {
    pub fn new(vault_root: PathBuf, paths: PathsConfig) -> Self {
        Self { vault_root, paths }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    /// Absolute path for a vault-relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.vault_root.join(relative.trim_start_matches('/'))
    }

    /// Vault-relative form of an absolute path inside the vault
    pub fn relative(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.vault_root)
            .unwrap_or(absolute)
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.paths.data_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir().join(STATE_DIR)
    }

    pub fn aliases_file(&self) -> PathBuf {
        self.data_dir().join(ALIASES_FILE)
    }

    pub fn task_folder(&self) -> PathBuf {
        self.resolve(&self.paths.task_folder)
    }

    pub fn log_folder(&self) -> PathBuf {
        self.resolve(&self.paths.log_folder)
    }

    /// Monthly execution log, e.g. `TaskChute/Log/2024-01-tasks.json`
    pub fn monthly_log_file(&self, year: i32, month: u32) -> PathBuf {
        self.log_folder()
            .join(format!("{year:04}-{month:02}-tasks.json"))
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON atomically while holding the sibling lock file
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic_locked(path, json.as_bytes(), DEFAULT_LOCK_TIMEOUT_MS)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Read JSON, mapping a missing file to `None`
    pub fn read_json_opt<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        self.read_json(path).map(Some)
    }

    /// File-backed key-value store under `state/`
    pub fn state_store(&self) -> FileStore {
        FileStore::new(self.state_dir())
    }
}

// =============================================================================
// Key-value store
// =============================================================================

/// Date-key-scoped document store injected into the engine.
///
/// Each key holds one whole JSON document; writers replace the document
/// (last writer wins).
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn save(&self, key: &str, value: &Value) -> Result<()>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Load a typed document; missing keys give the default, unreadable or
/// malformed documents are logged and also give the default.
pub fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.load(key) {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "malformed state document, using empty");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(err) => {
            tracing::warn!(key = %key, error = %err, "state document unreadable, using empty");
            T::default()
        }
    }
}

pub fn save_typed<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.save(key, &value)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(Error::InvalidArgument(format!("invalid state key '{key}'")));
    }
    Ok(())
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        let json = serde_json::to_string_pretty(value)?;
        lock::write_atomic_locked(self.key_path(key), json.as_bytes(), DEFAULT_LOCK_TIMEOUT_MS)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(".json") {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process store, used by embedders and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::OperationFailed("state store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::OperationFailed("state store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::OperationFailed("state store poisoned".to_string()))?;
        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> Storage {
        Storage::new(dir.path().to_path_buf(), PathsConfig::default())
    }

    #[test]
    fn paths_follow_config() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert_eq!(storage.state_dir(), dir.path().join(".dayplan").join("state"));
        assert_eq!(
            storage.monthly_log_file(2024, 3),
            dir.path().join("TaskChute/Log").join("2024-03-tasks.json")
        );
        assert_eq!(
            storage.relative(&dir.path().join("TaskChute/Task/a.md")),
            "TaskChute/Task/a.md"
        );
    }

    #[test]
    fn file_store_round_trips_and_lists_prefix() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir).state_store();

        assert!(store.load("deleted-instances-2024-01-01").unwrap().is_none());
        store
            .save("deleted-instances-2024-01-01", &json!([{"path": "a.md"}]))
            .unwrap();
        store.save("hidden-routines-2024-01-01", &json!([])).unwrap();

        let loaded = store.load("deleted-instances-2024-01-01").unwrap().unwrap();
        assert_eq!(loaded[0]["path"], "a.md");
        assert_eq!(
            store.keys_with_prefix("deleted-instances-").unwrap(),
            vec!["deleted-instances-2024-01-01".to_string()]
        );
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir).state_store();
        assert!(matches!(
            store.save("../escape", &json!(1)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn malformed_document_loads_as_default() {
        let store = MemoryStore::new();
        store.save("task-orders-2024-01-01", &json!("not a map")).unwrap();
        let parsed: BTreeMap<String, i64> = load_or_default(&store, "task-orders-2024-01-01");
        assert!(parsed.is_empty());
    }
}
