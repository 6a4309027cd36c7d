//! Configuration loading and management
//!
//! Handles parsing of `.dayplan.toml` at the vault root.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file at the vault root
pub const CONFIG_FILE: &str = ".dayplan.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Vault-relative folder layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Reconciliation behaviour
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Vault-relative folders the engine reads and writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Folder holding one markdown file per task
    #[serde(default = "default_task_folder")]
    pub task_folder: String,

    /// Folder where `[[Project]]` notes conventionally live
    #[serde(default = "default_project_folder")]
    pub project_folder: String,

    /// Folder holding `<YYYY-MM>-tasks.json` execution logs
    #[serde(default = "default_log_folder")]
    pub log_folder: String,

    /// Folder for engine state (deletions, orders, aliases)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_task_folder() -> String {
    "TaskChute/Task".to_string()
}

fn default_project_folder() -> String {
    "TaskChute/Project".to_string()
}

fn default_log_folder() -> String {
    "TaskChute/Log".to_string()
}

fn default_data_dir() -> String {
    ".dayplan".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            task_folder: default_task_folder(),
            project_folder: default_project_folder(),
            log_folder: default_log_folder(),
            data_dir: default_data_dir(),
        }
    }
}

/// Reconciliation switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Prune stale permanent deletions before each load
    #[serde(default = "default_true")]
    pub cleanup_on_load: bool,

    /// Move elapsed idle instances into the current slot when viewing today
    #[serde(default = "default_true")]
    pub migrate_elapsed: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cleanup_on_load: true,
            migrate_elapsed: true,
        }
    }
}

impl Config {
    /// Load configuration from a `.dayplan.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the vault root, or return defaults
    pub fn load_from_vault(vault_root: &Path) -> Self {
        let config_path = vault_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.paths.validate()
    }
}

impl PathsConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let fields = [
            ("paths.task_folder", &self.task_folder),
            ("paths.project_folder", &self.project_folder),
            ("paths.log_folder", &self.log_folder),
            ("paths.data_dir", &self.data_dir),
        ];
        for (field, value) in fields {
            let trimmed = value.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "{field} cannot be empty"
                )));
            }
            if Path::new(trimmed).is_absolute() {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "{field} must be relative to the vault root"
                )));
            }
            if trimmed.split('/').any(|part| part == "..") {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "{field} cannot leave the vault root"
                )));
            }
        }
        Ok(())
    }
}
