//! Vault access: task file listing, note metadata and lookups.
//!
//! The reconciler only sees the [`Vault`] trait. [`FsVault`] reads a vault
//! on disk; [`MemoryVault`] holds notes in memory for embedders and tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::frontmatter::{self, Frontmatter};
use crate::storage::Storage;

/// A markdown file that may define a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFile {
    /// Vault-relative path with `/` separators
    pub path: String,
    /// File name without `.md`
    pub basename: String,
    /// When the file appeared, if the platform reports it
    pub created: Option<DateTime<Utc>>,
}

impl TaskFile {
    pub fn new(path: impl Into<String>, created: Option<DateTime<Utc>>) -> Self {
        let path = path.into();
        let basename = basename_of(&path).to_string();
        Self {
            path,
            basename,
            created,
        }
    }
}

/// Existence stamp for a vault path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub created: Option<DateTime<Utc>>,
}

/// `Task/Morning walk.md` -> `Morning walk`
pub fn basename_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

#[allow(async_fn_in_trait)]
pub trait Vault {
    /// Candidate task files, sorted by path. A missing task folder is empty.
    async fn list_task_files(&self) -> Vec<TaskFile>;

    /// Frontmatter of a note; `Ok(None)` when the note has none.
    async fn read_frontmatter(&self, path: &str) -> Result<Option<Frontmatter>>;

    /// `Some` when a file exists at the vault-relative path.
    fn stat(&self, path: &str) -> Option<FileStamp>;

    /// Vault-wide notes named `<basename>.md`, sorted by path.
    fn find_by_basename(&self, basename: &str) -> Vec<String>;
}

// =============================================================================
// Filesystem vault
// =============================================================================

#[derive(Debug, Clone)]
pub struct FsVault {
    storage: Storage,
}

impl FsVault {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn read_note(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.storage.resolve(path))?)
    }

    pub fn write_note(&self, path: &str, content: &str) -> Result<()> {
        crate::lock::write_atomic(self.storage.resolve(path), content.as_bytes())
    }

    /// Remove a note; a note that is already gone is not an error.
    pub fn delete_note(&self, path: &str) -> Result<bool> {
        match fs::remove_file(self.storage.resolve(path)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::Io(err)),
        }
    }

    pub fn rename_note(&self, from: &str, to: &str) -> Result<()> {
        let target = self.storage.resolve(to);
        if target.exists() {
            return Err(Error::InvalidArgument(format!("{to} already exists")));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.storage.resolve(from), target)?;
        Ok(())
    }

    fn scan_markdown(storage: &Storage, root: &Path, name: &str) -> Vec<TaskFile> {
        if !root.exists() {
            tracing::debug!(folder = %root.display(), "folder missing, nothing to list");
            return Vec::new();
        }
        let pattern = format!(
            "{}/**/{}.md",
            glob::Pattern::escape(&root.to_string_lossy()),
            name
        );
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "invalid listing pattern");
                return Vec::new();
            }
        };
        let data_dir = storage.data_dir();
        let mut files: Vec<TaskFile> = entries
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file() && !path.starts_with(&data_dir))
            .map(|path| TaskFile::new(storage.relative(&path), created_at(&path)))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }
}

fn created_at(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).ok()?;
    // Some filesystems report no birth time; the last write is the closest stamp.
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

impl Vault for FsVault {
    async fn list_task_files(&self) -> Vec<TaskFile> {
        let storage = self.storage.clone();
        let listing = tokio::task::spawn_blocking(move || {
            let root = storage.task_folder();
            FsVault::scan_markdown(&storage, &root, "*")
        })
        .await;
        match listing {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(error = %err, "task folder listing aborted");
                Vec::new()
            }
        }
    }

    async fn read_frontmatter(&self, path: &str) -> Result<Option<Frontmatter>> {
        let content = tokio::fs::read_to_string(self.storage.resolve(path)).await?;
        Ok(frontmatter::parse(&content))
    }

    fn stat(&self, path: &str) -> Option<FileStamp> {
        let absolute = self.storage.resolve(path);
        absolute.is_file().then(|| FileStamp {
            created: created_at(&absolute),
        })
    }

    fn find_by_basename(&self, basename: &str) -> Vec<String> {
        let root = self.storage.vault_root().to_path_buf();
        Self::scan_markdown(&self.storage, &root, &glob::Pattern::escape(basename))
            .into_iter()
            .map(|file| file.path)
            .collect()
    }
}

// =============================================================================
// In-memory vault
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryNote {
    content: String,
    created: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemoryVault {
    task_folder: String,
    notes: RwLock<BTreeMap<String, MemoryNote>>,
}

impl MemoryVault {
    pub fn new(task_folder: impl Into<String>) -> Self {
        Self {
            task_folder: task_folder.into().trim_end_matches('/').to_string(),
            notes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, path: &str, content: &str, created: Option<DateTime<Utc>>) {
        if let Ok(mut notes) = self.notes.write() {
            notes.insert(
                path.to_string(),
                MemoryNote {
                    content: content.to_string(),
                    created,
                },
            );
        }
    }

    pub fn remove(&self, path: &str) -> bool {
        self.notes
            .write()
            .map(|mut notes| notes.remove(path).is_some())
            .unwrap_or(false)
    }

    fn snapshot(&self) -> BTreeMap<String, MemoryNote> {
        self.notes.read().map(|notes| notes.clone()).unwrap_or_default()
    }
}

impl Vault for MemoryVault {
    async fn list_task_files(&self) -> Vec<TaskFile> {
        let prefix = format!("{}/", self.task_folder);
        self.snapshot()
            .into_iter()
            .filter(|(path, _)| path.starts_with(&prefix) && path.ends_with(".md"))
            .map(|(path, note)| TaskFile::new(path, note.created))
            .collect()
    }

    async fn read_frontmatter(&self, path: &str) -> Result<Option<Frontmatter>> {
        let notes = self.snapshot();
        let note = notes.get(path).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} not found"),
            ))
        })?;
        Ok(frontmatter::parse(&note.content))
    }

    fn stat(&self, path: &str) -> Option<FileStamp> {
        self.snapshot().get(path).map(|note| FileStamp {
            created: note.created,
        })
    }

    fn find_by_basename(&self, basename: &str) -> Vec<String> {
        self.snapshot()
            .into_keys()
            .filter(|path| path.ends_with(".md") && basename_of(path) == basename)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;

    #[test]
    fn basename_strips_folder_and_extension() {
        assert_eq!(basename_of("TaskChute/Task/Morning walk.md"), "Morning walk");
        assert_eq!(basename_of("plain"), "plain");
    }

    #[tokio::test]
    async fn fs_vault_lists_task_notes_and_searches_vault() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), PathsConfig::default());
        let task_dir = storage.task_folder();
        fs::create_dir_all(task_dir.join("sub")).unwrap();
        fs::write(task_dir.join("Walk.md"), "---\nisRoutine: true\n---\n").unwrap();
        fs::write(task_dir.join("sub").join("Read [draft].md"), "body").unwrap();
        fs::write(task_dir.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("Elsewhere")).unwrap();
        fs::write(dir.path().join("Elsewhere").join("Walk.md"), "other").unwrap();

        let vault = FsVault::new(storage);
        let files = vault.list_task_files().await;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["TaskChute/Task/Walk.md", "TaskChute/Task/sub/Read [draft].md"]
        );
        assert_eq!(files[1].basename, "Read [draft]");

        let fm = vault
            .read_frontmatter("TaskChute/Task/Walk.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fm["isRoutine"], serde_json::Value::Bool(true));

        assert_eq!(
            vault.find_by_basename("Walk"),
            vec!["Elsewhere/Walk.md", "TaskChute/Task/Walk.md"]
        );
        assert!(vault.stat("TaskChute/Task/Walk.md").is_some());
        assert!(vault.stat("TaskChute/Task/Missing.md").is_none());
    }

    #[tokio::test]
    async fn fs_vault_missing_task_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), PathsConfig::default());
        assert!(FsVault::new(storage).list_task_files().await.is_empty());
    }

    #[tokio::test]
    async fn memory_vault_scopes_listing_to_task_folder() {
        let vault = MemoryVault::new("Task");
        vault.insert("Task/A.md", "---\nisRoutine: true\n---\n", None);
        vault.insert("Projects/A.md", "", None);
        let files = vault.list_task_files().await;
        assert_eq!(files.len(), 1);
        assert_eq!(vault.find_by_basename("A"), vec!["Projects/A.md", "Task/A.md"]);
        assert!(vault.remove("Task/A.md"));
        assert!(vault.stat("Task/A.md").is_none());
    }
}
