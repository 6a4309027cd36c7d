#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use chrono::{NaiveDate, NaiveDateTime};
use dayplan::alias::AliasTable;
use dayplan::config::{Config, PathsConfig};
use dayplan::daystate::DayStateStore;
use dayplan::deletion::DeletionStore;
use dayplan::execlog::FileExecutionLog;
use dayplan::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use dayplan::storage::{FileStore, Storage};
use dayplan::vault::FsVault;
use serde_json::Value;
use tempfile::TempDir;

pub const DAILY: &str = "---\nisRoutine: true\n---\n";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A clock one day after `date`, so passes never migrate slots.
pub fn day_after(date: NaiveDate) -> NaiveDateTime {
    date.succ_opt()
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("valid clock")
}

pub struct TestVault {
    dir: TempDir,
}

impl TestVault {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.dir.path().to_path_buf(), PathsConfig::default())
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn read_file(&self, rel_path: &str) -> String {
        fs::read_to_string(self.dir.path().join(rel_path)).expect("read file")
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.dir.path().join(rel_path).exists()
    }

    /// Task note under the default task folder.
    pub fn write_task(&self, name: &str, contents: &str) -> PathBuf {
        self.write_file(&task_path(name), contents)
    }

    pub fn write_log(&self, year: i32, month: u32, log: &Value) {
        let rel = format!("TaskChute/Log/{year:04}-{month:02}-tasks.json");
        self.write_file(&rel, &serde_json::to_string_pretty(log).expect("log json"));
    }

    pub fn read_log(&self, year: i32, month: u32) -> Value {
        let rel = format!("TaskChute/Log/{year:04}-{month:02}-tasks.json");
        serde_json::from_str(&self.read_file(&rel)).expect("log parses")
    }

    /// Write one key of the engine's state store.
    pub fn write_state(&self, key: &str, value: &Value) {
        let rel = format!(".dayplan/state/{key}.json");
        self.write_file(&rel, &serde_json::to_string_pretty(value).expect("state json"));
    }

    pub fn read_state(&self, key: &str) -> Option<Value> {
        let path = self.dir.path().join(".dayplan/state").join(format!("{key}.json"));
        fs::read_to_string(path)
            .ok()
            .map(|raw| serde_json::from_str(&raw).expect("state parses"))
    }

    pub fn write_aliases(&self, aliases: &Value) {
        self.write_file(
            ".dayplan/aliases.json",
            &serde_json::to_string_pretty(aliases).expect("aliases json"),
        );
    }

    /// One reconciliation pass against the on-disk vault.
    pub async fn reconcile(&self, date: NaiveDate) -> ReconcileOutcome {
        self.reconcile_at(date, day_after(date)).await
    }

    pub async fn reconcile_at(&self, date: NaiveDate, now: NaiveDateTime) -> ReconcileOutcome {
        let storage = self.storage();
        let state = Arc::new(FileStore::new(storage.state_dir()));
        let vault = FsVault::new(storage.clone());
        let log = FileExecutionLog::new(storage.clone());
        let deletions = DeletionStore::new(state.clone());
        let day_state = DayStateStore::new(state);
        let aliases = AliasTable::load(&storage);
        Reconciler::new(&vault, &log, &deletions, &aliases, &day_state)
            .with_options(ReconcileOptions::from_config(&Config::default()))
            .reconcile(date, now)
            .await
    }

    /// The CLI pointed at this vault.
    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("dayplan").expect("binary");
        cmd.arg("--vault").arg(self.dir.path()).env_remove("RUST_LOG");
        cmd
    }
}

pub fn task_path(name: &str) -> String {
    format!("TaskChute/Task/{name}.md")
}

pub fn titles(outcome: &ReconcileOutcome) -> Vec<String> {
    outcome
        .instances
        .iter()
        .map(|instance| instance.title().to_string())
        .collect()
}
