//! Monthly execution logs.
//!
//! One JSON document per month at `<log_folder>/<YYYY-MM>-tasks.json`:
//!
//! ```json
//! {
//!   "metadata": { "lastUpdated": "..." },
//!   "dailySummary": { "2024-01-15": { "totalTasks": 2, "completedTasks": 2, "totalMinutes": 45 } },
//!   "taskExecutions": { "2024-01-15": [ { "instanceId": "...", "taskTitle": "Walk", ... } ] },
//!   "patterns": {}
//! }
//! ```
//!
//! Fields this crate does not know about are carried through rewrites.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::fields::parse_clock;
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::storage::Storage;

/// One recorded execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub task_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionEntry {
    pub fn start(&self) -> Option<NaiveTime> {
        self.start_time.as_deref().and_then(parse_log_time)
    }

    pub fn stop(&self) -> Option<NaiveTime> {
        self.stop_time.as_deref().and_then(parse_log_time)
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        let minutes = (self.stop()? - self.start()?).num_minutes();
        Some(if minutes < 0 { minutes + 24 * 60 } else { minutes })
    }
}

/// Clock part of a logged time: `HH:mm[:ss]` or an ISO-8601 timestamp.
pub fn parse_log_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    parse_clock(raw)
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.time()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.time())
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyLog {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub daily_summary: BTreeMap<String, Map<String, Value>>,
    #[serde(default)]
    pub task_executions: BTreeMap<String, Vec<ExecutionEntry>>,
    #[serde(default)]
    pub patterns: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MonthlyLog {
    pub fn entries(&self, date: NaiveDate) -> &[ExecutionEntry] {
        self.task_executions
            .get(&date_key(date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the entry with the same `instanceId`, else append.
    pub fn upsert(&mut self, date: NaiveDate, entry: ExecutionEntry) {
        let entries = self.task_executions.entry(date_key(date)).or_default();
        let existing = entry.instance_id.as_ref().and_then(|id| {
            entries
                .iter()
                .position(|e| e.instance_id.as_ref() == Some(id))
        });
        match existing {
            Some(index) => entries[index] = entry,
            None => entries.push(entry),
        }
        self.refresh_summary(date);
    }

    /// Drop the entry with `instance_id`; `false` when none matched.
    pub fn remove(&mut self, date: NaiveDate, instance_id: &str) -> bool {
        let key = date_key(date);
        let Some(entries) = self.task_executions.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.instance_id.as_deref() != Some(instance_id));
        let removed = entries.len() != before;
        if removed {
            self.refresh_summary(date);
        }
        removed
    }

    /// Recompute the day's totals, keeping any other summary fields.
    pub fn refresh_summary(&mut self, date: NaiveDate) {
        let key = date_key(date);
        let entries = self.task_executions.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let completed = entries.iter().filter(|e| e.stop_time.is_some()).count();
        let minutes: i64 = entries.iter().filter_map(ExecutionEntry::duration_minutes).sum();

        let summary = self.daily_summary.entry(key).or_default();
        summary.insert("totalTasks".to_string(), Value::from(entries.len()));
        summary.insert("completedTasks".to_string(), Value::from(completed));
        summary.insert("totalMinutes".to_string(), Value::from(minutes));
        self.metadata.insert(
            "lastUpdated".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[allow(async_fn_in_trait)]
pub trait ExecutionLog {
    /// The date's entries in log order. Missing or corrupt logs give none.
    async fn entries_for(&self, date: NaiveDate) -> Vec<ExecutionEntry>;
}

// =============================================================================
// File-backed log
// =============================================================================

#[derive(Debug, Clone)]
pub struct FileExecutionLog {
    storage: Storage,
}

impl FileExecutionLog {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Read one month; a missing or unreadable document is an empty log.
    pub fn load_month(&self, year: i32, month: u32) -> MonthlyLog {
        let path = self.storage.monthly_log_file(year, month);
        match self.storage.read_json_opt::<MonthlyLog>(&path) {
            Ok(Some(log)) => log,
            Ok(None) => MonthlyLog::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "execution log unreadable, treating as empty");
                MonthlyLog::default()
            }
        }
    }

    /// Read-modify-write of the month holding `date` under the log's lock.
    ///
    /// An existing document that cannot be parsed is left alone and the
    /// write fails instead of replacing it.
    pub fn modify<T>(&self, date: NaiveDate, edit: impl FnOnce(&mut MonthlyLog) -> T) -> Result<T> {
        let path = self.storage.monthly_log_file(date.year(), date.month());
        let _lock = FileLock::acquire(lock::lock_path_for(&path), DEFAULT_LOCK_TIMEOUT_MS)?;
        let mut log = self
            .storage
            .read_json_opt::<MonthlyLog>(&path)
            .map_err(|err| {
                Error::OperationFailed(format!(
                    "execution log {} is unreadable: {err}",
                    path.display()
                ))
            })?
            .unwrap_or_default();
        let result = edit(&mut log);
        let json = serde_json::to_string_pretty(&log)?;
        lock::write_atomic(&path, json.as_bytes())?;
        Ok(result)
    }

    pub fn upsert(&self, date: NaiveDate, entry: ExecutionEntry) -> Result<()> {
        tracing::debug!(date = %date, title = %entry.task_title, "recording execution");
        self.modify(date, |log| log.upsert(date, entry))
    }

    pub fn remove(&self, date: NaiveDate, instance_id: &str) -> Result<bool> {
        self.modify(date, |log| log.remove(date, instance_id))
    }
}

impl ExecutionLog for FileExecutionLog {
    async fn entries_for(&self, date: NaiveDate) -> Vec<ExecutionEntry> {
        let path = self.storage.monthly_log_file(date.year(), date.month());
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "execution log unreadable");
                return Vec::new();
            }
        };
        match serde_json::from_str::<MonthlyLog>(&content) {
            Ok(log) => log.entries(date).to_vec(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "corrupt execution log, treating as empty");
                Vec::new()
            }
        }
    }
}

// =============================================================================
// In-memory log
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryExecutionLog {
    entries: RwLock<BTreeMap<NaiveDate, Vec<ExecutionEntry>>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, date: NaiveDate, entry: ExecutionEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.entry(date).or_default().push(entry);
        }
    }
}

impl ExecutionLog for MemoryExecutionLog {
    async fn entries_for(&self, date: NaiveDate) -> Vec<ExecutionEntry> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&date).cloned())
            .unwrap_or_default()
    }
}
