//! Per-date deletion and hide records.
//!
//! Three sources decide whether an instance is gone:
//!
//! - `deleted-instances-<date>`: structured records, temporary or permanent
//! - `hidden-routines-<date>`: routines hidden for one day, file untouched
//! - `deleted-tasks`: the legacy global list of bare paths, always permanent
//!
//! The two deletion generations are read through [`Removal`], so callers
//! never branch on where a record came from.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::daystate::rekey_idle;
use crate::error::Result;
use crate::execlog::date_key;
use crate::fields::parse_date;
use crate::storage::{load_or_default, save_typed, KeyValueStore};
use crate::vault::FileStamp;

pub const DELETED_PREFIX: &str = "deleted-instances-";
pub const HIDDEN_PREFIX: &str = "hidden-routines-";
pub const LEGACY_DELETED_KEY: &str = "deleted-tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionType {
    #[default]
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRecord {
    pub path: String,
    /// `None` is a blanket match on `path`
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub deletion_type: DeletionType,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl DeletionRecord {
    pub fn temporary(path: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            instance_id: Some(instance_id.into()),
            deletion_type: DeletionType::Temporary,
            deleted_at: Some(Utc::now().timestamp_millis()),
        }
    }

    pub fn permanent(path: impl Into<String>, instance_id: Option<String>) -> Self {
        Self {
            path: path.into(),
            instance_id,
            deletion_type: DeletionType::Permanent,
            deleted_at: Some(Utc::now().timestamp_millis()),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.deletion_type == DeletionType::Permanent
    }

    /// True when the file at `path` was created after this record.
    /// Records without a timestamp predate every file.
    fn predates(&self, created: Option<DateTime<Utc>>) -> bool {
        match (self.deleted_at, created) {
            (Some(deleted_at), Some(created)) => deleted_at < created.timestamp_millis(),
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenRecord {
    pub path: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl HiddenRecord {
    pub fn routine(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            instance_id: None,
        }
    }
}

/// Hidden entries as stored: a record or an older bare path string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StoredHidden {
    Record(HiddenRecord),
    Path(String),
}

impl From<StoredHidden> for HiddenRecord {
    fn from(stored: StoredHidden) -> Self {
        match stored {
            StoredHidden::Record(record) => record,
            StoredHidden::Path(path) => HiddenRecord::routine(path),
        }
    }
}

/// One deletion, whichever generation it came from.
#[derive(Debug, Clone, Copy)]
pub enum Removal<'a> {
    LegacyPath(&'a str),
    Record(&'a DeletionRecord),
}

impl Removal<'_> {
    /// Exact instance match, or a path match against a blanket record.
    pub fn matches(&self, instance_id: &str, path: &str) -> bool {
        match self {
            Removal::LegacyPath(legacy) => *legacy == path,
            Removal::Record(record) => match &record.instance_id {
                Some(id) => id == instance_id,
                None => record.path == path,
            },
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Removal::LegacyPath(path) => path,
            Removal::Record(record) => &record.path,
        }
    }

    pub fn is_permanent(&self) -> bool {
        match self {
            Removal::LegacyPath(_) => true,
            Removal::Record(record) => record.is_permanent(),
        }
    }

    /// Does this removal still hold for a file created at `created`?
    fn outlives(&self, created: Option<DateTime<Utc>>) -> bool {
        match self {
            Removal::LegacyPath(_) => true,
            Removal::Record(record) => !record.predates(created),
        }
    }
}

/// Everything that can remove an instance on one date, loaded once per pass.
#[derive(Debug, Clone, Default)]
pub struct DayDeletions {
    pub date_records: Vec<DeletionRecord>,
    pub hidden: Vec<HiddenRecord>,
    pub legacy: Vec<String>,
    /// Permanent records from this date and every earlier one
    pub permanent_history: Vec<DeletionRecord>,
}

impl DayDeletions {
    fn removals(&self) -> impl Iterator<Item = Removal<'_>> {
        self.legacy
            .iter()
            .map(|path| Removal::LegacyPath(path))
            .chain(self.date_records.iter().map(Removal::Record))
    }

    pub fn is_deleted(&self, instance_id: &str, path: &str) -> bool {
        self.removals().any(|removal| removal.matches(instance_id, path))
    }

    pub fn is_hidden(&self, instance_id: &str, path: &str) -> bool {
        self.hidden.iter().any(|hidden| match &hidden.instance_id {
            Some(id) => id == instance_id,
            None => hidden.path == path,
        })
    }

    /// Whether a file-based idle instance for `path` stays suppressed.
    ///
    /// Same-date matches always apply. Permanent deletions from earlier dates
    /// apply until the file is recreated after them.
    pub fn suppresses_idle(
        &self,
        instance_id: &str,
        path: &str,
        created: Option<DateTime<Utc>>,
    ) -> bool {
        if self.is_deleted(instance_id, path) || self.is_hidden(instance_id, path) {
            return true;
        }
        self.permanent_history
            .iter()
            .map(Removal::Record)
            .any(|removal| removal.path() == path && removal.outlives(created))
    }
}

/// Deletion state over an injected key-value store
#[derive(Clone)]
pub struct DeletionStore {
    store: Arc<dyn KeyValueStore>,
}

impl DeletionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn deleted_key(date: NaiveDate) -> String {
        format!("{DELETED_PREFIX}{}", date_key(date))
    }

    fn hidden_key(date: NaiveDate) -> String {
        format!("{HIDDEN_PREFIX}{}", date_key(date))
    }

    pub fn deleted_records(&self, date: NaiveDate) -> Vec<DeletionRecord> {
        load_or_default(self.store.as_ref(), &Self::deleted_key(date))
    }

    pub fn hidden_records(&self, date: NaiveDate) -> Vec<HiddenRecord> {
        let stored: Vec<StoredHidden> = load_or_default(self.store.as_ref(), &Self::hidden_key(date));
        stored.into_iter().map(HiddenRecord::from).collect()
    }

    pub fn legacy_paths(&self) -> Vec<String> {
        load_or_default(self.store.as_ref(), LEGACY_DELETED_KEY)
    }

    /// Snapshot of every source relevant to `date`.
    pub fn load_day(&self, date: NaiveDate) -> DayDeletions {
        let keys = self.store.keys_with_prefix(DELETED_PREFIX).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "cannot list deletion keys");
            Vec::new()
        });
        let permanent_history = keys
            .iter()
            .filter(|key| {
                key.strip_prefix(DELETED_PREFIX)
                    .and_then(parse_date)
                    .is_some_and(|recorded| recorded <= date)
            })
            .flat_map(|key| load_or_default::<Vec<DeletionRecord>>(self.store.as_ref(), key))
            .filter(DeletionRecord::is_permanent)
            .collect();

        DayDeletions {
            date_records: self.deleted_records(date),
            hidden: self.hidden_records(date),
            legacy: self.legacy_paths(),
            permanent_history,
        }
    }

    pub fn is_deleted(&self, instance_id: &str, path: &str, date: NaiveDate) -> bool {
        self.load_day(date).is_deleted(instance_id, path)
    }

    pub fn is_hidden(&self, instance_id: &str, path: &str, date: NaiveDate) -> bool {
        self.load_day(date).is_hidden(instance_id, path)
    }

    /// Append records to the date's list; a record for the same instance
    /// and path replaces the older one.
    pub fn record(&self, date: NaiveDate, entries: &[DeletionRecord]) -> Result<()> {
        let mut records = self.deleted_records(date);
        for entry in entries {
            records.retain(|existing| {
                !(existing.path == entry.path && existing.instance_id == entry.instance_id)
            });
            records.push(entry.clone());
        }
        tracing::debug!(date = %date, added = entries.len(), "recording deletions");
        save_typed(self.store.as_ref(), &Self::deleted_key(date), &records)
    }

    pub fn record_hidden(&self, date: NaiveDate, entry: HiddenRecord) -> Result<()> {
        let mut hidden = self.hidden_records(date);
        if !hidden.contains(&entry) {
            hidden.push(entry);
        }
        save_typed(self.store.as_ref(), &Self::hidden_key(date), &hidden)
    }

    /// Carry per-day temporary deletions and hides over to a renamed file.
    /// Permanent deletions stay with the path they removed.
    pub fn rename_path(&self, old: &str, new: &str) -> Result<()> {
        for date in self.dated_keys(DELETED_PREFIX)? {
            let mut records = self.deleted_records(date);
            let mut touched = false;
            for record in records
                .iter_mut()
                .filter(|record| record.path == old && !record.is_permanent())
            {
                if let Some(id) = record.instance_id.as_mut() {
                    rekey_idle(id, old, new, date);
                }
                record.path = new.to_string();
                touched = true;
            }
            if touched {
                save_typed(self.store.as_ref(), &Self::deleted_key(date), &records)?;
            }
        }

        for date in self.dated_keys(HIDDEN_PREFIX)? {
            let mut hidden = self.hidden_records(date);
            let mut touched = false;
            for record in hidden.iter_mut().filter(|record| record.path == old) {
                if let Some(id) = record.instance_id.as_mut() {
                    rekey_idle(id, old, new, date);
                }
                record.path = new.to_string();
                touched = true;
            }
            if touched {
                save_typed(self.store.as_ref(), &Self::hidden_key(date), &hidden)?;
            }
        }
        Ok(())
    }

    fn dated_keys(&self, prefix: &str) -> Result<Vec<NaiveDate>> {
        Ok(self
            .store
            .keys_with_prefix(prefix)?
            .iter()
            .filter_map(|key| key.strip_prefix(prefix).and_then(parse_date))
            .collect())
    }

    /// Drop permanent records whose file exists again and was created after
    /// the deletion. Returns how many were pruned.
    pub fn cleanup_stale<F>(&self, date: NaiveDate, stat: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<FileStamp>,
    {
        let records = self.deleted_records(date);
        let before = records.len();
        let kept: Vec<DeletionRecord> = records
            .into_iter()
            .filter(|record| {
                if !record.is_permanent() {
                    return true;
                }
                match stat(&record.path) {
                    Some(stamp) if record.predates(stamp.created) => {
                        tracing::debug!(path = %record.path, date = %date, "file recreated, pruning deletion");
                        false
                    }
                    _ => true,
                }
            })
            .collect();

        let pruned = before - kept.len();
        if pruned > 0 {
            save_typed(self.store.as_ref(), &Self::deleted_key(date), &kept)?;
        }
        Ok(pruned)
    }
}
