//! Saved day state: positions, duplicates, slot preferences, running tasks.
//!
//! Keys in the injected store:
//!
//! - `task-orders-<date>`: `{instanceId: {slotKey, order, manuallyPositioned}}`
//! - `duplicated-instances-<date>`: `[{instanceId, path, slotKey, originalInstanceId}]`
//! - `slot-overrides`: `{path: slotKey}`, a routine's remembered slot
//! - `running-tasks`: `[{date, instanceId, taskTitle, taskPath, slotKey, startTime}]`

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::execlog::{date_key, parse_log_time};
use crate::fields::parse_date;
use crate::model::TaskInstance;
use crate::reconcile::idle_instance_id;
use crate::slot::SlotKey;
use crate::storage::{load_or_default, save_typed, KeyValueStore};

pub const ORDERS_PREFIX: &str = "task-orders-";
pub const DUPLICATES_PREFIX: &str = "duplicated-instances-";
pub const SLOT_OVERRIDES_KEY: &str = "slot-overrides";
pub const RUNNING_KEY: &str = "running-tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPosition {
    pub slot_key: SlotKey,
    pub order: i64,
    #[serde(default)]
    pub manually_positioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRecord {
    pub instance_id: String,
    pub path: String,
    #[serde(default = "unscheduled")]
    pub slot_key: SlotKey,
    #[serde(default)]
    pub original_instance_id: Option<String>,
}

fn unscheduled() -> SlotKey {
    SlotKey::None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningRecord {
    pub date: String,
    pub instance_id: String,
    pub task_title: String,
    pub task_path: String,
    #[serde(default = "unscheduled")]
    pub slot_key: SlotKey,
    pub start_time: String,
}

impl RunningRecord {
    pub fn start(&self) -> Option<NaiveTime> {
        parse_log_time(&self.start_time)
    }
}

#[derive(Clone)]
pub struct DayStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl DayStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn orders_key(date: NaiveDate) -> String {
        format!("{ORDERS_PREFIX}{}", date_key(date))
    }

    fn duplicates_key(date: NaiveDate) -> String {
        format!("{DUPLICATES_PREFIX}{}", date_key(date))
    }

    // =========================================================================
    // Positions
    // =========================================================================

    pub fn positions(&self, date: NaiveDate) -> BTreeMap<String, SavedPosition> {
        load_or_default(self.store.as_ref(), &Self::orders_key(date))
    }

    /// Remember where every idle instance sits. Executed instances are
    /// placed by their times and are not stored.
    pub fn save_positions(&self, date: NaiveDate, instances: &[TaskInstance]) -> Result<()> {
        let mut positions = self.positions(date);
        for instance in instances {
            if instance.state.is_idle() {
                positions.insert(
                    instance.instance_id.clone(),
                    SavedPosition {
                        slot_key: instance.slot_key,
                        order: instance.order,
                        manually_positioned: instance.manually_positioned,
                    },
                );
            } else {
                positions.remove(&instance.instance_id);
            }
        }
        save_typed(self.store.as_ref(), &Self::orders_key(date), &positions)
    }

    // =========================================================================
    // Duplicates
    // =========================================================================

    pub fn duplicates(&self, date: NaiveDate) -> Vec<DuplicateRecord> {
        load_or_default(self.store.as_ref(), &Self::duplicates_key(date))
    }

    pub fn add_duplicate(&self, date: NaiveDate, record: DuplicateRecord) -> Result<()> {
        let mut duplicates = self.duplicates(date);
        duplicates.retain(|existing| existing.instance_id != record.instance_id);
        duplicates.push(record);
        save_typed(self.store.as_ref(), &Self::duplicates_key(date), &duplicates)
    }

    pub fn remove_duplicate(&self, date: NaiveDate, instance_id: &str) -> Result<bool> {
        let mut duplicates = self.duplicates(date);
        let before = duplicates.len();
        duplicates.retain(|existing| existing.instance_id != instance_id);
        if duplicates.len() == before {
            return Ok(false);
        }
        save_typed(self.store.as_ref(), &Self::duplicates_key(date), &duplicates)?;
        Ok(true)
    }

    // =========================================================================
    // Slot preferences
    // =========================================================================

    pub fn slot_overrides(&self) -> BTreeMap<String, SlotKey> {
        load_or_default(self.store.as_ref(), SLOT_OVERRIDES_KEY)
    }

    pub fn set_slot_override(&self, path: &str, slot: SlotKey) -> Result<()> {
        let mut overrides = self.slot_overrides();
        overrides.insert(path.to_string(), slot);
        save_typed(self.store.as_ref(), SLOT_OVERRIDES_KEY, &overrides)
    }

    // =========================================================================
    // Running tasks
    // =========================================================================

    pub fn running(&self) -> Vec<RunningRecord> {
        load_or_default(self.store.as_ref(), RUNNING_KEY)
    }

    pub fn running_on(&self, date: NaiveDate) -> Vec<RunningRecord> {
        let key = date_key(date);
        self.running()
            .into_iter()
            .filter(|record| record.date == key)
            .collect()
    }

    pub fn start_running(&self, record: RunningRecord) -> Result<()> {
        let mut running = self.running();
        running.retain(|existing| existing.instance_id != record.instance_id);
        running.push(record);
        save_typed(self.store.as_ref(), RUNNING_KEY, &running)
    }

    /// Remove and return the running record for an instance.
    pub fn stop_running(&self, instance_id: &str) -> Result<Option<RunningRecord>> {
        let mut running = self.running();
        let Some(index) = running
            .iter()
            .position(|record| record.instance_id == instance_id)
        else {
            return Ok(None);
        };
        let record = running.remove(index);
        save_typed(self.store.as_ref(), RUNNING_KEY, &running)?;
        Ok(Some(record))
    }

    // =========================================================================
    // Renames
    // =========================================================================

    /// Point path-keyed state at a renamed file. Idle instance ids derive
    /// from the path, so saved positions and running records are rekeyed.
    pub fn rename_path(&self, old: &str, new: &str, new_title: &str) -> Result<()> {
        let mut overrides = self.slot_overrides();
        if let Some(slot) = overrides.remove(old) {
            overrides.insert(new.to_string(), slot);
            save_typed(self.store.as_ref(), SLOT_OVERRIDES_KEY, &overrides)?;
        }

        let mut running = self.running();
        let mut touched = false;
        for record in running.iter_mut().filter(|record| record.task_path == old) {
            if let Some(date) = parse_date(&record.date) {
                rekey_idle(&mut record.instance_id, old, new, date);
            }
            record.task_path = new.to_string();
            record.task_title = new_title.to_string();
            touched = true;
        }
        if touched {
            save_typed(self.store.as_ref(), RUNNING_KEY, &running)?;
        }

        for (key, date) in self.dated_keys(ORDERS_PREFIX)? {
            let mut positions: BTreeMap<String, SavedPosition> =
                load_or_default(self.store.as_ref(), &key);
            if let Some(saved) = positions.remove(&idle_instance_id(old, date)) {
                positions.insert(idle_instance_id(new, date), saved);
                save_typed(self.store.as_ref(), &key, &positions)?;
            }
        }

        for (key, date) in self.dated_keys(DUPLICATES_PREFIX)? {
            let mut duplicates: Vec<DuplicateRecord> = load_or_default(self.store.as_ref(), &key);
            let mut touched = false;
            for record in duplicates.iter_mut().filter(|record| record.path == old) {
                record.path = new.to_string();
                if let Some(original) = record.original_instance_id.as_mut() {
                    rekey_idle(original, old, new, date);
                }
                touched = true;
            }
            if touched {
                save_typed(self.store.as_ref(), &key, &duplicates)?;
            }
        }
        Ok(())
    }

    fn dated_keys(&self, prefix: &str) -> Result<Vec<(String, NaiveDate)>> {
        Ok(self
            .store
            .keys_with_prefix(prefix)?
            .into_iter()
            .filter_map(|key| {
                let date = key.strip_prefix(prefix).and_then(parse_date)?;
                Some((key, date))
            })
            .collect())
    }
}

/// Swap the idle id of `old` on `date` for the one `new` gets.
pub(crate) fn rekey_idle(instance_id: &mut String, old: &str, new: &str, date: NaiveDate) {
    if *instance_id == idle_instance_id(old, date) {
        *instance_id = idle_instance_id(new, date);
    }
}
