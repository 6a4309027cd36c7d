//! Task definitions and per-date instances.
//!
//! Both are views rebuilt on every reconciliation pass. A definition is
//! immutable once built and shared by its instances through `Arc`.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveTime;
use serde::{Serialize, Serializer};

use crate::recurrence::Recurrence;
use crate::slot::SlotKey;
use crate::vault::TaskFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Idle,
    Running,
    Done,
}

impl InstanceState {
    /// Sort rank inside a slot: done, then running, then idle.
    pub fn rank(self) -> u8 {
        match self {
            InstanceState::Done => 0,
            InstanceState::Running => 1,
            InstanceState::Idle => 2,
        }
    }

    pub fn is_idle(self) -> bool {
        self == InstanceState::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectLink {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    pub title: String,
    pub path: String,
    #[serde(skip)]
    pub backing_file: Option<TaskFile>,
    pub is_routine: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_clock_opt"
    )]
    pub scheduled_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_name: Option<String>,
}

impl TaskDefinition {
    /// Definition reconstructed purely from log history.
    pub fn virtual_task(title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            path: path.into(),
            backing_file: None,
            is_routine: false,
            recurrence: None,
            scheduled_time: None,
            project: None,
            current_name: None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.backing_file.is_none()
    }

    /// Name this task answers to today.
    pub fn display_name(&self) -> &str {
        self.current_name.as_deref().unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub instance_id: String,
    #[serde(rename = "task", serialize_with = "serialize_task_ref")]
    pub task: Arc<TaskDefinition>,
    pub state: InstanceState,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_clock_opt"
    )]
    pub start_time: Option<NaiveTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_clock_opt"
    )]
    pub stop_time: Option<NaiveTime>,
    pub slot_key: SlotKey,
    pub order: i64,
    pub manually_positioned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_title: Option<String>,
}

impl TaskInstance {
    pub fn idle(task: Arc<TaskDefinition>, instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            task,
            state: InstanceState::Idle,
            start_time: None,
            stop_time: None,
            slot_key: SlotKey::None,
            order: 0,
            manually_positioned: false,
            executed_title: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.task.path
    }

    /// Title shown for this instance: executed name for history, else current.
    pub fn title(&self) -> &str {
        self.executed_title
            .as_deref()
            .unwrap_or_else(|| self.task.display_name())
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        let (start, stop) = (self.start_time?, self.stop_time?);
        let minutes = (stop - start).num_minutes();
        // Crossing midnight.
        Some(if minutes < 0 { minutes + 24 * 60 } else { minutes })
    }
}

/// Within-slot comparator: state rank, then order key for idle instances,
/// then start/stop time for executed ones, then id for a total order.
pub fn compare_in_slot(a: &TaskInstance, b: &TaskInstance) -> Ordering {
    a.state
        .rank()
        .cmp(&b.state.rank())
        .then_with(|| {
            if a.state.is_idle() {
                a.order.cmp(&b.order)
            } else {
                a.start_time
                    .cmp(&b.start_time)
                    .then_with(|| a.stop_time.cmp(&b.stop_time))
            }
        })
        .then_with(|| a.instance_id.cmp(&b.instance_id))
}

fn serialize_clock_opt<S: Serializer>(
    value: &Option<NaiveTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(time) => serializer.serialize_str(&time.format("%H:%M:%S").to_string()),
        None => serializer.serialize_none(),
    }
}

fn serialize_task_ref<S: Serializer>(
    task: &Arc<TaskDefinition>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&task.path)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn done_before_running_before_idle() {
        let mut list = vec![
            idle("i", SlotKey::Morning, -500),
            running("r", SlotKey::Morning, "10:00"),
            done("d", SlotKey::Morning, "11:00", "11:30"),
        ];
        list.sort_by(compare_in_slot);
        let ids: Vec<_> = list.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "r", "i"]);
    }

    #[test]
    fn executed_sort_by_start_then_stop() {
        let mut list = vec![
            done("late", SlotKey::Morning, "09:00", "10:00"),
            done("early", SlotKey::Morning, "09:00", "09:15"),
            done("first", SlotKey::Morning, "08:30", "11:00"),
        ];
        list.sort_by(compare_in_slot);
        let ids: Vec<_> = list.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "early", "late"]);
    }

    #[test]
    fn virtual_follows_backing_file() {
        let def = TaskDefinition::virtual_task("Ghost", "Task/Ghost.md");
        assert!(def.is_virtual());
        let mut real = def.clone();
        real.backing_file = Some(TaskFile {
            path: "Task/Ghost.md".to_string(),
            basename: "Ghost".to_string(),
            created: None,
        });
        assert!(!real.is_virtual());
    }

    #[test]
    fn duration_wraps_midnight() {
        let instance = done("d", SlotKey::Evening, "23:30", "00:15");
        assert_eq!(instance.duration_minutes(), Some(45));
    }

    #[test]
    fn executed_title_shadows_current_name() {
        let mut instance = idle("x", SlotKey::None, 0);
        assert_eq!(instance.title(), "x");
        instance.executed_title = Some("Old name".to_string());
        assert_eq!(instance.title(), "Old name");
    }
}
