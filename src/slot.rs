//! Fixed day partition and elapsed-slot migration.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{InstanceState, TaskInstance};

/// One of the four day buckets, or `none` for unscheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKey {
    #[serde(rename = "0:00-8:00")]
    Night,
    #[serde(rename = "8:00-12:00")]
    Morning,
    #[serde(rename = "12:00-16:00")]
    Afternoon,
    #[serde(rename = "16:00-0:00")]
    Evening,
    #[serde(rename = "none")]
    None,
}

impl SlotKey {
    pub const DAY: [SlotKey; 4] = [
        SlotKey::Night,
        SlotKey::Morning,
        SlotKey::Afternoon,
        SlotKey::Evening,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlotKey::Night => "0:00-8:00",
            SlotKey::Morning => "8:00-12:00",
            SlotKey::Afternoon => "12:00-16:00",
            SlotKey::Evening => "16:00-0:00",
            SlotKey::None => "none",
        }
    }

    /// Minutes after midnight at which the bucket opens; `None` has no start.
    pub fn start_minutes(self) -> Option<u32> {
        match self {
            SlotKey::Night => Some(0),
            SlotKey::Morning => Some(8 * 60),
            SlotKey::Afternoon => Some(12 * 60),
            SlotKey::Evening => Some(16 * 60),
            SlotKey::None => None,
        }
    }

    /// Bucket containing a clock time.
    pub fn for_time(time: NaiveTime) -> SlotKey {
        match time.hour() {
            0..=7 => SlotKey::Night,
            8..=11 => SlotKey::Morning,
            12..=15 => SlotKey::Afternoon,
            _ => SlotKey::Evening,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0:00-8:00" => Ok(SlotKey::Night),
            "8:00-12:00" => Ok(SlotKey::Morning),
            "12:00-16:00" => Ok(SlotKey::Afternoon),
            "16:00-0:00" => Ok(SlotKey::Evening),
            "none" | "" => Ok(SlotKey::None),
            other => Err(Error::InvalidArgument(format!(
                "unknown slot '{other}' (expected 0:00-8:00|8:00-12:00|12:00-16:00|16:00-0:00|none)"
            ))),
        }
    }
}

/// Move idle instances from elapsed buckets into `current`.
///
/// Order keys and `manually_positioned` are kept; `none`, current/later
/// buckets and non-idle instances are untouched. Returns how many moved.
pub fn migrate_idle_to_current_slot(instances: &mut [TaskInstance], current: SlotKey) -> usize {
    let Some(current_start) = current.start_minutes() else {
        return 0;
    };
    let mut moved = 0;
    for instance in instances
        .iter_mut()
        .filter(|instance| instance.state == InstanceState::Idle)
    {
        let Some(start) = instance.slot_key.start_minutes() else {
            continue;
        };
        if start < current_start {
            tracing::debug!(
                instance_id = %instance.instance_id,
                from = %instance.slot_key,
                to = %current,
                "migrating elapsed idle instance"
            );
            instance.slot_key = current;
            moved += 1;
        }
    }
    moved
}
