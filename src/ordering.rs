//! Order keys and placement inside time slots.
//!
//! Idle instances carry integer order keys spaced by [`ORDER_STEP`]. A move
//! takes the midpoint of its neighbours; when two neighbours are adjacent
//! the slot is renumbered first. Executed instances are ordered by their
//! times and always stay above idle ones.

use crate::error::{Error, Result};
use crate::model::{compare_in_slot, TaskInstance};
use crate::slot::SlotKey;

pub const ORDER_STEP: i64 = 100;

/// Slots in day order, then the within-slot comparator.
pub fn sort_instances(instances: &mut [TaskInstance]) {
    instances.sort_by(|a, b| {
        a.slot_key
            .cmp(&b.slot_key)
            .then_with(|| compare_in_slot(a, b))
    });
}

/// Order key for an item inserted at `target_index` among `siblings`.
///
/// `None` when the neighbours are too close for an integer midpoint; the
/// caller renumbers the slot and asks again.
pub fn calculate_order(target_index: usize, siblings: &[i64]) -> Option<i64> {
    let mut sorted = siblings.to_vec();
    sorted.sort_unstable();

    let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
        return Some(ORDER_STEP);
    };
    if target_index == 0 {
        return Some(first - ORDER_STEP);
    }
    if target_index >= sorted.len() {
        return Some(last + ORDER_STEP);
    }

    let (prev, next) = (sorted[target_index - 1], sorted[target_index]);
    if next - prev <= 1 {
        return None;
    }
    Some(prev + (next - prev) / 2)
}

/// Renumber the idle instances of `slot` to 100, 200, ... in sort order.
/// Returns how many were renumbered.
pub fn normalize_slot(instances: &mut [TaskInstance], slot: SlotKey) -> usize {
    let mut idle: Vec<usize> = (0..instances.len())
        .filter(|&i| instances[i].slot_key == slot && instances[i].state.is_idle())
        .collect();
    idle.sort_by(|&a, &b| compare_in_slot(&instances[a], &instances[b]));
    renumber(instances, &idle);
    idle.len()
}

fn renumber(instances: &mut [TaskInstance], indices: &[usize]) {
    for (position, &index) in indices.iter().enumerate() {
        instances[index].order = (position as i64 + 1) * ORDER_STEP;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub order: i64,
    /// The target slot was renumbered to make room
    pub normalized: bool,
}

/// Place an idle instance at `target_index` of `target_slot`.
///
/// `target_index` counts every instance already in the slot, executed ones
/// included. A placement that would leave a done or running instance below
/// the moved one is rejected and nothing changes.
pub fn move_instance(
    instances: &mut Vec<TaskInstance>,
    instance_id: &str,
    target_slot: SlotKey,
    target_index: usize,
) -> Result<MoveOutcome> {
    let moving = instances
        .iter()
        .position(|instance| instance.instance_id == instance_id)
        .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))?;
    if !instances[moving].state.is_idle() {
        return Err(Error::MoveRejected(format!(
            "{instance_id} has already run; only idle instances can be reordered"
        )));
    }

    let mut others: Vec<usize> = (0..instances.len())
        .filter(|&i| i != moving && instances[i].slot_key == target_slot)
        .collect();
    others.sort_by(|&a, &b| compare_in_slot(&instances[a], &instances[b]));

    let executed = others
        .iter()
        .take_while(|&&i| !instances[i].state.is_idle())
        .count();
    let target_index = target_index.min(others.len());
    if target_index < executed {
        return Err(Error::MoveRejected(format!(
            "{instance_id} cannot go above executed work in {target_slot}"
        )));
    }

    let idle_siblings = &others[executed..];
    let idle_index = target_index - executed;
    let orders: Vec<i64> = idle_siblings.iter().map(|&i| instances[i].order).collect();

    let (order, normalized) = match calculate_order(idle_index, &orders) {
        Some(order) => (order, false),
        None => {
            tracing::debug!(slot = %target_slot, "order keys exhausted, renumbering slot");
            let idle_siblings = idle_siblings.to_vec();
            renumber(instances, &idle_siblings);
            let orders: Vec<i64> = idle_siblings.iter().map(|&i| instances[i].order).collect();
            let order = calculate_order(idle_index, &orders).ok_or_else(|| {
                Error::OperationFailed(format!("no order key available in {target_slot}"))
            })?;
            (order, true)
        }
    };

    let instance = &mut instances[moving];
    instance.slot_key = target_slot;
    instance.order = order;
    instance.manually_positioned = true;
    sort_instances(instances);
    Ok(MoveOutcome { order, normalized })
}
