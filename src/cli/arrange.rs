//! dayplan move / duplicate command implementations

use serde::Serialize;
use ulid::Ulid;

use crate::daystate::DuplicateRecord;
use crate::error::Result;
use crate::ordering::move_instance;
use crate::output::{emit_success, HumanOutput};
use crate::slot::SlotKey;

use super::{find_instance, Session};

#[derive(Serialize)]
struct MoveReport {
    instance_id: String,
    slot_key: SlotKey,
    order: i64,
    normalized: bool,
}

pub async fn run_move(session: &Session, needle: &str, slot: &str, index: usize) -> Result<()> {
    let target: SlotKey = slot.parse()?;
    let outcome = session.reconcile().await;
    let instance_id = find_instance(&outcome.instances, needle)?.instance_id.clone();

    let mut instances = outcome.instances;
    let moved = move_instance(&mut instances, &instance_id, target, index)?;
    session.day_state.save_positions(session.date, &instances)?;

    let mut human = HumanOutput::new("Moved");
    if let Some(instance) = instances.iter().find(|i| i.instance_id == instance_id) {
        human = HumanOutput::new(format!("Moved {}", instance.title()));
        if instance.task.is_routine && !instance.task.is_virtual() {
            // Routines keep their new slot on later days.
            session
                .day_state
                .set_slot_override(instance.path(), target)?;
        }
    }
    human.push_summary("slot", target.to_string());
    human.push_summary("order", moved.order.to_string());
    if moved.normalized {
        human.push_detail(format!("renumbered {target} to make room"));
    }

    let report = MoveReport {
        instance_id,
        slot_key: target,
        order: moved.order,
        normalized: moved.normalized,
    };
    emit_success(session.output, "move", &report, Some(&human))
}

pub async fn run_duplicate(session: &Session, needle: &str) -> Result<()> {
    let (_, original) = session.instance(needle).await?;
    let record = DuplicateRecord {
        instance_id: Ulid::new().to_string(),
        path: original.path().to_string(),
        slot_key: original.slot_key,
        original_instance_id: Some(original.instance_id.clone()),
    };
    session.day_state.add_duplicate(session.date, record.clone())?;

    let mut human = HumanOutput::new(format!("Duplicated {}", original.title()));
    human.push_summary("instance", record.instance_id.clone());
    human.push_summary("slot", record.slot_key.to_string());
    emit_success(session.output, "duplicate", &record, Some(&human))
}
