//! dayplan show command implementation

use chrono::NaiveTime;

use crate::error::Result;
use crate::model::{InstanceState, TaskInstance};
use crate::output::{emit_success, HumanOutput};

use super::Session;

pub async fn run(session: &Session) -> Result<()> {
    let outcome = session.reconcile().await;

    let mut human = HumanOutput::new(format!("Day plan for {}", outcome.date));
    let done = outcome
        .instances
        .iter()
        .filter(|i| i.state == InstanceState::Done)
        .count();
    human.push_summary("instances", outcome.instances.len().to_string());
    human.push_summary("done", done.to_string());
    human.push_summary("tasks", outcome.tasks.len().to_string());
    for instance in &outcome.instances {
        human.push_item(instance.slot_key.as_str(), describe(instance));
    }
    if outcome.instances.is_empty() {
        human.push_next_step("add routine notes to the task folder, or pick another --date");
    }

    emit_success(session.output, "show", &outcome, Some(&human))
}

pub(crate) fn describe(instance: &TaskInstance) -> String {
    let state = match instance.state {
        InstanceState::Done => "done",
        InstanceState::Running => "running",
        InstanceState::Idle => "idle",
    };
    let times = match (instance.start_time, instance.stop_time) {
        (Some(start), Some(stop)) => format!("{}-{}", clock(start), clock(stop)),
        (Some(start), None) => format!("{}-", clock(start)),
        _ => instance
            .task
            .scheduled_time
            .map(|time| format!("@{}", clock(time)))
            .unwrap_or_default(),
    };
    let short_id: String = instance.instance_id.chars().take(8).collect();
    format!(
        "{:<7} {:<11} {} ({})",
        state,
        times,
        instance.title(),
        short_id
    )
}

fn clock(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::{done, idle};
    use crate::slot::SlotKey;

    #[test]
    fn describes_executed_and_idle_lines() {
        let line = describe(&done("0123456789", SlotKey::Morning, "09:00", "09:30"));
        assert_eq!(line, "done    09:00-09:30 0123456789 (01234567)");

        let line = describe(&idle("walk", SlotKey::None, 100));
        assert!(line.starts_with("idle "));
        assert!(line.ends_with("walk (walk)"));
    }
}
