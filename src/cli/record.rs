//! dayplan start / done command implementations
//!
//! Starting writes a running-task record; finishing writes the execution
//! into the monthly log and clears the running record.

use chrono::NaiveTime;
use serde::Serialize;

use crate::daystate::RunningRecord;
use crate::error::{Error, Result};
use crate::execlog::{date_key, ExecutionEntry};
use crate::fields::parse_clock;
use crate::model::InstanceState;
use crate::output::{emit_success, HumanOutput};
use crate::slot::SlotKey;

use super::Session;

pub struct DoneOptions {
    pub instance: String,
    pub start: Option<String>,
    pub stop: Option<String>,
}

#[derive(Serialize)]
struct RecordReport {
    instance_id: String,
    title: String,
    state: InstanceState,
    slot_key: SlotKey,
    start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_time: Option<String>,
}

fn clock_arg(raw: &str, flag: &str) -> Result<NaiveTime> {
    parse_clock(raw)
        .ok_or_else(|| Error::InvalidArgument(format!("{flag} '{raw}' is not HH:MM")))
}

fn wire_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub async fn run_start(session: &Session, needle: &str) -> Result<()> {
    let (_, instance) = session.instance(needle).await?;
    if instance.state != InstanceState::Idle {
        return Err(Error::InvalidArgument(format!(
            "{} is already {}",
            instance.title(),
            if instance.state == InstanceState::Done { "done" } else { "running" }
        )));
    }

    let start = session.now.time();
    let slot = if session.date == session.now.date() {
        SlotKey::for_time(start)
    } else {
        instance.slot_key
    };
    session.day_state.start_running(RunningRecord {
        date: date_key(session.date),
        instance_id: instance.instance_id.clone(),
        task_title: instance.title().to_string(),
        task_path: instance.path().to_string(),
        slot_key: slot,
        start_time: wire_time(start),
    })?;

    let report = RecordReport {
        instance_id: instance.instance_id.clone(),
        title: instance.title().to_string(),
        state: InstanceState::Running,
        slot_key: slot,
        start_time: wire_time(start),
        stop_time: None,
    };
    let mut human = HumanOutput::new(format!("Started {}", report.title));
    human.push_summary("start", report.start_time.clone());
    human.push_summary("slot", slot.to_string());
    emit_success(session.output, "start", &report, Some(&human))
}

pub async fn run_done(session: &Session, options: DoneOptions) -> Result<()> {
    let (_, instance) = session.instance(&options.instance).await?;
    if instance.state == InstanceState::Done && options.start.is_none() && options.stop.is_none() {
        return Err(Error::InvalidArgument(format!(
            "{} is already done; pass --start/--stop to correct its times",
            instance.title()
        )));
    }

    let now = session.now.time();
    let start = match options.start.as_deref() {
        Some(raw) => clock_arg(raw, "--start")?,
        None => instance.start_time.unwrap_or(now),
    };
    let stop = match options.stop.as_deref() {
        Some(raw) => clock_arg(raw, "--stop")?,
        None => instance.stop_time.unwrap_or(now),
    };
    let slot = match instance.slot_key {
        SlotKey::None => SlotKey::for_time(start),
        slot => slot,
    };

    let task = &instance.task;
    let entry = ExecutionEntry {
        instance_id: Some(instance.instance_id.clone()),
        task_title: instance.title().to_string(),
        start_time: Some(wire_time(start)),
        stop_time: Some(wire_time(stop)),
        slot_key: Some(slot.to_string()),
        project: task.project.as_ref().map(|p| format!("[[{}]]", p.title)),
        task_type: Some(if task.is_routine { "routine" } else { "simple" }.to_string()),
        ..Default::default()
    };
    session.log.upsert(session.date, entry)?;
    if let Err(err) = session.day_state.stop_running(&instance.instance_id) {
        tracing::warn!(instance_id = %instance.instance_id, error = %err, "running record not cleared");
    }

    let report = RecordReport {
        instance_id: instance.instance_id.clone(),
        title: instance.title().to_string(),
        state: InstanceState::Done,
        slot_key: slot,
        start_time: wire_time(start),
        stop_time: Some(wire_time(stop)),
    };
    let mut human = HumanOutput::new(format!("Recorded {}", report.title));
    human.push_summary("time", format!("{}-{}", start.format("%H:%M"), stop.format("%H:%M")));
    human.push_summary("slot", slot.to_string());
    emit_success(session.output, "done", &report, Some(&human))
}
