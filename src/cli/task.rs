//! dayplan rename / set-time command implementations
//!
//! Both edit task notes in place. Renaming also records the former name in
//! the alias table so logged history keeps resolving to the note.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::fields::{self, parse_clock, Field, FieldTarget};
use crate::frontmatter;
use crate::output::{emit_success, HumanOutput};

use super::Session;

#[derive(Serialize)]
struct RenameReport {
    from: String,
    to: String,
    path: String,
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "'{name}' is not a valid task name"
        )));
    }
    Ok(name.trim_end_matches(".md"))
}

pub async fn run_rename(session: &Session, needle: &str, new_name: &str) -> Result<()> {
    let new_name = validate_name(new_name)?;
    let file = session.task_file(needle).await?;
    if file.basename == new_name {
        return Err(Error::InvalidArgument(format!("{new_name} already has that name")));
    }

    let new_path = match file.path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{new_name}.md"),
        None => format!("{new_name}.md"),
    };
    session.vault.rename_note(&file.path, &new_path)?;

    let mut human = HumanOutput::new(format!("Renamed {} to {new_name}", file.basename));
    let mut aliases = session.aliases.clone();
    aliases.record_rename(&file.basename, new_name);
    if let Err(err) = aliases.save(&session.storage) {
        tracing::warn!(error = %err, "alias table not saved");
        human.push_warning(format!("alias table not saved: {err}"));
    }
    let carried = session
        .day_state
        .rename_path(&file.path, &new_path, new_name)
        .and_then(|()| session.deletions.rename_path(&file.path, &new_path));
    if let Err(err) = carried {
        tracing::warn!(error = %err, "day state not updated for rename");
        human.push_warning(format!("day state not updated: {err}"));
    }
    human.push_summary("path", new_path.clone());
    let formers = aliases.all_possible_names(new_name);
    if formers.len() > 1 {
        human.push_detail(format!("former names: {}", formers[1..].join(", ")));
    }

    let report = RenameReport {
        from: file.basename,
        to: new_name.to_string(),
        path: new_path,
    };
    emit_success(session.output, "rename", &report, Some(&human))
}

pub struct SetTimeOptions {
    pub task: String,
    /// `None` clears the field
    pub time: Option<String>,
    pub legacy: bool,
}

#[derive(Serialize)]
struct SetTimeReport {
    path: String,
    scheduled_time: Option<String>,
    field: &'static str,
}

pub async fn run_set_time(session: &Session, options: SetTimeOptions) -> Result<()> {
    let scheduled = match options.time.as_deref() {
        Some(raw) => Some(
            parse_clock(raw)
                .ok_or_else(|| Error::InvalidArgument(format!("'{raw}' is not HH:MM")))?
                .format("%H:%M")
                .to_string(),
        ),
        None => None,
    };
    let target = if options.legacy {
        FieldTarget::Legacy
    } else {
        FieldTarget::Current
    };

    let file = session.task_file(&options.task).await?;
    let content = session.vault.read_note(&file.path)?;
    let updated = frontmatter::update(&content, |fm| match &scheduled {
        Some(time) => fields::set(fm, Field::ScheduledTime, time.clone().into(), target),
        None => fields::remove(fm, Field::ScheduledTime),
    })?;
    session.vault.write_note(&file.path, &updated)?;

    let field = match (target, Field::ScheduledTime.legacy_names().first()) {
        (FieldTarget::Legacy, Some(name)) => *name,
        _ => Field::ScheduledTime.current_name(),
    };
    let mut human = HumanOutput::new(match &scheduled {
        Some(time) => format!("{} scheduled at {time}", file.basename),
        None => format!("{} unscheduled", file.basename),
    });
    human.push_summary("field", field);

    let report = SetTimeReport {
        path: file.path,
        scheduled_time: scheduled,
        field,
    };
    emit_success(session.output, "set-time", &report, Some(&human))
}
