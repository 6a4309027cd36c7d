//! dayplan delete / hide / cleanup command implementations

use serde::Serialize;

use crate::deletion::{DeletionRecord, DeletionType, HiddenRecord};
use crate::error::{Error, Result};
use crate::model::InstanceState;
use crate::output::{emit_success, HumanOutput};
use crate::vault::Vault;

use super::Session;

#[derive(Serialize)]
struct DeleteReport {
    instance_id: String,
    path: String,
    deletion_type: DeletionType,
    note_removed: bool,
    log_entry_removed: bool,
}

pub async fn run_delete(session: &Session, needle: &str, permanent: bool) -> Result<()> {
    let (_, instance) = session.instance(needle).await?;
    let path = instance.path().to_string();
    let date = session.date;

    let is_duplicate = session
        .day_state
        .duplicates(date)
        .iter()
        .any(|record| record.instance_id == instance.instance_id);
    if permanent && is_duplicate {
        return Err(Error::InvalidArgument(
            "a duplicated instance cannot be deleted permanently; delete it without --permanent"
                .to_string(),
        ));
    }

    let mut human = HumanOutput::new(format!("Deleted {}", instance.title()));
    let mut log_entry_removed = false;
    if instance.state == InstanceState::Done {
        log_entry_removed = session.log.remove(date, &instance.instance_id)?;
    }
    if instance.state == InstanceState::Running {
        session.day_state.stop_running(&instance.instance_id)?;
    }
    if is_duplicate {
        session.day_state.remove_duplicate(date, &instance.instance_id)?;
    }

    let mut note_removed = false;
    let record = if permanent {
        if !instance.task.is_virtual() {
            note_removed = session.vault.delete_note(&path)?;
        }
        DeletionRecord::permanent(path.clone(), Some(instance.instance_id.clone()))
    } else {
        DeletionRecord::temporary(path.clone(), instance.instance_id.clone())
    };

    // Dropping the duplicate record already removes it.
    if !is_duplicate {
        if let Err(err) = session.deletions.record(date, std::slice::from_ref(&record)) {
            tracing::warn!(path = %path, error = %err, "deletion not persisted");
            human.push_warning(format!("deletion not saved: {err}"));
        }
    }

    human.push_summary("path", path.clone());
    human.push_summary(
        "type",
        if permanent { "permanent" } else { "today only" },
    );
    if note_removed {
        human.push_detail(format!("removed note {path}"));
    }
    if log_entry_removed {
        human.push_detail("removed execution log entry");
    }

    let report = DeleteReport {
        instance_id: instance.instance_id.clone(),
        path,
        deletion_type: record.deletion_type,
        note_removed,
        log_entry_removed,
    };
    emit_success(session.output, "delete", &report, Some(&human))
}

pub async fn run_hide(session: &Session, needle: &str) -> Result<()> {
    let (_, instance) = session.instance(needle).await?;
    if !instance.state.is_idle() {
        return Err(Error::InvalidArgument(format!(
            "{} has already run and cannot be hidden",
            instance.title()
        )));
    }

    let is_duplicate = session
        .day_state
        .duplicates(session.date)
        .iter()
        .any(|record| record.instance_id == instance.instance_id);
    let record = if is_duplicate {
        HiddenRecord {
            path: instance.path().to_string(),
            instance_id: Some(instance.instance_id.clone()),
        }
    } else if instance.task.is_routine {
        HiddenRecord::routine(instance.path())
    } else {
        return Err(Error::InvalidArgument(format!(
            "{} is not a routine; use delete instead",
            instance.title()
        )));
    };
    session.deletions.record_hidden(session.date, record.clone())?;

    let mut human = HumanOutput::new(format!("Hidden {} for {}", instance.title(), session.date));
    human.push_summary("path", record.path.clone());
    emit_success(session.output, "hide", &record, Some(&human))
}

#[derive(Serialize)]
struct CleanupReport {
    pruned: usize,
}

pub fn run_cleanup(session: &Session) -> Result<()> {
    let pruned = session
        .deletions
        .cleanup_stale(session.date, |path| session.vault.stat(path))?;

    let mut human = HumanOutput::new("Deletion cleanup");
    human.push_summary("date", session.date.to_string());
    human.push_summary("pruned", pruned.to_string());
    emit_success(session.output, "cleanup", &CleanupReport { pruned }, Some(&human))
}
