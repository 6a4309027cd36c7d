//! Instance reconciliation for one date.
//!
//! A pass merges the day's execution log with the task files in the vault:
//!
//! 1. prune stale permanent deletions
//! 2. fetch log entries and candidate files concurrently
//! 3. turn each logged title into a definition (file-backed, reached
//!    through an alias, or virtual) with one done instance per entry
//! 4. add one idle instance per unclaimed routine that occurs today
//! 5. add duplicated instances and restore running ones
//! 6. assign slots and order keys, sort, migrate elapsed idle instances
//!
//! The pass never fails: unreadable inputs degrade to empty ones and are
//! logged. The same inputs always produce the same instance list.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::alias::AliasTable;
use crate::config::Config;
use crate::daystate::DayStateStore;
use crate::deletion::{DayDeletions, DeletionStore};
use crate::execlog::{date_key, ExecutionEntry, ExecutionLog};
use crate::fields::{wikilink_title, ProjectRef, TaskMetadata};
use crate::model::{InstanceState, ProjectLink, TaskDefinition, TaskInstance};
use crate::ordering::{sort_instances, ORDER_STEP};
use crate::slot::{migrate_idle_to_current_slot, SlotKey};
use crate::vault::{TaskFile, Vault};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub task_folder: String,
    pub project_folder: String,
    pub cleanup_on_load: bool,
    pub migrate_elapsed: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            task_folder: config.paths.task_folder.trim_end_matches('/').to_string(),
            project_folder: config.paths.project_folder.trim_end_matches('/').to_string(),
            cleanup_on_load: config.reconcile.cleanup_on_load,
            migrate_elapsed: config.reconcile.migrate_elapsed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub date: NaiveDate,
    pub tasks: Vec<Arc<TaskDefinition>>,
    pub instances: Vec<TaskInstance>,
}

impl ReconcileOutcome {
    pub fn find(&self, instance_id: &str) -> Option<&TaskInstance> {
        self.instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
    }
}

/// Stable id for the file-based idle instance of `path` on `date`.
pub fn idle_instance_id(path: &str, date: NaiveDate) -> String {
    digest_id(&["idle", path, &date_key(date)])
}

/// Stable id for a log entry recorded without one.
pub fn logged_instance_id(path: &str, date: NaiveDate, start: Option<&str>, ordinal: usize) -> String {
    digest_id(&[
        "log",
        path,
        &date_key(date),
        start.unwrap_or(""),
        &ordinal.to_string(),
    ])
}

fn digest_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..24].to_string()
}

pub struct Reconciler<'a, V, L> {
    vault: &'a V,
    log: &'a L,
    deletions: &'a DeletionStore,
    aliases: &'a AliasTable,
    day_state: &'a DayStateStore,
    options: ReconcileOptions,
}

impl<'a, V: Vault, L: ExecutionLog> Reconciler<'a, V, L> {
    pub fn new(
        vault: &'a V,
        log: &'a L,
        deletions: &'a DeletionStore,
        aliases: &'a AliasTable,
        day_state: &'a DayStateStore,
    ) -> Self {
        Self {
            vault,
            log,
            deletions,
            aliases,
            day_state,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the instance list for `date`. `now` is the local wall clock,
    /// used only to migrate elapsed idle instances when `date` is today.
    pub async fn reconcile(&self, date: NaiveDate, now: NaiveDateTime) -> ReconcileOutcome {
        if self.options.cleanup_on_load {
            match self.deletions.cleanup_stale(date, |path| self.vault.stat(path)) {
                Ok(0) => {}
                Ok(pruned) => tracing::debug!(date = %date, pruned, "pruned stale deletions"),
                Err(err) => tracing::warn!(date = %date, error = %err, "deletion cleanup failed"),
            }
        }

        let (executions, files) =
            tokio::join!(self.log.entries_for(date), self.vault.list_task_files());
        tracing::debug!(
            date = %date,
            executions = executions.len(),
            files = files.len(),
            "reconciling"
        );

        let mut pass = Pass {
            date,
            removed: self.deletions.load_day(date),
            files_by_basename: HashMap::new(),
            files_by_path: HashMap::new(),
            definitions: HashMap::new(),
            claimed: HashSet::new(),
            instances: Vec::new(),
            seen_ids: HashSet::new(),
            pending_slots: HashMap::new(),
        };
        for file in &files {
            pass.files_by_basename
                .entry(file.basename.clone())
                .or_insert_with(|| file.clone());
            pass.files_by_path.insert(file.path.clone(), file.clone());
        }

        self.add_logged(&mut pass, &executions).await;
        self.add_routines(&mut pass, &files, &executions).await;
        self.add_duplicates(&mut pass).await;
        self.restore_running(&mut pass).await;
        self.assign_positions(&mut pass);

        let mut instances = pass.instances;
        sort_instances(&mut instances);
        if self.options.migrate_elapsed && date == now.date() {
            let current = SlotKey::for_time(now.time());
            if migrate_idle_to_current_slot(&mut instances, current) > 0 {
                sort_instances(&mut instances);
            }
        }

        let mut seen_paths = HashSet::new();
        let tasks = instances
            .iter()
            .filter(|instance| seen_paths.insert(instance.task.path.clone()))
            .map(|instance| Arc::clone(&instance.task))
            .collect();

        ReconcileOutcome {
            date,
            tasks,
            instances,
        }
    }

    // =========================================================================
    // Log entries
    // =========================================================================

    async fn add_logged(&self, pass: &mut Pass, executions: &[ExecutionEntry]) {
        let mut titles: Vec<&str> = Vec::new();
        for entry in executions {
            let title = entry.task_title.trim();
            if title.is_empty() {
                tracing::warn!(date = %pass.date, "log entry without a title, skipping");
                continue;
            }
            if !titles.contains(&title) {
                titles.push(title);
            }
        }

        for title in titles {
            let definition = self.definition_for_title(pass, title, executions).await;
            if !definition.is_virtual() {
                pass.claimed.insert(definition.path.clone());
            }

            let mut ordinal = 0;
            for entry in executions.iter().filter(|e| e.task_title.trim() == title) {
                let instance_id = match &entry.instance_id {
                    Some(id) if !id.is_empty() => id.clone(),
                    _ => {
                        ordinal += 1;
                        logged_instance_id(
                            &definition.path,
                            pass.date,
                            entry.start_time.as_deref(),
                            ordinal,
                        )
                    }
                };
                if pass.removed.is_deleted(&instance_id, &definition.path) {
                    tracing::debug!(instance_id = %instance_id, "logged instance deleted");
                    continue;
                }
                if !pass.seen_ids.insert(instance_id.clone()) {
                    tracing::warn!(instance_id = %instance_id, "duplicate log entry ignored");
                    continue;
                }

                let mut instance = TaskInstance::idle(Arc::clone(&definition), instance_id);
                instance.state = InstanceState::Done;
                instance.start_time = entry.start();
                instance.stop_time = entry.stop();
                instance.slot_key = entry
                    .slot_key
                    .as_deref()
                    .and_then(|raw| raw.parse().ok())
                    .or_else(|| instance.start_time.map(SlotKey::for_time))
                    .unwrap_or(SlotKey::None);
                if title != definition.display_name() {
                    instance.executed_title = Some(title.to_string());
                }
                pass.instances.push(instance);
            }
        }
    }

    /// File named `title`, else the file of its current name, else virtual.
    async fn definition_for_title(
        &self,
        pass: &mut Pass,
        title: &str,
        executions: &[ExecutionEntry],
    ) -> Arc<TaskDefinition> {
        let (file, current_name) = match pass.files_by_basename.get(title) {
            Some(file) => (Some(file.clone()), None),
            None => match self.aliases.find_current_name(title) {
                Some(current) => (
                    pass.files_by_basename.get(current).cloned(),
                    Some(current.to_string()),
                ),
                None => (None, None),
            },
        };

        match file {
            Some(file) => {
                if let Some(existing) = pass.definitions.get(&file.path) {
                    return Arc::clone(existing);
                }
                let mut definition = self.definition_from_file(&file).await;
                if let Some(current) = current_name {
                    tracing::debug!(former = title, current = %current, "log title resolved through alias");
                    definition.title = title.to_string();
                    definition.current_name = Some(current);
                }
                pass.remember(definition)
            }
            None => {
                let name = current_name.as_deref().unwrap_or(title);
                let path = self.virtual_path(name);
                if let Some(existing) = pass.definitions.get(&path) {
                    return Arc::clone(existing);
                }
                let mut definition = TaskDefinition::virtual_task(title, path);
                definition.current_name = current_name;
                definition.project = executions
                    .iter()
                    .filter(|e| e.task_title.trim() == title)
                    .find_map(|e| e.project.as_deref().and_then(wikilink_title))
                    .map(|project| {
                        self.resolve_project(ProjectRef {
                            title: project,
                            path: None,
                        })
                    });
                pass.remember(definition)
            }
        }
    }

    fn virtual_path(&self, title: &str) -> String {
        format!("{}/{}.md", self.options.task_folder, title)
    }

    async fn definition_from_file(&self, file: &TaskFile) -> TaskDefinition {
        let metadata = match self.vault.read_frontmatter(&file.path).await {
            Ok(Some(fm)) => TaskMetadata::from_frontmatter(&fm),
            Ok(None) => TaskMetadata::default(),
            Err(err) => {
                tracing::warn!(path = %file.path, error = %err, "task metadata unreadable, using defaults");
                TaskMetadata::default()
            }
        };
        TaskDefinition {
            title: file.basename.clone(),
            path: file.path.clone(),
            backing_file: Some(file.clone()),
            is_routine: metadata.is_routine,
            recurrence: metadata.recurrence,
            scheduled_time: metadata.scheduled_time,
            project: metadata.project.map(|project| self.resolve_project(project)),
            current_name: None,
        }
    }

    /// Explicit path, else the conventional project note, else the first
    /// note with that name anywhere in the vault.
    fn resolve_project(&self, project: ProjectRef) -> ProjectLink {
        if project.path.is_some() {
            return ProjectLink {
                title: project.title,
                path: project.path,
            };
        }
        let conventional = format!("{}/{}.md", self.options.project_folder, project.title);
        let path = if self.vault.stat(&conventional).is_some() {
            Some(conventional)
        } else {
            self.vault.find_by_basename(&project.title).into_iter().next()
        };
        if path.is_none() {
            tracing::debug!(project = %project.title, "project note not found");
        }
        ProjectLink {
            title: project.title,
            path,
        }
    }

    // =========================================================================
    // Routines
    // =========================================================================

    async fn add_routines(&self, pass: &mut Pass, files: &[TaskFile], executions: &[ExecutionEntry]) {
        let logged: HashSet<&str> = executions.iter().map(|e| e.task_title.trim()).collect();

        for file in files {
            if pass.claimed.contains(&file.path) {
                continue;
            }
            let names = self.aliases.all_possible_names(&file.basename);
            if names.iter().any(|name| logged.contains(name.as_str())) {
                continue;
            }

            let definition = match pass.definitions.get(&file.path) {
                Some(existing) => Arc::clone(existing),
                None => pass.remember(self.definition_from_file(file).await),
            };
            let occurs = definition.is_routine
                && definition
                    .recurrence
                    .as_ref()
                    .is_some_and(|rule| rule.occurs_on(pass.date));
            if !occurs {
                continue;
            }

            let instance_id = idle_instance_id(&file.path, pass.date);
            if pass
                .removed
                .suppresses_idle(&instance_id, &file.path, file.created)
            {
                tracing::debug!(path = %file.path, "routine deleted or hidden today");
                continue;
            }
            if pass.seen_ids.insert(instance_id.clone()) {
                pass.instances.push(TaskInstance::idle(definition, instance_id));
            }
        }
    }

    // =========================================================================
    // Day state
    // =========================================================================

    async fn add_duplicates(&self, pass: &mut Pass) {
        for record in self.day_state.duplicates(pass.date) {
            if pass.seen_ids.contains(&record.instance_id)
                || pass.removed.is_deleted(&record.instance_id, &record.path)
                || pass.removed.is_hidden(&record.instance_id, &record.path)
            {
                continue;
            }
            let title = crate::vault::basename_of(&record.path).to_string();
            let definition = self.definition_for_path(pass, &record.path, &title).await;
            pass.seen_ids.insert(record.instance_id.clone());
            pass.pending_slots
                .insert(record.instance_id.clone(), record.slot_key);
            pass.instances
                .push(TaskInstance::idle(definition, record.instance_id));
        }
    }

    async fn restore_running(&self, pass: &mut Pass) {
        for record in self.day_state.running_on(pass.date) {
            let start = record.start();
            if let Some(instance) = pass
                .instances
                .iter_mut()
                .find(|instance| instance.instance_id == record.instance_id)
            {
                if instance.state.is_idle() {
                    instance.state = InstanceState::Running;
                    instance.start_time = start;
                    pass.pending_slots
                        .insert(record.instance_id.clone(), record.slot_key);
                } else {
                    tracing::warn!(instance_id = %record.instance_id, "running record for finished instance");
                }
                continue;
            }
            if pass.removed.is_deleted(&record.instance_id, &record.task_path) {
                continue;
            }

            let definition = self
                .definition_for_path(pass, &record.task_path, &record.task_title)
                .await;
            let mut instance = TaskInstance::idle(definition, record.instance_id.clone());
            instance.state = InstanceState::Running;
            instance.start_time = start;
            pass.pending_slots
                .insert(record.instance_id.clone(), record.slot_key);
            pass.seen_ids.insert(record.instance_id);
            pass.instances.push(instance);
        }
    }

    async fn definition_for_path(&self, pass: &mut Pass, path: &str, title: &str) -> Arc<TaskDefinition> {
        if let Some(existing) = pass.definitions.get(path) {
            return Arc::clone(existing);
        }
        let definition = match pass.files_by_path.get(path).cloned() {
            Some(file) => self.definition_from_file(&file).await,
            None => TaskDefinition::virtual_task(title, path),
        };
        pass.remember(definition)
    }

    /// Slots and order keys for idle and running instances.
    fn assign_positions(&self, pass: &mut Pass) {
        let positions = self.day_state.positions(pass.date);
        let overrides = self.day_state.slot_overrides();

        for instance in pass.instances.iter_mut() {
            if instance.state == InstanceState::Running {
                instance.slot_key = pass
                    .pending_slots
                    .get(&instance.instance_id)
                    .copied()
                    .filter(|slot| *slot != SlotKey::None)
                    .or_else(|| instance.start_time.map(SlotKey::for_time))
                    .unwrap_or(SlotKey::None);
            }
        }

        let mut unsaved: Vec<usize> = Vec::new();
        let mut highest: BTreeMap<SlotKey, i64> = BTreeMap::new();
        for (index, instance) in pass.instances.iter_mut().enumerate() {
            if !instance.state.is_idle() {
                continue;
            }
            if let Some(saved) = positions.get(&instance.instance_id) {
                instance.slot_key = saved.slot_key;
                instance.order = saved.order;
                instance.manually_positioned = saved.manually_positioned;
                let top = highest.entry(saved.slot_key).or_insert(saved.order);
                *top = (*top).max(saved.order);
                continue;
            }
            instance.slot_key = pass
                .pending_slots
                .get(&instance.instance_id)
                .copied()
                .or_else(|| overrides.get(instance.path()).copied())
                .or_else(|| instance.task.scheduled_time.map(SlotKey::for_time))
                .unwrap_or(SlotKey::None);
            unsaved.push(index);
        }

        let instances = &mut pass.instances;
        unsaved.sort_by(|&a, &b| {
            let (a, b) = (&instances[a], &instances[b]);
            scheduled_rank(a.task.scheduled_time)
                .cmp(&scheduled_rank(b.task.scheduled_time))
                .then_with(|| a.title().cmp(b.title()))
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        for index in unsaved {
            let slot = instances[index].slot_key;
            let next = highest.get(&slot).copied().unwrap_or(0) + ORDER_STEP;
            highest.insert(slot, next);
            instances[index].order = next;
        }
    }
}

/// Untimed tasks after timed ones.
fn scheduled_rank(time: Option<NaiveTime>) -> (bool, Option<NaiveTime>) {
    (time.is_none(), time)
}

/// Mutable state of one pass.
struct Pass {
    date: NaiveDate,
    removed: DayDeletions,
    files_by_basename: HashMap<String, TaskFile>,
    files_by_path: HashMap<String, TaskFile>,
    definitions: HashMap<String, Arc<TaskDefinition>>,
    claimed: HashSet<String>,
    instances: Vec<TaskInstance>,
    seen_ids: HashSet<String>,
    /// Slots recorded with duplicates and running tasks
    pending_slots: HashMap<String, SlotKey>,
}

impl Pass {
    fn remember(&mut self, definition: TaskDefinition) -> Arc<TaskDefinition> {
        let definition = Arc::new(definition);
        self.definitions
            .insert(definition.path.clone(), Arc::clone(&definition));
        definition
    }
}
