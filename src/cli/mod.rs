//! Command-line interface for dayplan
//!
//! This module defines the CLI structure using clap derive macros.
//! Each group of subcommands is implemented in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

use crate::alias::AliasTable;
use crate::config::Config;
use crate::daystate::DayStateStore;
use crate::deletion::DeletionStore;
use crate::error::{Error, Result};
use crate::execlog::FileExecutionLog;
use crate::fields::parse_date;
use crate::model::TaskInstance;
use crate::output::OutputOptions;
use crate::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use crate::storage::Storage;
use crate::vault::{FsVault, TaskFile, Vault};

mod arrange;
mod record;
mod remove;
mod show;
mod task;

/// dayplan - daily task reconciliation
///
/// Builds the day's task list from the task notes and execution logs of a
/// markdown vault, and records what you do with it.
#[derive(Parser, Debug)]
#[command(name = "dayplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Vault root (defaults to current directory)
    #[arg(long, global = true, env = "DAYPLAN_VAULT")]
    pub vault: Option<PathBuf>,

    /// Day to work on, YYYY-MM-DD (defaults to today)
    #[arg(long, global = true)]
    pub date: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the day's instances by slot
    Show,

    /// Start an idle instance
    Start {
        /// Instance id or unique prefix
        instance: String,
    },

    /// Record an instance as done
    Done {
        /// Instance id or unique prefix
        instance: String,

        /// Start time, HH:MM (defaults to the running start or now)
        #[arg(long)]
        start: Option<String>,

        /// Stop time, HH:MM (defaults to now)
        #[arg(long)]
        stop: Option<String>,
    },

    /// Delete an instance for the day
    Delete {
        /// Instance id or unique prefix
        instance: String,

        /// Also remove the task note; the task stays gone on later days
        #[arg(long)]
        permanent: bool,
    },

    /// Hide a routine (or a duplicated instance) for the day
    Hide {
        /// Instance id or unique prefix
        instance: String,
    },

    /// Move an idle instance to a slot position
    Move {
        /// Instance id or unique prefix
        instance: String,

        /// Target slot: 0:00-8:00, 8:00-12:00, 12:00-16:00, 16:00-0:00 or none
        #[arg(long)]
        slot: String,

        /// Position inside the slot, 0 = top
        #[arg(long, default_value_t = usize::MAX)]
        index: usize,
    },

    /// Add another idle instance of a task for the day
    Duplicate {
        /// Instance id or unique prefix
        instance: String,
    },

    /// Prune permanent deletions whose note was recreated
    Cleanup,

    /// Rename a task note, keeping its history attached
    Rename {
        /// Task name or vault-relative path
        task: String,

        /// New task name
        new_name: String,
    },

    /// Set or clear a task's scheduled time
    SetTime {
        /// Task name or vault-relative path
        task: String,

        /// Time as HH:MM
        #[arg(required_unless_present = "clear")]
        time: Option<String>,

        /// Remove the scheduled time
        #[arg(long, conflicts_with = "time")]
        clear: bool,

        /// Write the legacy field name
        #[arg(long)]
        legacy: bool,
    },
}

/// Everything a command needs, opened once per invocation.
pub(crate) struct Session {
    pub storage: Storage,
    pub config: Config,
    pub vault: FsVault,
    pub log: FileExecutionLog,
    pub deletions: DeletionStore,
    pub day_state: DayStateStore,
    pub aliases: AliasTable,
    pub date: NaiveDate,
    pub now: NaiveDateTime,
    pub output: OutputOptions,
}

impl Session {
    fn open(vault: Option<PathBuf>, date: Option<&str>, output: OutputOptions) -> Result<Self> {
        let root = match vault {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        if !root.is_dir() {
            return Err(Error::VaultNotFound(root));
        }

        let now = Local::now().naive_local();
        let date = match date {
            Some(raw) => parse_date(raw).ok_or_else(|| {
                Error::InvalidArgument(format!("invalid date '{raw}' (expected YYYY-MM-DD)"))
            })?,
            None => now.date(),
        };

        let config = Config::load_from_vault(&root);
        let storage = Storage::new(root, config.paths.clone());
        let state = Arc::new(storage.state_store());
        tracing::debug!(vault = %storage.vault_root().display(), date = %date, "session opened");

        Ok(Self {
            vault: FsVault::new(storage.clone()),
            log: FileExecutionLog::new(storage.clone()),
            deletions: DeletionStore::new(state.clone()),
            day_state: DayStateStore::new(state),
            aliases: AliasTable::load(&storage),
            storage,
            config,
            date,
            now,
            output,
        })
    }

    pub async fn reconcile(&self) -> ReconcileOutcome {
        Reconciler::new(
            &self.vault,
            &self.log,
            &self.deletions,
            &self.aliases,
            &self.day_state,
        )
        .with_options(ReconcileOptions::from_config(&self.config))
        .reconcile(self.date, self.now)
        .await
    }

    /// Reconcile and pick one instance by id or unique id prefix.
    pub async fn instance(&self, needle: &str) -> Result<(ReconcileOutcome, TaskInstance)> {
        let outcome = self.reconcile().await;
        let instance = find_instance(&outcome.instances, needle)?.clone();
        Ok((outcome, instance))
    }

    /// Task note by vault path, file name, or a former name.
    pub async fn task_file(&self, needle: &str) -> Result<TaskFile> {
        let files = self.vault.list_task_files().await;
        let needle = needle.trim().trim_end_matches(".md");
        let by_path = files
            .iter()
            .find(|file| file.path.trim_end_matches(".md") == needle);
        let by_name = || files.iter().find(|file| file.basename == needle);
        let by_alias = || {
            self.aliases
                .find_current_name(needle)
                .and_then(|current| files.iter().find(|file| file.basename == current))
        };
        by_path
            .or_else(by_name)
            .or_else(by_alias)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(needle.to_string()))
    }
}

/// Exact id, else a prefix that matches exactly one instance.
pub(crate) fn find_instance<'a>(instances: &'a [TaskInstance], needle: &str) -> Result<&'a TaskInstance> {
    let needle = needle.trim();
    if let Some(exact) = instances.iter().find(|i| i.instance_id == needle) {
        return Ok(exact);
    }
    let mut matches = instances
        .iter()
        .filter(|i| !needle.is_empty() && i.instance_id.starts_with(needle));
    match (matches.next(), matches.next()) {
        (Some(found), None) => Ok(found),
        (Some(_), Some(_)) => Err(Error::InvalidArgument(format!(
            "'{needle}' matches more than one instance"
        ))),
        (None, _) => Err(Error::InstanceNotFound(needle.to_string())),
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let session = Session::open(self.vault, self.date.as_deref(), output)?;

        match self.command {
            Commands::Show => show::run(&session).await,
            Commands::Start { instance } => record::run_start(&session, &instance).await,
            Commands::Done {
                instance,
                start,
                stop,
            } => {
                record::run_done(
                    &session,
                    record::DoneOptions {
                        instance,
                        start,
                        stop,
                    },
                )
                .await
            }
            Commands::Delete {
                instance,
                permanent,
            } => remove::run_delete(&session, &instance, permanent).await,
            Commands::Hide { instance } => remove::run_hide(&session, &instance).await,
            Commands::Cleanup => remove::run_cleanup(&session),
            Commands::Move {
                instance,
                slot,
                index,
            } => arrange::run_move(&session, &instance, &slot, index).await,
            Commands::Duplicate { instance } => arrange::run_duplicate(&session, &instance).await,
            Commands::Rename { task, new_name } => task::run_rename(&session, &task, &new_name).await,
            Commands::SetTime {
                task,
                time,
                clear,
                legacy,
            } => {
                task::run_set_time(
                    &session,
                    task::SetTimeOptions {
                        task,
                        time: if clear { None } else { time },
                        legacy,
                    },
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::idle;
    use crate::slot::SlotKey;

    #[test]
    fn instance_lookup_by_id_or_unique_prefix() {
        let instances = vec![
            idle("abc123", SlotKey::None, 100),
            idle("abd456", SlotKey::None, 200),
            idle("ab", SlotKey::None, 300),
        ];
        assert_eq!(find_instance(&instances, "ab").unwrap().instance_id, "ab");
        assert_eq!(find_instance(&instances, "abc").unwrap().instance_id, "abc123");
        assert!(matches!(
            find_instance(&instances, "abx"),
            Err(Error::InstanceNotFound(_))
        ));
        assert!(matches!(
            find_instance(&instances, "a"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dayplan", "move", "abc", "--slot", "8:00-12:00", "--index", "0", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Move { index: 0, .. }));

        assert!(Cli::try_parse_from(["dayplan", "set-time", "Walk"]).is_err());
        assert!(Cli::try_parse_from(["dayplan", "set-time", "Walk", "--clear"]).is_ok());
    }
}
