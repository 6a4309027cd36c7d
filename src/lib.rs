//! dayplan - daily task reconciliation for markdown vaults
//!
//! This library decides, for a calendar date, which tasks of a vault
//! appear, what state each appearance is in, and in what order they sit
//! inside the day's time slots.
//!
//! # Core Concepts
//!
//! - **Task definitions**: one markdown note per task; routines carry a
//!   recurrence rule in their frontmatter
//! - **Instances**: per-date appearances of a task, idle, running or done
//! - **Execution log**: monthly JSON documents recording finished work
//! - **Deletion state**: per-date deleted and hidden records, plus a legacy
//!   global list
//! - **Aliases**: former names of renamed tasks, so history stays attached
//! - **Order keys**: integer keys spaced by 100 inside each time slot
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `output`: JSON envelopes and human-readable blocks
//! - `config`: Configuration loading from `.dayplan.toml`
//! - `error`: Error types and result aliases
//! - `frontmatter`, `fields`: YAML frontmatter and field-name generations
//! - `recurrence`: Does a routine occur on a date?
//! - `vault`: Task note listing and lookups
//! - `execlog`: Monthly execution logs
//! - `alias`: Former-name resolution
//! - `deletion`: Deleted and hidden records
//! - `daystate`: Saved positions, duplicates, slot preferences, running tasks
//! - `model`: Task definitions and instances
//! - `ordering`: Order keys, sorting and moves
//! - `slot`: Time slots and elapsed-slot migration
//! - `reconcile`: Builds the day's instance list
//! - `storage`: Paths and the key-value state store
//! - `lock`: File locking and atomic writes

pub mod alias;
pub mod cli;
pub mod config;
pub mod daystate;
pub mod deletion;
pub mod error;
pub mod execlog;
pub mod fields;
pub mod frontmatter;
pub mod lock;
pub mod model;
pub mod ordering;
pub mod output;
pub mod reconcile;
pub mod recurrence;
pub mod slot;
pub mod storage;
pub mod vault;

pub use error::{Error, Result};
pub use reconcile::{ReconcileOutcome, Reconciler};
