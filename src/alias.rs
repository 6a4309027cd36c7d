//! Alias table for renamed tasks.
//!
//! The persisted document maps each current name to the names it had
//! before, oldest first: `{ "Morning walk": ["Walk", "Stroll"] }`.
//! A reverse index built at load gives O(1) former → current lookups.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::storage::Storage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    forward: BTreeMap<String, Vec<String>>,
    reverse: HashMap<String, String>,
}

impl AliasTable {
    pub fn new(forward: BTreeMap<String, Vec<String>>) -> Self {
        let mut table = Self {
            forward,
            reverse: HashMap::new(),
        };
        table.rebuild_index();
        table
    }

    /// Load the vault's alias table; a missing or malformed document is empty.
    pub fn load(storage: &Storage) -> Self {
        let path = storage.aliases_file();
        match storage.read_json_opt::<BTreeMap<String, Vec<String>>>(&path) {
            Ok(Some(forward)) => Self::new(forward),
            Ok(None) => Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "alias table unreadable, ignoring");
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.write_json(&storage.aliases_file(), &self.forward)
    }

    fn rebuild_index(&mut self) {
        self.reverse.clear();
        for (current, formers) in &self.forward {
            for former in formers {
                if former != current {
                    self.reverse.insert(former.clone(), current.clone());
                }
            }
        }
    }

    /// Current name for a former name, if the task was renamed.
    pub fn find_current_name(&self, former: &str) -> Option<&str> {
        self.reverse.get(former).map(String::as_str)
    }

    /// `[current, ...formers]`
    pub fn all_possible_names(&self, current: &str) -> Vec<String> {
        let mut names = vec![current.to_string()];
        if let Some(formers) = self.forward.get(current) {
            for former in formers {
                if !names.contains(former) {
                    names.push(former.clone());
                }
            }
        }
        names
    }

    /// Record that `old` is now called `new`.
    ///
    /// Aliases already held by `old` move under `new`, so chains of renames
    /// resolve in one lookup.
    pub fn record_rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let mut formers = self.forward.remove(old).unwrap_or_default();
        formers.push(old.to_string());

        let entry = self.forward.entry(new.to_string()).or_default();
        for former in formers {
            if former != new && !entry.contains(&former) {
                entry.push(former);
            }
        }
        // A name that becomes current again stops being an alias elsewhere.
        for (current, formers) in self.forward.iter_mut() {
            if current != new {
                formers.retain(|former| former != new);
            }
        }
        self.forward.retain(|_, formers| !formers.is_empty());
        self.rebuild_index();
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.forward
    }
}
