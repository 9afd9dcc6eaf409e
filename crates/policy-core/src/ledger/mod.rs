//! Ledger of owned remote objects
//!
//! The ledger is this system's memory of what it created last time: an
//! ordered list of name → remote ID entries with the attributes last applied.
//! It is the only source of truth for which remote objects the system owns;
//! nothing outside it is ever updated or deleted. Each collection has its own
//! ledger, persisted as TOML by the [`LedgerStore`].

mod entry;
mod store;

pub use entry::LedgerEntry;
pub use store::{CollectionLock, LedgerStore};

use crate::declared::Attributes;
use crate::{Error, Result};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LEDGER_VERSION: &str = "1.0";

/// Name-keyed, ordered record of owned remote objects for one collection
///
/// Not designed for concurrent writers: callers serialize passes per
/// collection (see [`LedgerStore::lock`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Ledger format version for forward compatibility
    version: String,
    /// Collection this ledger belongs to
    collection: String,
    /// Owned objects, in creation order
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Create a new empty ledger for `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            collection: collection.into(),
            entries: Vec::new(),
        }
    }

    /// Load a ledger from a TOML file with shared lock
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, locked, or parsed, or if
    /// it holds the same name twice.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let lock_file = open_lock_file(path)?;
        lock_file.lock_shared()?;

        // Read through the locked file handle to avoid TOCTOU race
        let mut content = String::new();
        use std::io::Read;
        (&file).read_to_string(&mut content)?;
        let ledger: Ledger = toml::from_str(&content)?;
        ledger.check_unique()?;

        Ok(ledger)
    }

    /// Save the ledger to a TOML file atomically with exclusive lock
    ///
    /// Uses write-to-temp-then-rename so a crash never leaves a torn file.
    /// The lock lives on a sibling `.lock` file; the ledger path itself only
    /// ever appears through the rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or locked.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        let lock_file = open_lock_file(path)?;
        lock_file.lock_exclusive()?;

        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::ledger(format!(
                    "duplicate entry '{}' in collection '{}'",
                    entry.name, self.collection
                )));
            }
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// All entries in creation order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in creation order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Add an entry, replacing any entry with the same name in place
    ///
    /// Returns the replaced entry, if any.
    pub fn insert(&mut self, entry: LedgerEntry) -> Option<LedgerEntry> {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    /// Remove an entry by name
    ///
    /// Returns the removed entry if found, None otherwise.
    pub fn remove(&mut self, name: &str) -> Option<LedgerEntry> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(pos))
    }

    /// Replace the attribute snapshot of an entry after a successful update
    ///
    /// Returns false if no entry has that name.
    pub fn replace_snapshot(&mut self, name: &str, attributes: Attributes) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.last_applied = attributes;
                entry.applied_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("toml.lock")
}

fn open_lock_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?)
}
