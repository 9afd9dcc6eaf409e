//! On-disk layout of ledgers
//!
//! One TOML file per collection under a state directory:
//!
//! ```text
//! <state_dir>/
//!   networks.ledger.toml
//!   networks.ledger.toml.lock
//!   networks.lock
//!   access_rules.ledger.toml
//!   access_rules.ledger.toml.lock
//!   access_rules.lock
//! ```
//!
//! The `<collection>.lock` file carries the pass-wide exclusive lock. The
//! `.ledger.toml.lock` file is held only for the duration of a single read
//! or write of the ledger.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::Ledger;
use crate::executor::Checkpoint;
use crate::{Error, Result};

const LEDGER_SUFFIX: &str = ".ledger.toml";

/// Directory of per-collection ledgers
#[derive(Debug, Clone)]
pub struct LedgerStore {
    root: PathBuf,
}

impl LedgerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the ledger file of `collection`
    ///
    /// # Errors
    ///
    /// Returns an error if the collection name is not a safe file stem.
    pub fn ledger_path(&self, collection: &str) -> Result<PathBuf> {
        validate_collection_name(collection)?;
        Ok(self.root.join(format!("{collection}{LEDGER_SUFFIX}")))
    }

    fn lock_path(&self, collection: &str) -> Result<PathBuf> {
        validate_collection_name(collection)?;
        Ok(self.root.join(format!("{collection}.lock")))
    }

    /// Load the ledger of `collection`, or an empty one if none was saved
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// belongs to another collection.
    pub fn load(&self, collection: &str) -> Result<Ledger> {
        let path = self.ledger_path(collection)?;
        if !path.exists() {
            return Ok(Ledger::new(collection));
        }

        let ledger = Ledger::load(&path)?;
        if ledger.collection() != collection {
            return Err(Error::CollectionMismatch {
                expected: collection.to_string(),
                found: ledger.collection().to_string(),
            });
        }
        Ok(ledger)
    }

    /// Save a ledger under its own collection name
    ///
    /// Creates the state directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let path = self.ledger_path(ledger.collection())?;
        fs::create_dir_all(&self.root)?;
        ledger.save(&path)?;
        debug!(
            collection = ledger.collection(),
            entries = ledger.len(),
            "ledger saved"
        );
        Ok(())
    }

    /// Take the exclusive pass lock of `collection`
    ///
    /// Blocks while another process holds it. The lock is released when the
    /// returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn lock(&self, collection: &str) -> Result<CollectionLock> {
        let path = self.lock_path(collection)?;
        fs::create_dir_all(&self.root)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        debug!(collection, "collection lock acquired");

        Ok(CollectionLock {
            file,
            collection: collection.to_string(),
        })
    }

    /// Names of the collections that have a saved ledger, sorted
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be read.
    pub fn collections(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_string_lossy().strip_suffix(LEDGER_SUFFIX) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Drop one entry without touching the remote side
    ///
    /// The remote object stays where it is and is no longer owned.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded or saved, or has no
    /// such entry.
    pub fn forget(&self, collection: &str, name: &str) -> Result<()> {
        let _lock = self.lock(collection)?;
        let mut ledger = self.load(collection)?;
        if ledger.remove(name).is_none() {
            return Err(Error::EntryNotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            });
        }
        self.save(&ledger)
    }
}

impl Checkpoint for LedgerStore {
    fn commit(&mut self, ledger: &Ledger) -> Result<()> {
        self.save(ledger)
    }
}

/// Exclusive lock on one collection, held for a whole pass
#[derive(Debug)]
pub struct CollectionLock {
    file: File,
    collection: String,
}

impl CollectionLock {
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well; unlocking first
        // makes the release point explicit.
        let _ = self.file.unlock();
        debug!(collection = %self.collection, "collection lock released");
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCollectionName {
            name: name.to_string(),
        })
    }
}
