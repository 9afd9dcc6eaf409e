//! Report types for ledger verification
//!
//! Verification asks the gateway for every object the ledger owns. It only
//! prunes entries whose object is gone; attribute drift on the remote side is
//! not inspected.

use serde::Serialize;

use crate::executor::EntityError;
use crate::ledger::LedgerEntry;

/// Outcome of a verification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Every owned object was found
    Healthy,
    /// Some entries were stale and have been removed from the ledger
    Pruned,
    /// Some objects could not be checked
    Incomplete,
}

/// Report from a verification pass
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub collection: String,
    /// Names whose remote object was found
    pub present: Vec<String>,
    /// Entries removed because their remote object no longer exists
    pub pruned: Vec<LedgerEntry>,
    /// Entries that could not be checked
    pub errors: Vec<EntityError>,
}

impl VerifyReport {
    pub(crate) fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            present: Vec::new(),
            pruned: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Errors dominate pruning: an incomplete check says nothing about the
    /// entries it could not reach.
    pub fn status(&self) -> VerifyStatus {
        if !self.errors.is_empty() {
            VerifyStatus::Incomplete
        } else if !self.pruned.is_empty() {
            VerifyStatus::Pruned
        } else {
            VerifyStatus::Healthy
        }
    }
}
