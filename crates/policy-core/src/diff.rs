//! Three-way differ
//!
//! Compares a ledger (what was applied last time) with a declared collection
//! (what should exist now) and produces a [`ReconciliationPlan`]. Alignment
//! is by name only: the remote side may hand back bulk-created objects in any
//! order, so position in either list carries no identity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::declared::{Attributes, DeclaredCollection, DeclaredEntity};
use crate::ledger::{Ledger, LedgerEntry};
use crate::placement::PositionHint;

/// An entity present on both sides whose attributes changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedUpdate {
    pub current: LedgerEntry,
    pub desired: DeclaredEntity,
    /// Names of the fields that differ, sorted
    pub changed_fields: Vec<String>,
}

/// Why a change was refused before any remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The declared position differs from the one the entity was created
    /// with. Placement is creation-only; moving needs delete + recreate.
    Reposition {
        recorded: Option<PositionHint>,
        requested: PositionHint,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Reposition { .. } => f.write_str(
                "position can only be set at creation; remove the entity and declare it again to move it",
            ),
        }
    }
}

/// An entity present on both sides that cannot be reconciled in place
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedChange {
    pub current: LedgerEntry,
    pub desired: DeclaredEntity,
    pub reason: RejectReason,
}

/// The remote operations needed to converge a collection
///
/// Every list is sorted by name, and a name appears in at most one list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub collection: String,
    pub creates: Vec<DeclaredEntity>,
    pub updates: Vec<PlannedUpdate>,
    pub deletes: Vec<LedgerEntry>,
    pub unchanged: Vec<LedgerEntry>,
    pub rejected: Vec<RejectedChange>,
}

/// Counts per plan list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl ReconciliationPlan {
    /// True when executing the plan would issue no remote call
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// True when there is nothing to do and nothing to report
    pub fn is_converged(&self) -> bool {
        self.is_noop() && self.rejected.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            creates: self.creates.len(),
            updates: self.updates.len(),
            deletes: self.deletes.len(),
            unchanged: self.unchanged.len(),
            rejected: self.rejected.len(),
        }
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.creates, self.updates, self.deletes, self.unchanged
        )?;
        if self.rejected > 0 {
            write!(f, ", {} rejected", self.rejected)?;
        }
        Ok(())
    }
}

/// Compute the plan that converges `ledger` to `declared`
pub fn diff(ledger: &Ledger, declared: &DeclaredCollection) -> ReconciliationPlan {
    let recorded: BTreeMap<&str, &LedgerEntry> =
        ledger.entries().iter().map(|e| (e.name.as_str(), e)).collect();
    let desired: BTreeMap<&str, &DeclaredEntity> =
        declared.entities().iter().map(|e| (e.name(), e)).collect();

    let mut plan = ReconciliationPlan {
        collection: ledger.collection().to_string(),
        creates: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
        unchanged: Vec::new(),
        rejected: Vec::new(),
    };

    for (name, entity) in &desired {
        let Some(entry) = recorded.get(name) else {
            plan.creates.push((*entity).clone());
            continue;
        };

        if let Some(reason) = reposition(entry, entity) {
            plan.rejected.push(RejectedChange {
                current: (*entry).clone(),
                desired: (*entity).clone(),
                reason,
            });
            continue;
        }

        let changed_fields = changed_fields(&entry.last_applied, entity.attributes());
        if changed_fields.is_empty() {
            plan.unchanged.push((*entry).clone());
        } else {
            plan.updates.push(PlannedUpdate {
                current: (*entry).clone(),
                desired: (*entity).clone(),
                changed_fields,
            });
        }
    }

    plan.deletes = recorded
        .iter()
        .filter(|(name, _)| !desired.contains_key(*name))
        .map(|(_, entry)| (*entry).clone())
        .collect();

    plan
}

/// A declared hint that disagrees with the recorded one is a move request.
/// Dropping the hint from the declaration is not.
fn reposition(entry: &LedgerEntry, entity: &DeclaredEntity) -> Option<RejectReason> {
    let requested = entity.position()?;
    if entry.position.as_ref() == Some(requested) {
        return None;
    }
    Some(RejectReason::Reposition {
        recorded: entry.position.clone(),
        requested: requested.clone(),
    })
}

/// Field-level comparison over the union of keys
fn changed_fields(applied: &Attributes, desired: &Attributes) -> Vec<String> {
    let keys: BTreeSet<&String> = applied.keys().chain(desired.keys()).collect();
    keys.into_iter()
        .filter(|key| applied.get(*key) != desired.get(*key))
        .cloned()
        .collect()
}
