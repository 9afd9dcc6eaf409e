//! Reconciler implementation
//!
//! The Reconciler ties one pass together: it takes the collection lock,
//! loads the ledger, diffs it against the declared collection, runs the
//! executor with the store as checkpoint, and saves the final ledger.

use tracing::{debug, info, warn};

use crate::Result;
use crate::config::ResolvedConfig;
use crate::declared::{DeclaredCollection, EntityKind};
use crate::diff::{ReconciliationPlan, diff};
use crate::executor::{Action, EntityError, ExecError, ExecuteOptions, Executor, Operation};
use crate::gateway::{CallContext, Gateway};
use crate::ledger::{Ledger, LedgerStore};

use super::verify::VerifyReport;

/// Options for apply operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Compute the plan but issue no remote call and write nothing
    pub dry_run: bool,
    /// Create unordered entities with one bulk call
    pub bulk_create: bool,
}

/// Report from an apply operation
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub collection: String,
    pub dry_run: bool,
    /// The plan that was executed (or would have been, in a dry run)
    pub plan: ReconciliationPlan,
    /// Ledger mutations, in the order they happened
    pub actions: Vec<Action>,
    /// Per-entity failures; the pass went on past each of them
    pub errors: Vec<EntityError>,
}

impl ApplyReport {
    /// True when every planned change was applied
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs reconciliation passes against a [`LedgerStore`]
///
/// Passes over the same collection are serialized by the store's collection
/// lock; passes over different collections are independent.
pub struct Reconciler {
    store: LedgerStore,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(store: LedgerStore, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    /// Build a reconciler from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            LedgerStore::new(config.state_dir.clone()),
            ReconcileOptions {
                dry_run: false,
                bulk_create: config.bulk_create,
            },
        )
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    /// Load the stored ledger of a collection
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub fn ledger(&self, collection: &str) -> Result<Ledger> {
        self.store.load(collection)
    }

    /// Every collection a pass must cover: the declared ones, plus an empty
    /// one for each stored ledger whose kind is no longer declared at all,
    /// so its entries get deleted
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be read.
    pub fn collections(&self, declared: &[DeclaredCollection]) -> Result<Vec<DeclaredCollection>> {
        let mut all = declared.to_vec();
        for name in self.store.collections()? {
            if declared.iter().any(|c| c.name() == name) {
                continue;
            }
            match EntityKind::from_collection_name(&name) {
                Some(kind) => {
                    debug!(collection = %name, "no declarations left, planning removal");
                    all.push(DeclaredCollection::empty(kind));
                }
                None => warn!(collection = %name, "ignoring ledger of unknown collection"),
            }
        }
        Ok(all)
    }

    /// Diff `declared` against its stored ledger without taking the lock
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub fn plan(&self, declared: &DeclaredCollection) -> Result<ReconciliationPlan> {
        let ledger = self.store.load(declared.name())?;
        Ok(diff(&ledger, declared))
    }

    /// Converge the remote side to `declared`
    ///
    /// Per-entity failures are reported in the returned [`ApplyReport`] and
    /// never abort the pass.
    ///
    /// A failed final save does not discard the report: every applied
    /// action whose entity has no checkpoint error yet gets one.
    ///
    /// # Errors
    ///
    /// Returns an error only if the lock or the ledger itself cannot be
    /// acquired or read.
    pub fn apply<G: Gateway + ?Sized>(
        &mut self,
        declared: &DeclaredCollection,
        gateway: &G,
        ctx: &CallContext,
    ) -> Result<ApplyReport> {
        let collection = declared.name();
        let _lock = self.store.lock(collection)?;

        let ledger = self.store.load(collection)?;
        let plan = diff(&ledger, declared);
        info!(collection, summary = %plan.summary(), "reconciliation plan");

        if self.options.dry_run || plan.is_converged() {
            debug!(collection, dry_run = self.options.dry_run, "no remote calls issued");
            return Ok(ApplyReport {
                collection: collection.to_string(),
                dry_run: self.options.dry_run,
                plan,
                actions: Vec::new(),
                errors: Vec::new(),
            });
        }

        let options = ExecuteOptions {
            bulk_create: self.options.bulk_create,
        };
        let mut execution = Executor::new(ctx)
            .with_options(options)
            .with_checkpoint(&mut self.store)
            .execute(&plan, gateway, ledger);

        if let Err(e) = self.store.save(&execution.ledger) {
            warn!(collection, error = %e, "final ledger save failed");
            unpersisted(&mut execution.errors, &execution.actions, &e.to_string());
        }

        if execution.is_success() {
            info!(collection, actions = execution.actions.len(), "collection converged");
        } else {
            warn!(
                collection,
                actions = execution.actions.len(),
                errors = execution.errors.len(),
                "collection partially reconciled"
            );
        }

        Ok(ApplyReport {
            collection: collection.to_string(),
            dry_run: false,
            plan,
            actions: execution.actions,
            errors: execution.errors,
        })
    }

    /// Check that every owned remote object still exists
    ///
    /// Entries whose object is gone are pruned, so the next plan recreates
    /// them. Other failures are reported and leave the entry alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or the ledger cannot be acquired, read,
    /// or written back.
    pub fn verify<G: Gateway + ?Sized>(
        &mut self,
        collection: &str,
        gateway: &G,
        ctx: &CallContext,
    ) -> Result<VerifyReport> {
        let _lock = self.store.lock(collection)?;
        let mut ledger = self.store.load(collection)?;
        let mut report = VerifyReport::new(collection);

        for entry in ledger.entries().to_vec() {
            let name = entry.name.clone();
            if ctx.is_cancelled() {
                report.errors.push(EntityError {
                    name,
                    operation: Operation::Get,
                    error: ExecError::Cancelled,
                });
                continue;
            }

            match gateway.get(ctx, &entry.remote_id) {
                Ok(object) => {
                    if object.name != entry.name {
                        debug!(
                            collection,
                            name = %entry.name,
                            remote_name = %object.name,
                            "remote object renamed out of band"
                        );
                    }
                    report.present.push(name);
                }
                Err(e) if e.is_not_found() => {
                    info!(collection, name = %name, remote_id = %entry.remote_id, "pruning stale entry");
                    ledger.remove(&name);
                    report.pruned.push(entry);
                }
                Err(e) => report.errors.push(EntityError {
                    name,
                    operation: Operation::Get,
                    error: e.into(),
                }),
            }
        }

        if !report.pruned.is_empty() && !self.options.dry_run {
            self.store.save(&ledger)?;
        }

        Ok(report)
    }
}

/// Report applied changes the ledger file does not hold
fn unpersisted(errors: &mut Vec<EntityError>, actions: &[Action], message: &str) {
    for action in actions {
        let reported = errors.iter().any(|e| {
            e.name == action.name && matches!(e.error, ExecError::Checkpoint { .. })
        });
        if !reported {
            errors.push(EntityError {
                name: action.name.clone(),
                operation: action.operation,
                error: ExecError::Checkpoint {
                    message: message.to_string(),
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RemoteId;

    fn action(name: &str, operation: Operation) -> Action {
        Action {
            operation,
            name: name.to_string(),
            remote_id: RemoteId::from(format!("id-{name}")),
        }
    }

    #[test]
    fn unpersisted_reports_each_action_once() {
        let mut errors = vec![EntityError {
            name: "a".to_string(),
            operation: Operation::Create,
            error: ExecError::Checkpoint {
                message: "earlier".to_string(),
            },
        }];
        let actions = vec![action("a", Operation::Create), action("b", Operation::Adopt)];

        unpersisted(&mut errors, &actions, "disk full");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].name, "b");
        assert_eq!(errors[1].operation, Operation::Adopt);
        assert_eq!(
            errors[1].error,
            ExecError::Checkpoint {
                message: "disk full".to_string()
            }
        );
    }
}
