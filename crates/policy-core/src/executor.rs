//! Plan executor
//!
//! Walks a [`ReconciliationPlan`] and issues the gateway calls: deletes first,
//! then updates, then creates, so a name that is deleted and declared anew in
//! the same pass never collides with itself on the remote side.
//!
//! Every entity is independent. A failure is recorded as an [`EntityError`]
//! and the pass moves on; nothing is rolled back. The ledger is mutated the
//! moment a call succeeds and, when a [`Checkpoint`] is attached, persisted
//! right away, so the stored ledger is never ahead of what actually exists
//! remotely.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::declared::DeclaredEntity;
use crate::diff::{PlannedUpdate, ReconciliationPlan, RejectReason, RejectedChange};
use crate::gateway::{CallContext, Gateway, GatewayError, RemoteId, RemoteObject};
use crate::ledger::{Ledger, LedgerEntry};
use crate::placement::{self, PlacementError};

/// Persists the ledger after each mutation
pub trait Checkpoint {
    fn commit(&mut self, ledger: &Ledger) -> crate::Result<()>;
}

/// What was being attempted for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Conflict recovery: taking ownership of an existing remote object
    Adopt,
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Adopt => "adopt",
            Operation::Get => "get",
        };
        f.write_str(s)
    }
}

/// A ledger mutation that happened during the pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub operation: Operation,
    pub name: String,
    pub remote_id: RemoteId,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.operation, self.name, self.remote_id)
    }
}

/// Why an entity did not converge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("{0}")]
    Rejected(RejectReason),

    /// Create hit a conflict and the lookup by name found nothing
    #[error("create conflicted ({conflict}) but no remote object carries the name")]
    NoMatch { conflict: GatewayError },

    /// Create hit a conflict and the lookup by name found several objects
    #[error("create conflicted and {count} remote objects carry the name")]
    AmbiguousMatch { count: usize },

    /// Create hit a conflict and the lookup by name failed
    #[error("create conflicted and lookup by name failed: {lookup}")]
    RecoveryFailed { lookup: GatewayError },

    /// The remote object behind a ledger entry is gone; the entry was dropped
    #[error("remote object {remote_id} no longer exists; entry dropped, it will be recreated next pass")]
    Stale { remote_id: RemoteId },

    /// The plan refers to an entry the ledger no longer holds as planned
    #[error("ledger does not own {remote_id} under this name; refusing to touch it")]
    NotOwned { remote_id: RemoteId },

    /// A bulk call returned fewer outcomes than inputs
    #[error("bulk create returned no outcome for this entity")]
    MissingBulkOutcome,

    #[error("pass cancelled before this call")]
    Cancelled,

    /// The remote call succeeded but the ledger could not be persisted
    #[error("remote change applied but ledger checkpoint failed: {message}")]
    Checkpoint { message: String },
}

/// A per-entity failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation} {name}: {error}")]
pub struct EntityError {
    pub name: String,
    pub operation: Operation,
    #[source]
    pub error: ExecError,
}

/// Outcome of executing a plan
#[derive(Debug, Clone)]
pub struct Execution {
    /// The ledger after every successful mutation
    pub ledger: Ledger,
    pub actions: Vec<Action>,
    pub errors: Vec<EntityError>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Executor switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Create unordered entities with one `create_many` call
    pub bulk_create: bool,
}

/// Runs plans against a gateway
pub struct Executor<'a> {
    ctx: &'a CallContext,
    options: ExecuteOptions,
    checkpoint: Option<&'a mut dyn Checkpoint>,
}

/// Mutable state of one pass
struct Pass {
    ledger: Ledger,
    actions: Vec<Action>,
    errors: Vec<EntityError>,
}

impl Pass {
    fn fail(&mut self, name: &str, operation: Operation, error: ExecError) {
        warn!(
            collection = self.ledger.collection(),
            name,
            %operation,
            %error,
            "entity not reconciled"
        );
        self.errors.push(EntityError {
            name: name.to_string(),
            operation,
            error,
        });
    }

    fn record(&mut self, name: &str, operation: Operation, remote_id: &RemoteId) {
        info!(
            collection = self.ledger.collection(),
            name,
            remote_id = %remote_id,
            %operation,
            "applied"
        );
        self.actions.push(Action {
            operation,
            name: name.to_string(),
            remote_id: remote_id.clone(),
        });
    }
}

impl<'a> Executor<'a> {
    pub fn new(ctx: &'a CallContext) -> Self {
        Self {
            ctx,
            options: ExecuteOptions::default(),
            checkpoint: None,
        }
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: &'a mut dyn Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Execute `plan`, taking ownership of the ledger it was computed from
    /// and handing back the updated one
    pub fn execute<G: Gateway + ?Sized>(
        &mut self,
        plan: &ReconciliationPlan,
        gateway: &G,
        ledger: Ledger,
    ) -> Execution {
        let mut pass = Pass {
            ledger,
            actions: Vec::new(),
            errors: Vec::new(),
        };

        for rejected in &plan.rejected {
            self.reject(&mut pass, rejected);
        }
        for entry in &plan.deletes {
            self.delete(&mut pass, gateway, entry);
        }
        for update in &plan.updates {
            self.update(&mut pass, gateway, update);
        }

        let (bulk, single): (Vec<&DeclaredEntity>, Vec<&DeclaredEntity>) = plan
            .creates
            .iter()
            .partition(|e| self.options.bulk_create && !e.kind().is_ordered());
        if !bulk.is_empty() {
            self.create_bulk(&mut pass, gateway, &bulk);
        }
        for entity in single {
            self.create(&mut pass, gateway, entity);
        }

        Execution {
            ledger: pass.ledger,
            actions: pass.actions,
            errors: pass.errors,
        }
    }

    fn reject(&self, pass: &mut Pass, rejected: &RejectedChange) {
        pass.fail(
            &rejected.current.name,
            Operation::Update,
            ExecError::Rejected(rejected.reason.clone()),
        );
    }

    fn delete<G: Gateway + ?Sized>(&mut self, pass: &mut Pass, gateway: &G, entry: &LedgerEntry) {
        let name = entry.name.as_str();
        if !owns(&pass.ledger, entry) {
            pass.fail(
                name,
                Operation::Delete,
                ExecError::NotOwned {
                    remote_id: entry.remote_id.clone(),
                },
            );
            return;
        }
        if self.ctx.is_cancelled() {
            pass.fail(name, Operation::Delete, ExecError::Cancelled);
            return;
        }

        match gateway.delete(self.ctx, &entry.remote_id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(name, remote_id = %entry.remote_id, "already absent remotely, pruning");
            }
            Err(e) => {
                pass.fail(name, Operation::Delete, e.into());
                return;
            }
        }

        pass.ledger.remove(name);
        pass.record(name, Operation::Delete, &entry.remote_id);
        self.commit(pass, name, Operation::Delete);
    }

    fn update<G: Gateway + ?Sized>(&mut self, pass: &mut Pass, gateway: &G, update: &PlannedUpdate) {
        let entry = &update.current;
        let name = entry.name.as_str();
        if !owns(&pass.ledger, entry) {
            pass.fail(
                name,
                Operation::Update,
                ExecError::NotOwned {
                    remote_id: entry.remote_id.clone(),
                },
            );
            return;
        }
        debug!(name, fields = ?update.changed_fields, "updating");
        self.apply_update(pass, gateway, &entry.remote_id, &update.desired);
    }

    /// Update the remote object and the ledger snapshot; shared by planned
    /// updates and post-adoption convergence
    fn apply_update<G: Gateway + ?Sized>(
        &mut self,
        pass: &mut Pass,
        gateway: &G,
        remote_id: &RemoteId,
        desired: &DeclaredEntity,
    ) {
        let name = desired.name();
        if self.ctx.is_cancelled() {
            pass.fail(name, Operation::Update, ExecError::Cancelled);
            return;
        }

        match gateway.update(self.ctx, remote_id, desired) {
            Ok(()) => {
                pass.ledger
                    .replace_snapshot(name, desired.attributes().clone());
                pass.record(name, Operation::Update, remote_id);
                self.commit(pass, name, Operation::Update);
            }
            Err(e) if e.is_not_found() => {
                pass.ledger.remove(name);
                self.commit(pass, name, Operation::Update);
                pass.fail(
                    name,
                    Operation::Update,
                    ExecError::Stale {
                        remote_id: remote_id.clone(),
                    },
                );
            }
            Err(e) => pass.fail(name, Operation::Update, e.into()),
        }
    }

    fn create<G: Gateway + ?Sized>(&mut self, pass: &mut Pass, gateway: &G, entity: &DeclaredEntity) {
        let name = entity.name();
        let directive = match placement::plan_for_create(&pass.ledger, entity) {
            Ok(directive) => directive,
            Err(e) => {
                pass.fail(name, Operation::Create, e.into());
                return;
            }
        };
        if self.ctx.is_cancelled() {
            pass.fail(name, Operation::Create, ExecError::Cancelled);
            return;
        }

        if let Some(directive) = &directive {
            debug!(name, placement = %directive, "creating with placement");
        }
        let outcome = gateway.create(self.ctx, entity, directive.as_ref());
        self.settle_create(pass, gateway, entity, outcome);
    }

    fn create_bulk<G: Gateway + ?Sized>(
        &mut self,
        pass: &mut Pass,
        gateway: &G,
        entities: &[&DeclaredEntity],
    ) {
        // Names already owned would be duplicated remotely
        let (fresh, owned): (Vec<&DeclaredEntity>, Vec<&DeclaredEntity>) = entities
            .iter()
            .copied()
            .partition(|e| !pass.ledger.contains(e.name()));
        for entity in owned {
            pass.fail(
                entity.name(),
                Operation::Create,
                PlacementError::AlreadyPlaced {
                    name: entity.name().to_string(),
                }
                .into(),
            );
        }
        if fresh.is_empty() {
            return;
        }
        if self.ctx.is_cancelled() {
            for entity in fresh {
                pass.fail(entity.name(), Operation::Create, ExecError::Cancelled);
            }
            return;
        }

        let batch: Vec<DeclaredEntity> = fresh.iter().map(|e| (*e).clone()).collect();
        debug!(
            collection = pass.ledger.collection(),
            count = batch.len(),
            "bulk create"
        );

        match gateway.create_many(self.ctx, &batch) {
            Ok(mut outcomes) => {
                if outcomes.len() > batch.len() {
                    warn!(
                        expected = batch.len(),
                        received = outcomes.len(),
                        "bulk create returned extra outcomes, ignoring them"
                    );
                    outcomes.truncate(batch.len());
                }
                let mut outcomes = outcomes.into_iter();
                for entity in &batch {
                    match outcomes.next() {
                        Some(outcome) => self.settle_create(pass, gateway, entity, outcome),
                        None => pass.fail(
                            entity.name(),
                            Operation::Create,
                            ExecError::MissingBulkOutcome,
                        ),
                    }
                }
            }
            Err(e) => {
                for entity in &batch {
                    pass.fail(entity.name(), Operation::Create, e.clone().into());
                }
            }
        }
    }

    fn settle_create<G: Gateway + ?Sized>(
        &mut self,
        pass: &mut Pass,
        gateway: &G,
        entity: &DeclaredEntity,
        outcome: Result<RemoteId, GatewayError>,
    ) {
        let name = entity.name();
        match outcome {
            Ok(remote_id) => {
                pass.ledger.insert(LedgerEntry::new(
                    name,
                    remote_id.clone(),
                    entity.attributes().clone(),
                    entity.position().cloned(),
                ));
                pass.record(name, Operation::Create, &remote_id);
                self.commit(pass, name, Operation::Create);
            }
            Err(e) if e.is_conflict() => self.recover(pass, gateway, entity, e),
            Err(e) => pass.fail(name, Operation::Create, e.into()),
        }
    }

    /// A conflict on create usually means an earlier pass created the object
    /// but never recorded it. Adopt it if exactly one object has the name.
    fn recover<G: Gateway + ?Sized>(
        &mut self,
        pass: &mut Pass,
        gateway: &G,
        entity: &DeclaredEntity,
        conflict: GatewayError,
    ) {
        let name = entity.name();
        warn!(name, %conflict, "create conflicted, looking up existing object");

        if self.ctx.is_cancelled() {
            pass.fail(name, Operation::Adopt, ExecError::Cancelled);
            return;
        }

        let matches = match gateway.find_by_name(self.ctx, name) {
            Ok(matches) => matches,
            Err(lookup) => {
                pass.fail(name, Operation::Adopt, ExecError::RecoveryFailed { lookup });
                return;
            }
        };

        let found: RemoteObject = match <[RemoteObject; 1]>::try_from(matches) {
            Ok([found]) => found,
            Err(matches) if matches.is_empty() => {
                pass.fail(name, Operation::Adopt, ExecError::NoMatch { conflict });
                return;
            }
            Err(matches) => {
                pass.fail(
                    name,
                    Operation::Adopt,
                    ExecError::AmbiguousMatch {
                        count: matches.len(),
                    },
                );
                return;
            }
        };

        let snapshot = found.tracked_attributes(entity.attributes());
        let converged = &snapshot == entity.attributes();
        pass.ledger.insert(LedgerEntry::new(
            name,
            found.id.clone(),
            snapshot,
            entity.position().cloned(),
        ));
        pass.record(name, Operation::Adopt, &found.id);
        self.commit(pass, name, Operation::Adopt);

        if !converged {
            self.apply_update(pass, gateway, &found.id, entity);
        }
    }

    fn commit(&mut self, pass: &mut Pass, name: &str, operation: Operation) {
        let Some(checkpoint) = self.checkpoint.as_deref_mut() else {
            return;
        };
        if let Err(e) = checkpoint.commit(&pass.ledger) {
            pass.fail(
                name,
                operation,
                ExecError::Checkpoint {
                    message: e.to_string(),
                },
            );
        }
    }
}

/// The plan's entry still matches the ledger
fn owns(ledger: &Ledger, entry: &LedgerEntry) -> bool {
    ledger
        .get(&entry.name)
        .is_some_and(|owned| owned.remote_id == entry.remote_id)
}
