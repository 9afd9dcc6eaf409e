//! Reconciliation core for Policy Reconciler
//!
//! An operator declares named objects (networks, hosts, ports, devices,
//! ordered access rules); this crate converges a remote policy-management API
//! to that declaration. The remote API assigns its own opaque IDs, so the
//! crate keeps a ledger of what it created and works out the minimal set of
//! creates, updates and deletes on every pass.
//!
//! - **Declared model**: validated desired state ([`DeclaredEntity`], [`DeclaredCollection`])
//! - **Ledger system**: name → remote ID records persisted per collection ([`Ledger`], [`LedgerStore`])
//! - **Differ**: name-aligned three-way comparison ([`diff`], [`ReconciliationPlan`])
//! - **Placement**: creation-only positioning of ordered entities ([`placement`])
//! - **Executor**: per-entity, incrementally checkpointed plan execution ([`Executor`])
//! - **Reconciler**: lock, load, diff, execute, save ([`Reconciler`])
//!
//! # Architecture
//!
//! ```text
//!   policy.toml ──► config ──► DeclaredCollection ─┐
//!                                                  ├─► diff ──► ReconciliationPlan
//!   LedgerStore ──► Ledger ────────────────────────┘                │
//!        ▲                                                          ▼
//!        └──────────── checkpoint ◄──── Executor ──► placement ──► Gateway
//! ```
//!
//! The [`Gateway`] (the HTTP client of the remote API) is supplied by the
//! caller.
//!
//! # Example
//!
//! ```ignore
//! use policy_core::{CallContext, ConfigResolver, Reconciler};
//!
//! let config = ConfigResolver::new("policy.toml").resolve()?;
//! let mut reconciler = Reconciler::from_config(&config);
//! for collection in reconciler.collections(&config.collections)? {
//!     let report = reconciler.apply(&collection, &gateway, &CallContext::new())?;
//!     for error in &report.errors {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

pub mod config;
pub mod declared;
pub mod diff;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod placement;
pub mod sync;

pub use config::{ConfigResolver, Manifest, ResolvedConfig};
pub use declared::{Attributes, DeclarationError, DeclaredCollection, DeclaredEntity, EntityKind};
pub use diff::{PlanSummary, PlannedUpdate, ReconciliationPlan, RejectReason, RejectedChange, diff};
pub use error::{Error, Result};
pub use executor::{
    Action, Checkpoint, EntityError, ExecError, ExecuteOptions, Execution, Executor, Operation,
};
pub use gateway::{
    CallContext, CancelHandle, Gateway, GatewayError, GatewayErrorKind, GatewayResult, RemoteId,
    RemoteObject, WireEntity,
};
pub use ledger::{CollectionLock, Ledger, LedgerEntry, LedgerStore};
pub use placement::{PlacementDirective, PlacementError, PositionHint, Section};
pub use sync::{ApplyReport, ReconcileOptions, Reconciler, VerifyReport, VerifyStatus};
