//! Reconciler for coordinating declared state, the ledger store and a gateway
//!
//! This module provides:
//! - **collections**: Every collection a pass must cover, including stored
//!   ledgers whose kind is no longer declared
//! - **plan**: Diff a declared collection against its stored ledger
//! - **apply**: Execute that plan under the collection lock, checkpointing
//!   the ledger after every remote mutation
//! - **verify**: Confirm the ledger's remote objects still exist and prune
//!   the ones that don't

mod engine;
mod verify;

pub use engine::{ApplyReport, ReconcileOptions, Reconciler};
pub use verify::{VerifyReport, VerifyStatus};
