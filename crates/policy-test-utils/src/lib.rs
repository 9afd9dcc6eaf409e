//! Shared test utilities for the policy-reconciler workspace.
//!
//! This crate provides standardised fixtures so the crate test suites do not
//! each grow their own remote stub. It is a dev-dependency only and is
//! never published.
//!
//! # Modules
//!
//! - [`gateway`]: [`FakeGateway`], an in-memory remote API with a call log
//!   and fault injection
//! - [`entities`]: builders for declared entities and collections

pub mod entities;
pub mod gateway;

pub use gateway::{Call, CallKind, FakeGateway};
