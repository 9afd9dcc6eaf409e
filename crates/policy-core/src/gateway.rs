//! Remote object gateway contract
//!
//! The gateway is the client of the remote policy-management API for one
//! entity kind. This crate does not implement it: sessions, tokens, TLS and
//! HTTP live with the caller. What the core needs from an implementation is
//! captured here, most importantly a *classified* error so the executor can
//! branch on NotFound / Conflict without inspecting message text.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::declared::{Attributes, DeclaredEntity};
use crate::placement::PlacementDirective;

/// Identifier assigned by the remote API
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request body shape: `{"name": .., "type": .., <attributes>}`
#[derive(Debug, Serialize)]
pub struct WireEntity<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub attributes: &'a Attributes,
}

impl<'a> From<&'a DeclaredEntity> for WireEntity<'a> {
    fn from(entity: &'a DeclaredEntity) -> Self {
        Self {
            name: entity.name(),
            kind: entity.kind().wire_type(),
            attributes: entity.attributes(),
        }
    }
}

/// Response body shape: the request shape plus `"id"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: RemoteId,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl RemoteObject {
    /// The remote values of the fields `declared` tracks
    ///
    /// Server-side fields the operator never declared (links, metadata)
    /// are dropped so they cannot show up as differences.
    pub fn tracked_attributes(&self, declared: &Attributes) -> Attributes {
        self.attributes
            .iter()
            .filter(|(key, _)| declared.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Classification of a gateway failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// The target remote object does not exist
    NotFound,
    /// The name or value already exists remotely under another ID
    Conflict,
    /// The request was malformed
    Validation,
    /// The API could not be reached or refused the session
    Transport,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayErrorKind::NotFound => "not found",
            GatewayErrorKind::Conflict => "conflict",
            GatewayErrorKind::Validation => "validation",
            GatewayErrorKind::Transport => "transport",
        };
        f.write_str(s)
    }
}

/// A classified gateway failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    kind: GatewayErrorKind,
    message: String,
    status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Validation, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Transport, message)
    }

    /// Classify an HTTP response status
    ///
    /// 404 is NotFound, 409 is Conflict, 400 and 422 are Validation, and
    /// everything else (auth failures, throttling, 5xx) is Transport.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => GatewayErrorKind::NotFound,
            409 => GatewayErrorKind::Conflict,
            400 | 422 => GatewayErrorKind::Validation,
            _ => GatewayErrorKind::Transport,
        };
        Self {
            kind,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn kind(&self) -> GatewayErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == GatewayErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == GatewayErrorKind::Conflict
    }
}

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Deadline and cancellation for the calls of one pass
///
/// Clones share the cancellation flag, so a [`CancelHandle`] taken before
/// the pass starts can stop it from another thread.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancelled or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Cancels the [`CallContext`] it was taken from
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Client of the remote API for one entity kind
///
/// Every call blocks until it returns and should honour `ctx`.
/// Implementations must not retry `create` on their own unless they can tell
/// the first attempt never reached the server.
pub trait Gateway {
    /// Create an object; `directive` is only sent for ordered kinds
    fn create(
        &self,
        ctx: &CallContext,
        entity: &DeclaredEntity,
        directive: Option<&PlacementDirective>,
    ) -> GatewayResult<RemoteId>;

    fn get(&self, ctx: &CallContext, id: &RemoteId) -> GatewayResult<RemoteObject>;

    /// Replace the attributes of an existing object; never repositions it
    fn update(&self, ctx: &CallContext, id: &RemoteId, entity: &DeclaredEntity)
    -> GatewayResult<()>;

    fn delete(&self, ctx: &CallContext, id: &RemoteId) -> GatewayResult<()>;

    /// All remote objects carrying `name`; zero, one or several
    fn find_by_name(&self, ctx: &CallContext, name: &str) -> GatewayResult<Vec<RemoteObject>>;

    /// Bulk create
    ///
    /// The outer error means the call as a whole failed. Otherwise the
    /// result holds one outcome per input, in input order; a batch may
    /// partially succeed.
    fn create_many(
        &self,
        ctx: &CallContext,
        entities: &[DeclaredEntity],
    ) -> GatewayResult<Vec<GatewayResult<RemoteId>>>;
}
