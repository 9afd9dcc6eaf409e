//! Ledger entry type
//!
//! An entry records that this system created (or adopted) one remote object
//! under a declared name, together with the attributes last applied to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::declared::Attributes;
use crate::gateway::RemoteId;
use crate::placement::PositionHint;

/// One owned remote object
///
/// Field order matters for the TOML layout: scalars first, tables last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Declared name, unique within the ledger
    pub name: String,
    /// Identifier assigned by the remote API
    pub remote_id: RemoteId,
    /// When the snapshot was last written
    pub applied_at: DateTime<Utc>,
    /// Position hint the object was created with (ordered kinds only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionHint>,
    /// Attributes as of the last successful create or update
    #[serde(default)]
    pub last_applied: Attributes,
}

impl LedgerEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        name: impl Into<String>,
        remote_id: RemoteId,
        last_applied: Attributes,
        position: Option<PositionHint>,
    ) -> Self {
        Self {
            name: name.into(),
            remote_id,
            applied_at: Utc::now(),
            position,
            last_applied,
        }
    }
}
