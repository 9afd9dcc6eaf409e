//! Positional insertion planning for ordered entities
//!
//! Ordered kinds (access rules) live in a 1-indexed list on the remote side.
//! The remote API does not take a position as an attribute; it takes query
//! parameters on the *creation* request only. A declared [`PositionHint`] is
//! therefore turned into a [`PlacementDirective`] exactly once, when the
//! entity is created, and never again. Moving an existing rule means deleting
//! and recreating it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::declared::{DeclaredEntity, EntityKind};
use crate::ledger::Ledger;

/// Rule section of an ordered policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Mandatory,
    Default,
    BeforeAuto,
    AfterAuto,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Mandatory => "mandatory",
            Section::Default => "default",
            Section::BeforeAuto => "before_auto",
            Section::AfterAuto => "after_auto",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative placement as declared by the operator
///
/// Indices are signed so that a bad value in configuration is reported by
/// the planner instead of failing deserialization with a less useful message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_before: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_after: Option<i64>,
}

/// Where to insert relative to an existing 1-based index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Before(u32),
    After(u32),
}

/// The absolute placement sent with a single creation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementDirective {
    section: Option<Section>,
    category: Option<String>,
    insertion: Option<Insertion>,
}

impl PlacementDirective {
    pub fn section(&self) -> Option<Section> {
        self.section
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn insertion(&self) -> Option<Insertion> {
        self.insertion
    }

    pub fn insert_before(&self) -> Option<u32> {
        match self.insertion {
            Some(Insertion::Before(index)) => Some(index),
            _ => None,
        }
    }

    pub fn insert_after(&self) -> Option<u32> {
        match self.insertion {
            Some(Insertion::After(index)) => Some(index),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.section.is_none() && self.category.is_none() && self.insertion.is_none()
    }

    /// Query parameters in their fixed precedence order:
    /// `section`, `category`, then `insertBefore` or `insertAfter`.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(section) = self.section {
            pairs.push(("section", section.as_str().to_string()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        match self.insertion {
            Some(Insertion::Before(index)) => pairs.push(("insertBefore", index.to_string())),
            Some(Insertion::After(index)) => pairs.push(("insertAfter", index.to_string())),
            None => {}
        }
        pairs
    }

    /// The `&`-joined query string, empty when there is nothing to send
    ///
    /// Values are emitted as-is; percent-encoding is the transport's job.
    pub fn query_string(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append the query string to a request path
    pub fn apply_to_path(&self, path: &str) -> String {
        if self.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{}", self.query_string())
        }
    }
}

impl fmt::Display for PlacementDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_string())
    }
}

/// Why a hint could not become a directive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("insert_before ({before}) and insert_after ({after}) are mutually exclusive")]
    Ambiguous { before: i64, after: i64 },

    #[error("{field} must be a positive index, got {value}")]
    NonPositiveIndex { field: &'static str, value: i64 },

    #[error("{field} index {value} is out of range")]
    IndexOutOfRange { field: &'static str, value: i64 },

    #[error("category must not be empty")]
    EmptyCategory,

    #[error("{kind} entities are unordered and take no position")]
    Unordered { kind: EntityKind },

    #[error("'{name}' is already placed; delete and recreate it to move it")]
    AlreadyPlaced { name: String },
}

/// Turn a position hint into a placement directive
///
/// # Errors
///
/// Rejects both insertion indices at once, non-positive or oversized
/// indices, and an empty category.
pub fn plan(hint: &PositionHint) -> Result<PlacementDirective, PlacementError> {
    let insertion = match (hint.insert_before, hint.insert_after) {
        (Some(before), Some(after)) => return Err(PlacementError::Ambiguous { before, after }),
        (Some(before), None) => Some(Insertion::Before(index("insert_before", before)?)),
        (None, Some(after)) => Some(Insertion::After(index("insert_after", after)?)),
        (None, None) => None,
    };

    let category = match &hint.category {
        Some(category) if category.trim().is_empty() => return Err(PlacementError::EmptyCategory),
        Some(category) => Some(category.clone()),
        None => None,
    };

    Ok(PlacementDirective {
        section: hint.section,
        category,
        insertion,
    })
}

fn index(field: &'static str, value: i64) -> Result<u32, PlacementError> {
    if value <= 0 {
        return Err(PlacementError::NonPositiveIndex { field, value });
    }
    u32::try_from(value).map_err(|_| PlacementError::IndexOutOfRange { field, value })
}

/// Plan the directive for creating `entity`
///
/// Returns `Ok(None)` when there is nothing to place: unordered kinds, or an
/// ordered entity declared without a hint (the remote side appends it).
///
/// # Errors
///
/// Refuses entities that already have a ledger entry: a placed entity has no
/// transition to a new position.
pub fn plan_for_create(
    ledger: &Ledger,
    entity: &DeclaredEntity,
) -> Result<Option<PlacementDirective>, PlacementError> {
    if ledger.contains(entity.name()) {
        return Err(PlacementError::AlreadyPlaced {
            name: entity.name().to_string(),
        });
    }

    match entity.position() {
        None => Ok(None),
        Some(_) if !entity.kind().is_ordered() => Err(PlacementError::Unordered {
            kind: entity.kind(),
        }),
        Some(hint) => plan(hint).map(Some),
    }
}
