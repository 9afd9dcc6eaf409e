//! Declared entities: the desired state handed to a reconciliation pass
//!
//! Everything in this module is validated once, at construction. The differ,
//! executor and placement planner only ever see values that passed these
//! checks, so they never re-validate names, attribute shapes or position
//! hints.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::placement::{self, PlacementError, PositionHint};

/// Opaque attribute map of a declared entity
///
/// A `BTreeMap` keeps iteration (and therefore serialization and field
/// comparison) in key order.
pub type Attributes = BTreeMap<String, Value>;

/// Attribute keys that belong to the wire envelope rather than to the entity
const RESERVED_KEYS: [&str; 3] = ["name", "type", "id"];

/// The kinds of remote objects a collection can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Network,
    Host,
    Port,
    Range,
    Device,
    AccessRule,
}

impl EntityKind {
    /// Every kind, in a stable order
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Network,
        EntityKind::Host,
        EntityKind::Port,
        EntityKind::Range,
        EntityKind::Device,
        EntityKind::AccessRule,
    ];

    /// Name of the collection (and ledger) holding entities of this kind
    pub fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Network => "networks",
            EntityKind::Host => "hosts",
            EntityKind::Port => "ports",
            EntityKind::Range => "ranges",
            EntityKind::Device => "devices",
            EntityKind::AccessRule => "access_rules",
        }
    }

    /// Value of the `type` field in the wire representation
    pub fn wire_type(self) -> &'static str {
        match self {
            EntityKind::Network => "Network",
            EntityKind::Host => "Host",
            EntityKind::Port => "ProtocolPortObject",
            EntityKind::Range => "Range",
            EntityKind::Device => "Device",
            EntityKind::AccessRule => "AccessRule",
        }
    }

    /// Whether the remote API keeps these objects in a strict order
    ///
    /// Only ordered kinds accept position hints.
    pub fn is_ordered(self) -> bool {
        matches!(self, EntityKind::AccessRule)
    }

    /// Reverse of [`EntityKind::collection_name`]
    pub fn from_collection_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection_name() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Network => "network",
            EntityKind::Host => "host",
            EntityKind::Port => "port",
            EntityKind::Range => "range",
            EntityKind::Device => "device",
            EntityKind::AccessRule => "access_rule",
        };
        f.write_str(s)
    }
}

/// Reasons a declaration is refused at the boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    #[error("Entity name must not be empty")]
    EmptyName,

    #[error("Duplicate name '{name}' in collection '{collection}'")]
    DuplicateName { collection: String, name: String },

    #[error("Attribute '{key}' of '{name}' is reserved")]
    ReservedAttribute { name: String, key: String },

    #[error("Attribute '{key}' of '{name}' is null; omit the key instead")]
    NullAttribute { name: String, key: String },

    #[error("Attribute '{key}' of '{name}' holds a number outside the signed 64-bit range")]
    NumberOutOfRange { name: String, key: String },

    #[error("Entity '{name}' is a {found}, but collection '{collection}' holds {expected}")]
    KindMismatch {
        collection: String,
        name: String,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Invalid position for '{name}': {source}")]
    Position {
        name: String,
        #[source]
        source: PlacementError,
    },
}

/// One item of the desired configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredEntity {
    name: String,
    kind: EntityKind,
    attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<PositionHint>,
}

impl DeclaredEntity {
    /// Create a validated entity without a position hint
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, an attribute key is reserved
    /// for the wire envelope, or an attribute value contains a null or a
    /// number the ledger file cannot store.
    pub fn new(
        kind: EntityKind,
        name: impl Into<String>,
        attributes: Attributes,
    ) -> Result<Self, DeclarationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DeclarationError::EmptyName);
        }

        for (key, value) in &attributes {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(DeclarationError::ReservedAttribute {
                    name,
                    key: key.clone(),
                });
            }
            if contains_null(value) {
                return Err(DeclarationError::NullAttribute {
                    name,
                    key: key.clone(),
                });
            }
            if contains_wide_number(value) {
                return Err(DeclarationError::NumberOutOfRange {
                    name,
                    key: key.clone(),
                });
            }
        }

        Ok(Self {
            name,
            kind,
            attributes,
            position: None,
        })
    }

    /// Attach a one-time position hint
    ///
    /// The hint is run through the placement planner here so that an invalid
    /// combination never reaches a reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is unordered or the hint is invalid.
    pub fn with_position(mut self, hint: PositionHint) -> Result<Self, DeclarationError> {
        if !self.kind.is_ordered() {
            return Err(DeclarationError::Position {
                name: self.name,
                source: PlacementError::Unordered { kind: self.kind },
            });
        }
        if let Err(source) = placement::plan(&hint) {
            return Err(DeclarationError::Position {
                name: self.name,
                source,
            });
        }
        self.position = Some(hint);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn position(&self) -> Option<&PositionHint> {
        self.position.as_ref()
    }
}

fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}

/// TOML integers are signed 64-bit and its floats are finite
fn contains_wide_number(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.as_i64().is_none() && (n.is_u64() || !n.as_f64().is_some_and(f64::is_finite))
        }
        Value::Array(items) => items.iter().any(contains_wide_number),
        Value::Object(map) => map.values().any(contains_wide_number),
        _ => false,
    }
}

/// A validated, name-unique list of entities of a single kind
///
/// Declaration order is preserved; it only matters for display, since the
/// differ aligns by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredCollection {
    kind: EntityKind,
    entities: Vec<DeclaredEntity>,
}

impl DeclaredCollection {
    /// Build a collection, checking kinds and name uniqueness
    ///
    /// # Errors
    ///
    /// Returns an error if an entity has a different kind or a name repeats.
    pub fn new(kind: EntityKind, entities: Vec<DeclaredEntity>) -> Result<Self, DeclarationError> {
        let collection = kind.collection_name();
        let mut seen = HashSet::new();

        for entity in &entities {
            if entity.kind != kind {
                return Err(DeclarationError::KindMismatch {
                    collection: collection.to_string(),
                    name: entity.name.clone(),
                    expected: kind,
                    found: entity.kind,
                });
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(DeclarationError::DuplicateName {
                    collection: collection.to_string(),
                    name: entity.name.clone(),
                });
            }
        }

        Ok(Self { kind, entities })
    }

    /// An empty collection: applying it deletes everything the ledger owns
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.collection_name()
    }

    pub fn entities(&self) -> &[DeclaredEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DeclaredEntity> {
        self.entities.iter().find(|e| e.name == name)
    }
}
