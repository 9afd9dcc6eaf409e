//! Builders for declared entities.
//!
//! All builders panic on invalid input: they are meant for tests, where a
//! bad fixture should fail loudly.

use policy_core::{Attributes, DeclaredCollection, DeclaredEntity, EntityKind, PositionHint};
use serde_json::Value;

/// Converts a `json!({...})` object into an attribute map.
///
/// # Panics
/// Panics if `value` is not a JSON object.
pub fn attrs(value: Value) -> Attributes {
    serde_json::from_value(value)
        .unwrap_or_else(|e| panic!("attrs: expected a JSON object: {e}"))
}

/// A validated entity of any kind.
///
/// # Panics
/// Panics if the declaration is invalid.
pub fn entity(kind: EntityKind, name: &str, attributes: Value) -> DeclaredEntity {
    DeclaredEntity::new(kind, name, attrs(attributes))
        .unwrap_or_else(|e| panic!("entity: invalid declaration for {name}: {e}"))
}

/// A network object with a single `value` attribute.
pub fn network(name: &str, value: &str) -> DeclaredEntity {
    entity(EntityKind::Network, name, serde_json::json!({ "value": value }))
}

/// A host object with a single `value` attribute.
pub fn host(name: &str, value: &str) -> DeclaredEntity {
    entity(EntityKind::Host, name, serde_json::json!({ "value": value }))
}

/// An access rule with an `action` attribute and an optional position hint.
///
/// # Panics
/// Panics if the hint is invalid.
pub fn rule(name: &str, action: &str, position: Option<PositionHint>) -> DeclaredEntity {
    let rule = entity(EntityKind::AccessRule, name, serde_json::json!({ "action": action }));
    match position {
        Some(hint) => rule
            .with_position(hint)
            .unwrap_or_else(|e| panic!("rule: invalid position for {name}: {e}")),
        None => rule,
    }
}

/// A collection of entities of `kind`.
///
/// # Panics
/// Panics if kinds disagree or names repeat.
pub fn collection(kind: EntityKind, entities: Vec<DeclaredEntity>) -> DeclaredCollection {
    DeclaredCollection::new(kind, entities)
        .unwrap_or_else(|e| panic!("collection: invalid collection: {e}"))
}
