//! Manifest parsing for policy.toml files

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use crate::declared::{Attributes, DeclaredCollection, DeclaredEntity, EntityKind};
use crate::placement::PositionHint;

fn default_state_dir() -> PathBuf {
    PathBuf::from(".policy")
}

/// Core configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSection {
    /// Directory holding the ledgers, relative to the manifest
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Use bulk creation for unordered kinds
    #[serde(default)]
    pub bulk_create: bool,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            bulk_create: false,
        }
    }
}

/// One declared object as written in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDecl {
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionHint>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ObjectDecl {
    /// Validate into a [`DeclaredEntity`]
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is invalid.
    pub fn to_entity(&self) -> Result<DeclaredEntity> {
        let entity = DeclaredEntity::new(self.kind, self.name.clone(), self.attributes.clone())?;
        match &self.position {
            Some(hint) => Ok(entity.with_position(hint.clone())?),
            None => Ok(entity),
        }
    }
}

/// Desired-state manifest parsed from policy.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Core settings
    #[serde(default)]
    pub core: CoreSection,

    /// Declared objects of every kind, in declaration order
    #[serde(default)]
    pub objects: Vec<ObjectDecl>,
}

impl Manifest {
    /// Parse a manifest from TOML content
    ///
    /// # Example
    ///
    /// ```
    /// use policy_core::config::Manifest;
    ///
    /// let manifest = Manifest::parse(r#"
    /// [[objects]]
    /// kind = "host"
    /// name = "web"
    /// attributes = { value = "10.0.0.1" }
    /// "#).unwrap();
    ///
    /// assert_eq!(manifest.objects.len(), 1);
    /// assert_eq!(manifest.core.state_dir.to_str(), Some(".policy"));
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        Ok(manifest)
    }

    /// Create an empty manifest with default values
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate the declarations and group them by kind
    ///
    /// Collections come out in the order their kind first appears; within a
    /// collection, declaration order is kept.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn collections(&self) -> Result<Vec<DeclaredCollection>> {
        let mut grouped: Vec<(EntityKind, Vec<DeclaredEntity>)> = Vec::new();
        for decl in &self.objects {
            let entity = decl.to_entity()?;
            match grouped.iter_mut().find(|(kind, _)| *kind == decl.kind) {
                Some((_, entities)) => entities.push(entity),
                None => grouped.push((decl.kind, vec![entity])),
            }
        }

        grouped
            .into_iter()
            .map(|(kind, entities)| DeclaredCollection::new(kind, entities).map_err(Error::from))
            .collect()
    }
}
