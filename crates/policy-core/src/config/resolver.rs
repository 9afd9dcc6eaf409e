//! Configuration resolution with local overrides
//!
//! The `ConfigResolver` loads a manifest, merges the optional local override
//! file over its `[core]` section, anchors relative paths at the manifest's
//! directory, and validates the declared objects.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::manifest::Manifest;
use crate::declared::DeclaredCollection;
use crate::{Error, Result};

/// The final resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Manifest the configuration was loaded from
    pub manifest_path: PathBuf,
    /// Ledger directory, anchored at the manifest's directory
    pub state_dir: PathBuf,
    /// Use bulk creation for unordered kinds
    pub bulk_create: bool,
    /// Validated declarations, one collection per kind
    pub collections: Vec<DeclaredCollection>,
}

impl ResolvedConfig {
    /// Collection by name, e.g. `"networks"`
    pub fn collection(&self, name: &str) -> Option<&DeclaredCollection> {
        self.collections.iter().find(|c| c.name() == name)
    }
}

/// Overrides accepted from the local file; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalOverrides {
    #[serde(default)]
    core: CoreOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoreOverrides {
    state_dir: Option<PathBuf>,
    bulk_create: Option<bool>,
}

/// Resolves configuration from a manifest and its local override file
pub struct ConfigResolver {
    manifest_path: PathBuf,
}

impl ConfigResolver {
    /// Create a resolver for the manifest at `manifest_path`
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Path of the local override file: `policy.toml` → `policy.local.toml`
    pub fn local_path(&self) -> PathBuf {
        let stem = self
            .manifest_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "policy".to_string());
        self.manifest_path.with_file_name(format!("{stem}.local.toml"))
    }

    fn base_dir(&self) -> PathBuf {
        match self.manifest_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Load, merge and validate
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, either file fails to
    /// parse, or a declaration is invalid.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if !self.manifest_path.exists() {
            return Err(Error::ConfigNotFound {
                path: self.manifest_path.clone(),
            });
        }

        let content = fs::read_to_string(&self.manifest_path)?;
        let mut manifest = Manifest::parse(&content)?;

        let local_path = self.local_path();
        if local_path.exists() {
            debug!(path = %local_path.display(), "applying local overrides");
            let overrides: LocalOverrides = toml::from_str(&fs::read_to_string(&local_path)?)?;
            if let Some(state_dir) = overrides.core.state_dir {
                manifest.core.state_dir = state_dir;
            }
            if let Some(bulk_create) = overrides.core.bulk_create {
                manifest.core.bulk_create = bulk_create;
            }
        }

        let state_dir = if manifest.core.state_dir.is_absolute() {
            manifest.core.state_dir.clone()
        } else {
            self.base_dir().join(&manifest.core.state_dir)
        };

        Ok(ResolvedConfig {
            manifest_path: self.manifest_path.clone(),
            state_dir,
            bulk_create: manifest.core.bulk_create,
            collections: manifest.collections()?,
        })
    }
}
