//! Error types for policy-core

use std::path::PathBuf;

use crate::declared::DeclarationError;

/// Result type for policy-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in policy-core operations
///
/// These are the failures of the surrounding machinery (configuration,
/// ledger persistence). Per-entity failures of a reconciliation pass are
/// never raised through this type; they are collected in the pass report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The declared configuration failed validation
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// Error in ledger operations
    #[error("Ledger error: {message}")]
    LedgerError { message: String },

    /// A ledger file was loaded for a different collection than requested
    #[error("Ledger belongs to collection '{found}', expected '{expected}'")]
    CollectionMismatch { expected: String, found: String },

    /// Collection names become file names and must stay within a safe alphabet
    #[error("Invalid collection name: '{name}'")]
    InvalidCollectionName { name: String },

    /// Entry not present in the ledger
    #[error("No ledger entry named '{name}' in collection '{collection}'")]
    EntryNotFound { collection: String, name: String },

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn ledger(message: impl Into<String>) -> Self {
        Self::LedgerError {
            message: message.into(),
        }
    }
}
