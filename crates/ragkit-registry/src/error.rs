//! Error types for the plugin registry.

use ragkit::core::PluginCategory;
use thiserror::Error;

/// Registry result type.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur in registry operations.
///
/// Every validation failure surfaces at registration time; lookups can only
/// fail with [`RegistryError::NotFound`] or [`RegistryError::UnknownCategory`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The category string names no known stage category.
    #[error("Unknown plugin category: {0}")]
    UnknownCategory(String),

    /// A required argument was empty or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The plugin does not satisfy its category contract. The reason names
    /// the first violation (e.g. the first missing method).
    #[error("Plugin '{plugin}' violates its contract: {reason}")]
    ContractViolation {
        /// The offending plugin name.
        plugin: String,
        /// Human-readable description of the first violation.
        reason: String,
    },

    /// Manifest signature verification failed in fail-closed mode.
    #[error("Signature verification failed for plugin '{plugin}': {reason}")]
    SignatureInvalid {
        /// The plugin whose manifest failed verification.
        plugin: String,
        /// Verifier-reported reason.
        reason: String,
    },

    /// No plugin is registered under `(category, name)`.
    #[error("Plugin not found: {category}/{name}")]
    NotFound {
        /// The requested category.
        category: PluginCategory,
        /// The requested plugin name.
        name: String,
    },

    /// A contract document failed JSON-Schema validation (fatal only in
    /// development; in production the contract is skipped).
    #[error("Contract document rejected by schema: {0}")]
    ContractSchemaInvalid(String),

    /// A version string is not valid semver.
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Reading trusted keys or contract files failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

impl From<semver::Error> for RegistryError {
    fn from(err: semver::Error) -> Self {
        RegistryError::InvalidVersion(err.to_string())
    }
}
