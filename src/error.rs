//! Error types for the indexing core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Mapping error
    #[error("Mapping error: {0}")]
    Map(#[from] MapError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning a document into rows
///
/// Both variants are absorbed at the mapping boundary: a malformed document
/// contributes zero rows, a malformed path zero rows for that dimension.
/// Neither is allowed to fail an indexing batch.
#[derive(Error, Debug)]
pub enum MapError {
    /// A document of a recognized type has a structurally required nested
    /// field that is present but unusable
    #[error("Malformed document {id}: {reason}")]
    MalformedDocument {
        /// Document id, or "?" when the id itself is unreadable
        id: String,
        /// What was wrong with the required field
        reason: String,
    },

    /// An `aggregation_paths` dimension value is not a sequence of strings
    #[error("Malformed aggregation path `{dimension}`: {reason}")]
    MalformedPath {
        /// Dimension name within `aggregation_paths`
        dimension: String,
        /// What was wrong with the value
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML parse failure
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// An enabled view name does not exist in the catalog
    #[error("Unknown view: {0}")]
    UnknownView(String),

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
