//! Configuration for the indexing pipeline
//!
//! TOML-backed configuration with serde defaults. Two concerns live here:
//!
//! - the **schema table** (`[schema]`): which field names the document
//!   decoder accepts. The source platform drifted across versions
//!   (`entity` vs `entity_backing_field`, submission-nested vs top-level
//!   `form_code`); the table lists accepted aliases in priority order so
//!   one decoder replaces parallel mapper variants.
//! - the **view set** (`[views]`): which catalog views an index builds.
//!
//! # Example
//!
//! ```rust
//! use rollup_index::config::IndexConfig;
//!
//! let config = IndexConfig::from_toml_str(
//!     r#"
//!     [schema]
//!     entity_aliases = ["entity"]
//!
//!     [views]
//!     enabled = ["by_values", "weekly_aggregate_stats"]
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.views.enabled.as_deref(), Some(&["by_values".to_string(),
//!     "weekly_aggregate_stats".to_string()][..]));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Field-name table for document decoding
    #[serde(default)]
    pub schema: SchemaConfig,

    /// View selection
    #[serde(default)]
    pub views: ViewsConfig,
}

/// Field-name table consulted by the document decoder
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Accepted names for the embedded entity reference, in priority order
    #[serde(default = "default_entity_aliases")]
    pub entity_aliases: Vec<String>,

    /// Read `form_code` from the nested submission reference
    #[serde(default = "default_true")]
    pub form_code_from_submission: bool,

    /// Fall back to a top-level `form_code` field
    #[serde(default = "default_true")]
    pub accept_top_level_form_code: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            entity_aliases: default_entity_aliases(),
            form_code_from_submission: true,
            accept_top_level_form_code: true,
        }
    }
}

/// View selection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ViewsConfig {
    /// Names of catalog views to build; `None` means the full catalog
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
}

impl IndexConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

fn default_entity_aliases() -> Vec<String> {
    vec!["entity".to_string(), "entity_backing_field".to_string()]
}

fn default_true() -> bool {
    true
}
