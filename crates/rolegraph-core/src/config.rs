use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StoreError;
use crate::model::name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub tables: TableNames,
    /// Delimiter used to serialize visited-name sets. Item names may never
    /// contain it.
    #[serde(default = "default_separator")]
    pub separator: char,
    /// Upper bound on rounds for the iterative traversal. `None` walks to
    /// the bottom of the hierarchy.
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// Whether the schema declares cascading foreign keys. When false, or
    /// when the engine does not enforce foreign keys, dependent rows are
    /// rewritten explicitly.
    #[serde(default = "default_true")]
    pub cascade: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tables: TableNames::default(),
            separator: default_separator(),
            max_depth: None,
            cascade: default_true(),
        }
    }
}

impl StoreConfig {
    /// Check table names and the separator before any statement is built.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid table name or
    /// separator.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.tables.validate()?;
        name::validate_separator(self.separator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    #[serde(default = "default_items_table")]
    pub items: String,
    #[serde(default = "default_children_table")]
    pub children: String,
    #[serde(default = "default_assignments_table")]
    pub assignments: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            items: default_items_table(),
            children: default_children_table(),
            assignments: default_assignments_table(),
        }
    }
}

impl TableNames {
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for the first invalid name.
    pub fn validate(&self) -> Result<(), StoreError> {
        name::validate_table_name(&self.items)?;
        name::validate_table_name(&self.children)?;
        name::validate_table_name(&self.assignments)
    }
}

/// Load the store config from a TOML file.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or holds an
/// invalid table name or separator.
pub fn load_config(path: &Path) -> Result<StoreConfig> {
    if !path.exists() {
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<StoreConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid store config in {}", path.display()))?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_separator() -> char {
    ','
}

fn default_items_table() -> String {
    "rbac_item".to_string()
}

fn default_children_table() -> String {
    "rbac_item_child".to_string()
}

fn default_assignments_table() -> String {
    "rbac_assignment".to_string()
}
