//! Migration options
//!
//! Everything the workbook does not decide on its own: which table of the
//! target model receives the measures, how field names are matched, and the
//! display format given to new measures. Options come from an optional YAML
//! file and are then overridden by CLI flags.

use crate::error::MigrateResult;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default display format for injected measures
pub const DEFAULT_FORMAT_STRING: &str = "General";

/// Rule for picking the destination table in the target semantic model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetTable {
    /// First table in document order
    #[default]
    First,
    /// A table with exactly this name
    Named(String),
    /// The table named after each measure's data source, else the first table
    MatchDatasource,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Destination table name. `None` selects the first table.
    pub target_table: Option<String>,
    /// Route each measure to the table named after its data source
    pub match_datasource_tables: bool,
    pub format_string: String,
    /// Resolve `[field]` references ignoring ASCII case
    pub case_insensitive_fields: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            target_table: None,
            match_datasource_tables: false,
            format_string: DEFAULT_FORMAT_STRING.to_string(),
            case_insensitive_fields: false,
        }
    }
}

impl MigrationOptions {
    /// Load options from a YAML file
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> MigrateResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the table-selection rule. A named table beats datasource matching.
    pub fn target(&self) -> TargetTable {
        match (&self.target_table, self.match_datasource_tables) {
            (Some(name), _) => TargetTable::Named(name.clone()),
            (None, true) => TargetTable::MatchDatasource,
            (None, false) => TargetTable::First,
        }
    }
}
