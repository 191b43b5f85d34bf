//! Field-name resolution context
//!
//! Decides what a bracketed reference denotes inside a given data source:
//! another calculation (referenced as a measure) or a raw column (referenced
//! through its table). Lookups are keyed by data source name plus field
//! name; nothing holds pointers into the metadata.

use super::parser::FieldRef;
use super::TranslateError;
use crate::types::{field_key, WorkbookMetadata};
use std::collections::HashMap;

/// What a reference resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Raw column, needs a table-qualified reference
    Column {
        table: String,
        column: String,
        datatype: Option<String>,
    },
    /// Another calculation, referenced by its measure name
    Measure {
        datasource: String,
        key: String,
        measure: String,
        datatype: Option<String>,
    },
}

impl Resolved {
    pub fn datatype(&self) -> Option<&str> {
        match self {
            Resolved::Column { datatype, .. } | Resolved::Measure { datatype, .. } => {
                datatype.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct FieldEntry {
    name: String,
    datatype: Option<String>,
    measure: Option<String>,
}

#[derive(Debug, Clone)]
struct SourceScope {
    name: String,
    table: String,
    columns: HashMap<String, FieldEntry>,
    calculations: HashMap<String, FieldEntry>,
}

/// Known fields per data source
#[derive(Debug, Clone, Default)]
pub struct FieldResolver {
    sources: Vec<SourceScope>,
    case_insensitive: bool,
}

impl FieldResolver {
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            sources: Vec::new(),
            case_insensitive,
        }
    }

    /// Build the context for every data source and calculation in a workbook
    pub fn from_metadata(metadata: &WorkbookMetadata, case_insensitive: bool) -> Self {
        let mut resolver = Self::new(case_insensitive);

        for ds in &metadata.data_sources {
            resolver.add_source(&ds.name, ds.display_name());
            for column in &ds.columns {
                resolver.add_column(&ds.name, &column.name, column.datatype.as_deref());
            }
        }

        for calc in &metadata.calculations {
            resolver.add_calculation(
                &calc.datasource,
                &calc.name,
                &calc.measure_name(),
                calc.datatype.as_deref(),
            );
        }

        resolver
    }

    fn key(&self, name: &str) -> String {
        let key = field_key(name);
        if self.case_insensitive {
            key.to_ascii_lowercase()
        } else {
            key.to_string()
        }
    }

    fn source_index(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| {
            if self.case_insensitive {
                s.name.eq_ignore_ascii_case(name)
            } else {
                s.name == name
            }
        })
    }

    fn scope_mut(&mut self, datasource: &str) -> &mut SourceScope {
        let index = match self.source_index(datasource) {
            Some(index) => index,
            None => {
                self.sources.push(SourceScope {
                    name: datasource.to_string(),
                    table: datasource.to_string(),
                    columns: HashMap::new(),
                    calculations: HashMap::new(),
                });
                self.sources.len() - 1
            }
        };
        &mut self.sources[index]
    }

    /// Register a data source and the table its columns live in
    pub fn add_source(&mut self, datasource: &str, table: &str) {
        self.scope_mut(datasource).table = table.to_string();
    }

    pub fn add_column(&mut self, datasource: &str, name: &str, datatype: Option<&str>) {
        let key = self.key(name);
        let entry = FieldEntry {
            name: field_key(name).to_string(),
            datatype: datatype.map(str::to_string),
            measure: None,
        };
        self.scope_mut(datasource).columns.entry(key).or_insert(entry);
    }

    pub fn add_calculation(
        &mut self,
        datasource: &str,
        name: &str,
        measure: &str,
        datatype: Option<&str>,
    ) {
        let key = self.key(name);
        let entry = FieldEntry {
            name: field_key(name).to_string(),
            datatype: datatype.map(str::to_string),
            measure: Some(measure.to_string()),
        };
        self.scope_mut(datasource)
            .calculations
            .entry(key)
            .or_insert(entry);
    }

    /// Display table for a data source; unknown sources use their own name
    pub fn table_for(&self, datasource: &str) -> String {
        self.source_index(datasource)
            .map(|i| self.sources[i].table.clone())
            .unwrap_or_else(|| datasource.to_string())
    }

    /// Resolve a reference appearing in a formula owned by `datasource`
    pub fn resolve(&self, datasource: &str, field: &FieldRef) -> Result<Resolved, TranslateError> {
        let scope_name = field.source.as_deref().unwrap_or(datasource);
        let key = self.key(&field.name);

        let Some(scope) = self.source_index(scope_name).map(|i| &self.sources[i]) else {
            if field.source.is_some() {
                return Err(TranslateError::UnknownField(field.to_string()));
            }
            return Ok(Resolved::Column {
                table: datasource.to_string(),
                column: field.name.clone(),
                datatype: None,
            });
        };

        if let Some(calc) = scope.calculations.get(&key) {
            return Ok(Resolved::Measure {
                datasource: scope.name.clone(),
                key,
                measure: calc.measure.clone().unwrap_or_else(|| calc.name.clone()),
                datatype: calc.datatype.clone(),
            });
        }

        if let Some(column) = scope.columns.get(&key) {
            return Ok(Resolved::Column {
                table: scope.table.clone(),
                column: column.name.clone(),
                datatype: column.datatype.clone(),
            });
        }

        // Without a column inventory any other reference is taken as a raw column
        if scope.columns.is_empty() {
            return Ok(Resolved::Column {
                table: scope.table.clone(),
                column: field.name.clone(),
                datatype: None,
            });
        }

        Err(TranslateError::UnknownField(field.to_string()))
    }
}
