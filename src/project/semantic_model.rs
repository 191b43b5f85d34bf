//! Semantic model document (`model.bim`)
//!
//! The document is kept as a generic JSON tree so that everything the
//! migration does not touch (relationships, partitions, annotations)
//! survives a rewrite unchanged and in its original key order.

use super::write_json;
use crate::config::TargetTable;
use crate::error::{MigrateError, MigrateResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// A measure as stored in a table's `measures` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub expression: String,
    #[serde(rename = "formatString")]
    pub format_string: String,
    /// Table the measure belongs to when routing by data source
    #[serde(skip)]
    pub table_hint: Option<String>,
}

/// How many measures went into a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub table: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticModel {
    document: Value,
}

impl SemanticModel {
    pub fn from_json(content: &str) -> MigrateResult<Self> {
        let document: Value = serde_json::from_str(content)
            .map_err(|e| MigrateError::Parse(format!("semantic model is not valid JSON: {}", e)))?;
        Ok(Self { document })
    }

    pub fn load(path: &Path) -> MigrateResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> MigrateResult<()> {
        write_json(path, &self.document)
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn tables(&self) -> &[Value] {
        self.document
            .pointer("/model/tables")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Table names in document order
    pub fn table_names(&self) -> Vec<String> {
        self.tables()
            .iter()
            .map(|t| t.get("name").and_then(Value::as_str).unwrap_or_default().to_string())
            .collect()
    }

    /// Measure names of one table, in document order
    pub fn measure_names(&self, table: &str) -> Vec<String> {
        self.tables()
            .iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(table))
            .and_then(|t| t.get("measures"))
            .and_then(Value::as_array)
            .map(|measures| {
                measures
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append measures to the table(s) picked by `target`, in the given order.
    ///
    /// Destination tables are all resolved before the document is touched,
    /// so a missing table leaves the model unchanged. An empty measure list
    /// never touches the model.
    pub fn add_measures(
        &mut self,
        measures: &[Measure],
        target: &TargetTable,
    ) -> MigrateResult<Vec<Placement>> {
        if measures.is_empty() {
            return Ok(Vec::new());
        }
        let names = self.table_names();
        if self.document.pointer("/model/tables").and_then(Value::as_array).is_none() {
            return Err(MigrateError::Validation(
                "semantic model has no model.tables collection".to_string(),
            ));
        }
        if names.is_empty() {
            return Err(MigrateError::Validation("semantic model has no tables".to_string()));
        }

        let destinations = measures
            .iter()
            .map(|measure| destination(&names, measure, target))
            .collect::<MigrateResult<Vec<usize>>>()?;

        let mut placements: Vec<Placement> = Vec::new();
        let mut existing: Vec<Vec<String>> = names.iter().map(|n| self.measure_names(n)).collect();

        let tables = self
            .document
            .pointer_mut("/model/tables")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                MigrateError::Validation(
                    "semantic model has no model.tables collection".to_string(),
                )
            })?;

        for (measure, index) in measures.iter().zip(destinations) {
            let table_name = &names[index];
            let table = tables[index].as_object_mut().ok_or_else(|| {
                MigrateError::Validation(format!("table '{}' is not a JSON object", table_name))
            })?;
            let list = table
                .entry("measures")
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
                .ok_or_else(|| {
                    MigrateError::Validation(format!(
                        "measures of table '{}' is not a list",
                        table_name
                    ))
                })?;

            if existing[index].contains(&measure.name) {
                warn!("Duplicate measure '{}' in table '{}'", measure.name, table_name);
            }
            existing[index].push(measure.name.clone());

            list.push(serde_json::to_value(measure)?);
            debug!("Added measure '{}' to table '{}'", measure.name, table_name);

            match placements.iter_mut().find(|p| &p.table == table_name) {
                Some(placement) => placement.count += 1,
                None => placements.push(Placement {
                    table: table_name.clone(),
                    count: 1,
                }),
            }
        }

        Ok(placements)
    }
}

fn destination(names: &[String], measure: &Measure, target: &TargetTable) -> MigrateResult<usize> {
    match target {
        TargetTable::First => Ok(0),
        TargetTable::Named(name) => names.iter().position(|n| n == name).ok_or_else(|| {
            MigrateError::Validation(format!(
                "table '{}' not found in semantic model (available: {})",
                name,
                names.join(", ")
            ))
        }),
        TargetTable::MatchDatasource => Ok(measure
            .table_hint
            .as_ref()
            .and_then(|hint| names.iter().position(|n| n == hint))
            .unwrap_or(0)),
    }
}
