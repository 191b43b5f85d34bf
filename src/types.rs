use crate::error::MigrateResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

//==============================================================================
// Workbook metadata model
//==============================================================================

/// Everything extracted from one workbook, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMetadata {
    #[serde(default)]
    pub info: WorkbookInfo,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub worksheets: Vec<Worksheet>,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
}

impl WorkbookMetadata {
    /// Find a data source by its internal name
    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }

    /// Workbook parameters. Tableau stores them as calculations of a
    /// pseudo data source named `Parameters`.
    pub fn parameters(&self) -> Vec<&Calculation> {
        self.calculations
            .iter()
            .filter(|calc| calc.datasource.eq_ignore_ascii_case("parameters"))
            .collect()
    }

    /// Write the metadata as pretty-printed JSON
    pub fn save(&self, path: &Path) -> MigrateResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read metadata previously written by [`WorkbookMetadata::save`]
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Root attributes of the workbook element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookInfo {
    pub version: Option<String>,
    pub original_version: Option<String>,
    pub source_build: Option<String>,
    pub source_platform: Option<String>,
}

/// A named source of fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub caption: Option<String>,
    /// Plain (non-calculated) fields, unique by name
    #[serde(default)]
    pub columns: Vec<ColumnRef>,
}

impl DataSource {
    /// The name a user sees: caption when present, internal name otherwise
    pub fn display_name(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }
}

/// A raw column of a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    pub caption: Option<String>,
    pub datatype: Option<String>,
    pub role: Option<String>,
}

/// Connection details declared by a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub datasource: String,
    pub class: Option<String>,
    pub server: Option<String>,
    pub dbname: Option<String>,
    pub filename: Option<String>,
}

/// A derived field defined by a formula
///
/// `datasource` holds the owning data source's name. It is resolved by
/// lookup, never by pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub datasource: String,
    pub name: String,
    pub caption: Option<String>,
    pub formula: Option<String>,
    pub datatype: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Calculation {
    /// Convenience constructor used by callers that build metadata by hand
    pub fn new(datasource: &str, name: &str, caption: Option<&str>, formula: &str) -> Self {
        Self {
            datasource: datasource.to_string(),
            name: name.to_string(),
            caption: caption.map(str::to_string),
            formula: Some(formula.to_string()),
            datatype: None,
            role: None,
        }
    }

    /// Measure name in the target model: caption wins over the internal name
    pub fn measure_name(&self) -> String {
        match self.caption.as_deref() {
            Some(caption) if !caption.is_empty() => caption.to_string(),
            _ => field_key(&self.name).to_string(),
        }
    }
}

/// A single visual
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    /// Fields encoded on the `columns` shelf
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Fields encoded on the `rows` shelf
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
}

/// A composition of worksheets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub name: String,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// Absolute layout region. Coordinates are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub zone_type: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

//==============================================================================
// Field names
//==============================================================================

/// Strip one surrounding bracket pair from a stored field name.
///
/// Workbooks store `[Sales]`; formulas and hand-built metadata use `Sales`.
pub fn field_key(name: &str) -> &str {
    name.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_strips_brackets() {
        assert_eq!(field_key("[Sales]"), "Sales");
        assert_eq!(field_key("Sales"), "Sales");
        assert_eq!(field_key("[Unclosed"), "[Unclosed");
    }

    #[test]
    fn test_measure_name_prefers_caption() {
        let calc = Calculation::new("Orders", "[Calculation_1]", Some("Profit %"), "[Profit]");
        assert_eq!(calc.measure_name(), "Profit %");

        let calc = Calculation::new("Orders", "[Calculation_1]", None, "[Profit]");
        assert_eq!(calc.measure_name(), "Calculation_1");

        let calc = Calculation::new("Orders", "Margin", Some(""), "[Profit]");
        assert_eq!(calc.measure_name(), "Margin");
    }

    #[test]
    fn test_parameters_view() {
        let metadata = WorkbookMetadata {
            calculations: vec![
                Calculation::new("Parameters", "[Parameter 1]", Some("Target"), "100"),
                Calculation::new("Orders", "[Ratio]", None, "[A]/[B]"),
            ],
            ..Default::default()
        };
        let params = metadata.parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].measure_name(), "Target");
    }
}
