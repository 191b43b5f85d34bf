//! Metadata extraction from a workbook XML document
//!
//! Extraction is all-or-nothing: any markup error aborts the run and no
//! partial metadata is returned. Entities come out in document order.
//!
//! Worksheet shelves: only shelves named `columns` and `rows` are captured
//! (into `dimensions` and `measures`). Pivot-style shelves and other
//! encodings are not.

use super::xml::{parse_document, XmlElement};
use crate::error::MigrateResult;
use crate::types::{
    field_key, Calculation, ColumnRef, Connection, DataSource, Dashboard, FilterSpec,
    Worksheet, WorkbookInfo, WorkbookMetadata, Zone,
};
use std::collections::HashSet;
use tracing::debug;

/// Elements whose nested `datasource` children are references, not definitions
const REFERENCE_SCOPES: &[&str] = &["worksheet", "dashboard"];

/// Parse raw workbook XML into [`WorkbookMetadata`]
pub fn extract_metadata(bytes: &[u8]) -> MigrateResult<WorkbookMetadata> {
    let root = parse_document(bytes)?;
    let metadata = MetadataExtractor::new(&root).extract();
    debug!(
        "Extracted {} data sources, {} calculations, {} worksheets, {} dashboards",
        metadata.data_sources.len(),
        metadata.calculations.len(),
        metadata.worksheets.len(),
        metadata.dashboards.len()
    );
    Ok(metadata)
}

/// Walks a parsed workbook tree top-down
pub struct MetadataExtractor<'a> {
    root: &'a XmlElement,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(root: &'a XmlElement) -> Self {
        Self { root }
    }

    pub fn extract(&self) -> WorkbookMetadata {
        let mut metadata = WorkbookMetadata {
            info: self.workbook_info(),
            ..Default::default()
        };

        for element in self.root.descendants_outside("datasource", REFERENCE_SCOPES) {
            self.extract_datasource(element, &mut metadata);
        }

        metadata.worksheets = self
            .root
            .descendants("worksheet")
            .into_iter()
            .map(extract_worksheet)
            .collect();

        metadata.dashboards = self
            .root
            .descendants("dashboard")
            .into_iter()
            .map(extract_dashboard)
            .collect();

        metadata
    }

    fn workbook_info(&self) -> WorkbookInfo {
        WorkbookInfo {
            version: self.root.attr_owned("version"),
            original_version: self.root.attr_owned("original-version"),
            source_build: self.root.attr_owned("source-build"),
            source_platform: self.root.attr_owned("source-platform"),
        }
    }

    /// Split a data source's columns into calculations and plain columns
    fn extract_datasource(&self, element: &XmlElement, metadata: &mut WorkbookMetadata) {
        let caption = element.attr_owned("caption");
        let name = element
            .attr_owned("name")
            .or_else(|| caption.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut columns = Vec::new();
        let mut seen = HashSet::new();

        for column in element.descendants("column") {
            let column_name = column.attr_owned("name").unwrap_or_default();

            // A field is a calculation iff it carries its own descriptor
            if let Some(calculation) = column.child("calculation") {
                metadata.calculations.push(Calculation {
                    datasource: name.clone(),
                    name: column_name,
                    caption: column.attr_owned("caption"),
                    formula: calculation.attr_owned("formula"),
                    datatype: column.attr_owned("datatype"),
                    role: column.attr_owned("role"),
                });
            } else if seen.insert(field_key(&column_name).to_string()) {
                columns.push(ColumnRef {
                    name: column_name,
                    caption: column.attr_owned("caption"),
                    datatype: column.attr_owned("datatype"),
                    role: column.attr_owned("role"),
                });
            }
        }

        for connection in element.descendants("connection") {
            metadata.connections.push(Connection {
                datasource: name.clone(),
                class: connection.attr_owned("class"),
                server: connection.attr_owned("server"),
                dbname: connection.attr_owned("dbname"),
                filename: connection.attr_owned("filename"),
            });
        }

        metadata.data_sources.push(DataSource {
            name,
            caption,
            columns,
        });
    }
}

fn extract_worksheet(element: &XmlElement) -> Worksheet {
    let mut worksheet = Worksheet {
        name: element.attr_owned("name").unwrap_or_default(),
        ..Default::default()
    };

    for shelf in element.descendants("shelf") {
        let target = match shelf.attr("name") {
            Some("columns") => &mut worksheet.dimensions,
            Some("rows") => &mut worksheet.measures,
            _ => continue,
        };
        target.extend(
            shelf
                .descendants("enc")
                .into_iter()
                .filter_map(|enc| enc.attr_owned("column")),
        );
    }

    worksheet.filters = element
        .descendants("filter")
        .into_iter()
        .map(|filter| FilterSpec {
            column: filter.attr_owned("column"),
            class_name: filter.attr_owned("class"),
        })
        .collect();

    worksheet
}

fn extract_dashboard(element: &XmlElement) -> Dashboard {
    Dashboard {
        name: element.attr_owned("name").unwrap_or_default(),
        zones: element
            .descendants("zone")
            .into_iter()
            .map(|zone| Zone {
                name: zone.attr_owned("name"),
                zone_type: zone
                    .attr_owned("type")
                    .or_else(|| zone.attr_owned("type-v2")),
                x: zone.attr_owned("x"),
                y: zone.attr_owned("y"),
                width: zone.attr_owned("w"),
                height: zone.attr_owned("h"),
            })
            .collect(),
    }
}
