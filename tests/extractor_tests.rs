//! Workbook loading and metadata extraction against the sample workbook

use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tabmig::error::MigrateError;
use tabmig::types::WorkbookMetadata;
use tabmig::workbook::{load_workbook, read_workbook};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn test_data_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data");
    path.push(filename);
    path
}

/// Build a .twbx archive with the given (entry name, contents) pairs
fn write_package(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default();
    for (entry, contents) in entries {
        if entry.ends_with('/') {
            writer.add_directory(*entry, options).unwrap();
        } else {
            writer.start_file(*entry, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap();
    path
}

// ═══════════════════════════════════════════════════════════════════════════
// GOLDEN SAMPLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sample_entities_in_document_order() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();

    let sources: Vec<&str> = metadata.data_sources.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(sources, vec!["Parameters", "federated.0a1b2c3"]);

    let calcs: Vec<String> = metadata.calculations.iter().map(|c| c.measure_name()).collect();
    assert_eq!(
        calcs,
        vec![
            "Target Margin",
            "Margin Gap",
            "Profit %",
            "Order Year",
            "Region Sales",
            "Big Order"
        ]
    );

    let worksheets: Vec<&str> = metadata.worksheets.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(worksheets, vec!["Sales by Region", "Profit Trend"]);

    assert_eq!(metadata.dashboards.len(), 1);
    let zones: Vec<Option<&str>> = metadata.dashboards[0]
        .zones
        .iter()
        .map(|z| z.name.as_deref())
        .collect();
    assert_eq!(zones, vec![None, Some("Sales by Region"), Some("Profit Trend")]);
}

#[test]
fn test_sample_columns_and_calculations_are_separated() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    let orders = metadata.data_source("federated.0a1b2c3").unwrap();

    assert_eq!(orders.display_name(), "Orders");
    let columns: Vec<&str> = orders.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        columns,
        vec!["[Region]", "[Category]", "[Order Date]", "[Sales]", "[Profit]"]
    );
    assert_eq!(orders.columns[3].role.as_deref(), Some("measure"));

    let parameters = metadata.data_source("Parameters").unwrap();
    assert!(parameters.columns.is_empty());
    assert_eq!(metadata.parameters().len(), 1);
    assert_eq!(metadata.parameters()[0].formula.as_deref(), Some("0.15"));
}

#[test]
fn test_sample_worksheet_shelves_and_filters() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    let ws = &metadata.worksheets[0];

    assert_eq!(ws.dimensions, vec!["[federated.0a1b2c3].[none:Region:nk]"]);
    assert_eq!(
        ws.measures,
        vec![
            "[federated.0a1b2c3].[sum:Sales:qk]",
            "[federated.0a1b2c3].[usr:Calculation_1001:qk]"
        ]
    );
    assert_eq!(ws.filters.len(), 1);
    assert_eq!(
        ws.filters[0].column.as_deref(),
        Some("[federated.0a1b2c3].[none:Category:nk]")
    );
}

#[test]
fn test_sample_info_and_connections() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    assert_eq!(metadata.info.version.as_deref(), Some("18.1"));
    assert_eq!(metadata.info.source_platform.as_deref(), Some("win"));

    let classes: Vec<Option<&str>> = metadata
        .connections
        .iter()
        .map(|c| c.class.as_deref())
        .collect();
    assert_eq!(classes, vec![Some("federated"), Some("excel-direct")]);
    assert_eq!(
        metadata.connections[1].filename.as_deref(),
        Some("Data/Superstore.xlsx")
    );
}

#[test]
fn test_zone_type_falls_back_to_type_v2() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    let zone = &metadata.dashboards[0].zones[0];
    assert_eq!(zone.zone_type.as_deref(), Some("layout-basic"));
    assert_eq!(zone.width.as_deref(), Some("100000"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PACKAGED WORKBOOKS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_packaged_and_plain_extract_identically() {
    let dir = TempDir::new().unwrap();
    let xml = fs::read_to_string(test_data_path("sample.twb")).unwrap();
    let package = write_package(
        dir.path(),
        "sample.twbx",
        &[
            ("Data/", ""),
            ("Data/Superstore.xlsx", "not really a spreadsheet"),
            ("sample.twb", xml.as_str()),
        ],
    );

    let plain = read_workbook(&test_data_path("sample.twb")).unwrap();
    let packaged = read_workbook(&package).unwrap();
    assert_eq!(plain, packaged);
}

#[test]
fn test_extension_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let xml = fs::read_to_string(test_data_path("sample.twb")).unwrap();
    let package = write_package(dir.path(), "SAMPLE.TWBX", &[("Sample.TWB", xml.as_str())]);
    assert_eq!(load_workbook(&package).unwrap(), xml.as_bytes());
}

#[test]
fn test_package_without_workbook_is_not_found() {
    let dir = TempDir::new().unwrap();
    let package = write_package(
        dir.path(),
        "empty.twbx",
        &[("Data/extract.hyper", "hyper"), ("__MACOSX/._sample.twb", "junk")],
    );

    let err = load_workbook(&package).unwrap_err();
    assert!(matches!(err, MigrateError::NotFound(_)), "{err}");
}

#[test]
fn test_package_with_two_workbooks_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    let package = write_package(
        dir.path(),
        "two.twbx",
        &[("a.twb", "<workbook/>"), ("b.twb", "<workbook/>")],
    );

    match load_workbook(&package).unwrap_err() {
        MigrateError::AmbiguousInput(message) => {
            assert!(message.contains("a.twb"));
            assert!(message.contains("b.twb"));
        }
        other => panic!("expected AmbiguousInput, got {other:?}"),
    }
}

#[test]
fn test_unsupported_extension() {
    let err = read_workbook(Path::new("workbook.pbix")).unwrap_err();
    assert!(matches!(err, MigrateError::UnsupportedFormat(_)));
}

#[test]
fn test_malformed_workbook_returns_no_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.twb");
    fs::write(&path, "<workbook><datasources><datasource name='x'></datasources>").unwrap();

    let err = read_workbook(&path).unwrap_err();
    assert!(matches!(err, MigrateError::Parse(_)), "{err}");
}

// ═══════════════════════════════════════════════════════════════════════════
// METADATA PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_metadata_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metadata.json");

    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    metadata.save(&path).unwrap();

    assert_eq!(WorkbookMetadata::load(&path).unwrap(), metadata);
}
