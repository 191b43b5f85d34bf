use super::*;
use std::fs;
use tempfile::TempDir;

const WORKBOOK: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <datasources>
    <datasource name='federated.1' caption='Orders'>
      <column name='[Sales]' datatype='real' role='measure' />
      <column name='[Profit]' datatype='real' role='measure' />
      <column name='[Calculation_1]' caption='Profit %' datatype='real' role='measure'>
        <calculation class='tableau' formula='[Profit]/[Sales]' />
      </column>
      <column name='[Calculation_2]' caption='Margin Points' datatype='real' role='measure'>
        <calculation class='tableau' formula='[Calculation_1] * 100' />
      </column>
    </datasource>
  </datasources>
  <worksheets>
    <worksheet name='Overview' />
  </worksheets>
</workbook>
"#;

const MODEL: &str = r#"{"model": {"tables": [{"name": "Orders", "measures": []}]}}"#;

fn write_workbook(dir: &Path, xml: &str) -> PathBuf {
    let path = dir.join("sample.twb");
    fs::write(&path, xml).unwrap();
    path
}

fn write_template(dir: &Path) -> PathBuf {
    let root = dir.join("template");
    fs::create_dir_all(root.join("definition")).unwrap();
    fs::create_dir_all(root.join("Report").join("definition")).unwrap();
    fs::write(root.join("definition").join("model.bim"), MODEL).unwrap();
    root
}

// =========================================================================
// extract Tests
// =========================================================================

#[test]
fn test_extract_writes_metadata() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), WORKBOOK);
    let output = dir.path().join("metadata.json");

    extract(workbook, Some(output.clone())).unwrap();

    let metadata = WorkbookMetadata::load(&output).unwrap();
    assert_eq!(metadata.calculations.len(), 2);
    assert_eq!(metadata.worksheets[0].name, "Overview");
}

#[test]
fn test_extract_names_the_failing_stage() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), "<workbook><unclosed></workbook>");

    let err = extract(workbook, None).unwrap_err();
    assert!(format!("{err:#}").contains("extracting metadata from"));
}

// =========================================================================
// translate / deps Tests
// =========================================================================

#[test]
fn test_translate_writes_report() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), WORKBOOK);
    let report = dir.path().join("report.json");

    translate(workbook, Some(report.clone()), MigrationOptions::default()).unwrap();

    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(
        content["entries"][1]["expression"],
        serde_json::json!("[Profit %] * 100")
    );
}

#[test]
fn test_deps_fails_on_cycle() {
    let dir = TempDir::new().unwrap();
    let xml = WORKBOOK.replace("[Profit]/[Sales]", "[Calculation_2] / 100");
    let workbook = write_workbook(dir.path(), &xml);

    let err = deps(workbook, MigrationOptions::default()).unwrap_err();
    assert!(format!("{err:#}").contains("Circular dependency"));
}

#[test]
fn test_deps_succeeds_without_cycle() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), WORKBOOK);
    assert!(deps(workbook, MigrationOptions::default()).is_ok());
}

// =========================================================================
// migrate Tests
// =========================================================================

#[test]
fn test_migrate_end_to_end() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), WORKBOOK);
    let template = write_template(dir.path());
    let output = dir.path().join("out");

    migrate(MigrateArgs {
        workbook,
        template,
        output: output.clone(),
        options: MigrationOptions::default(),
        report: None,
        pages: true,
    })
    .unwrap();

    let model: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(output.join("definition").join("model.bim")).unwrap(),
    )
    .unwrap();
    let measures = model["model"]["tables"][0]["measures"].as_array().unwrap();
    assert_eq!(measures.len(), 2);
    assert_eq!(measures[0]["name"], serde_json::json!("Profit %"));
    assert_eq!(
        measures[0]["expression"],
        serde_json::json!("'Orders'[Profit]/'Orders'[Sales]")
    );
    assert!(output
        .join("Report/definition/pages/page_001/page.json")
        .is_file());
}

#[test]
fn test_migrate_missing_template() {
    let dir = TempDir::new().unwrap();
    let workbook = write_workbook(dir.path(), WORKBOOK);

    let err = migrate(MigrateArgs {
        workbook,
        template: dir.path().join("missing"),
        output: dir.path().join("out"),
        options: MigrationOptions::default(),
        report: None,
        pages: false,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("copying template"));
}
