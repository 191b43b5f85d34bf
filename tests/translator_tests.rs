//! Tableau formula → DAX translation through the public API

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tabmig::config::MigrationOptions;
use tabmig::core::translate_calculations;
use tabmig::error::MigrateError;
use tabmig::translate::{ExpressionTranslator, FieldResolver, TranslateError};
use tabmig::types::{Calculation, WorkbookMetadata};
use tabmig::workbook::read_workbook;

fn test_data_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data");
    path.push(filename);
    path
}

fn orders_resolver() -> FieldResolver {
    let mut resolver = FieldResolver::new(false);
    resolver.add_source("Orders", "Orders");
    for column in ["Sales", "Profit", "Region", "Order Date", "Ship Date"] {
        resolver.add_column("Orders", column, None);
    }
    resolver.add_calculation("Orders", "Profit Ratio", "Profit %", None);
    resolver
}

fn dax(formula: &str) -> Result<String, TranslateError> {
    let resolver = orders_resolver();
    ExpressionTranslator::new(&resolver).translate(Some(formula), "Orders")
}

// ═══════════════════════════════════════════════════════════════════════════
// FIELD REFERENCES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_raw_column_is_table_qualified() {
    assert_eq!(dax("[Profit]/[Sales]").unwrap(), "'Orders'[Profit]/'Orders'[Sales]");
}

#[test]
fn test_calculation_reference_is_not_qualified() {
    assert_eq!(dax("[Profit Ratio] * 100").unwrap(), "[Profit %] * 100");
}

#[test]
fn test_formula_without_references_has_no_table_qualification() {
    for formula in ["1 + 2", "\"a\" + \"b\"", "ROUND(3.14159, 2)", "TODAY()", "#2024-03-01#"] {
        let out = dax(formula).unwrap();
        assert!(!out.contains('\''), "{formula} => {out}");
        assert!(!out.contains('['), "{formula} => {out}");
    }
}

#[test]
fn test_blank_formula_is_empty() {
    let resolver = orders_resolver();
    let translator = ExpressionTranslator::new(&resolver);
    assert_eq!(translator.translate(None, "Orders").unwrap(), "");
    assert_eq!(translator.translate(Some("  "), "Orders").unwrap(), "");
}

// ═══════════════════════════════════════════════════════════════════════════
// FUNCTIONS AND CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_function_table() {
    assert_eq!(dax("COUNTD([Region])").unwrap(), "DISTINCTCOUNT('Orders'[Region])");
    assert_eq!(dax("AVG([Sales])").unwrap(), "AVERAGE('Orders'[Sales])");
    assert_eq!(
        dax("/* note */ SUM([Sales])").unwrap(),
        "SUM('Orders'[Sales])"
    );
    assert_eq!(
        dax("IIF([Sales] > 0, 1, 0)").unwrap(),
        "IF('Orders'[Sales] > 0, 1, 0)"
    );
    assert_eq!(
        dax("DATEDIFF('day', [Order Date], [Ship Date])").unwrap(),
        "DATEDIFF('Orders'[Order Date], 'Orders'[Ship Date], DAY)"
    );
}

#[test]
fn test_if_elseif_becomes_nested_if() {
    assert_eq!(
        dax("IF [Sales] > 100 THEN \"High\" ELSEIF [Sales] > 10 THEN \"Mid\" ELSE \"Low\" END")
            .unwrap(),
        "IF('Orders'[Sales] > 100, \"High\", IF('Orders'[Sales] > 10, \"Mid\", \"Low\"))"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPLICIT FAILURES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_level_of_detail_is_refused() {
    let err = dax("{FIXED [Region] : SUM([Sales])}").unwrap_err();
    assert!(matches!(err, TranslateError::Unsupported(_)), "{err}");
}

#[test]
fn test_table_calculation_is_refused() {
    assert!(matches!(
        dax("RUNNING_SUM(SUM([Sales]))"),
        Err(TranslateError::Unsupported(_))
    ));
}

#[test]
fn test_unmapped_function_is_refused() {
    assert!(dax("SOUNDEX([Region])").is_err());
}

#[test]
fn test_aggregate_over_expression_or_calculation() {
    assert_eq!(
        dax("SUM([Sales] * [Profit])").unwrap(),
        "SUMX('Orders', 'Orders'[Sales] * 'Orders'[Profit])"
    );
    assert!(matches!(
        dax("COUNTD(IIF([Sales] > 0, [Region], NULL))"),
        Err(TranslateError::Unsupported(_))
    ));

    let metadata = WorkbookMetadata {
        calculations: vec![
            Calculation::new("Orders", "[Line Total]", None, "[Price] * [Quantity]"),
            Calculation::new("Orders", "[Revenue]", None, "SUM([Line Total])"),
        ],
        ..Default::default()
    };
    let report = translate_calculations(&metadata, &MigrationOptions::default());
    assert_eq!(
        report.entries[0].expression.as_deref(),
        Some("'Orders'[Price] * 'Orders'[Quantity]")
    );
    assert_eq!(report.entries[1].expression, None);
    assert_eq!(
        report.entries[1].error.as_deref(),
        Some("SUM over calculation [Line Total] needs a column")
    );
}

#[test]
fn test_failure_converts_to_untranslatable_expression() {
    let metadata = WorkbookMetadata {
        calculations: vec![Calculation::new(
            "Orders",
            "[Calculation_7]",
            Some("Region Average"),
            "{INCLUDE [Region] : AVG([Sales])}",
        )],
        ..Default::default()
    };
    let report = translate_calculations(&metadata, &MigrationOptions::default());

    match report.entries[0].to_error() {
        Some(MigrateError::UntranslatableExpression { field, reason }) => {
            assert_eq!(field, "Region Average");
            assert!(reason.contains("INCLUDE"), "{reason}");
        }
        other => panic!("expected UntranslatableExpression, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WHOLE-WORKBOOK TRANSLATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sample_workbook_translations() {
    let metadata = read_workbook(&test_data_path("sample.twb")).unwrap();
    let report = translate_calculations(&metadata, &MigrationOptions::default());

    let results: Vec<(&str, Option<&str>)> = report
        .entries
        .iter()
        .map(|e| (e.measure.as_str(), e.expression.as_deref()))
        .collect();

    assert_eq!(
        results,
        vec![
            ("Target Margin", Some("0.15")),
            ("Margin Gap", Some("[Profit %] - [Target Margin]")),
            ("Profit %", Some("SUM('Orders'[Profit]) / SUM('Orders'[Sales])")),
            ("Order Year", Some("YEAR('Orders'[Order Date])")),
            ("Region Sales", None),
            (
                "Big Order",
                Some(
                    "IF(SUM('Orders'[Sales]) > 1000, \"Large\", \
                     IF(SUM('Orders'[Sales]) > 100, \"Medium\", \"Small\"))"
                )
            ),
        ]
    );
    assert_eq!(report.failed_count(), 1);
    assert!(report.entries[4].error.as_deref().unwrap().contains("FIXED"));
}

#[test]
fn test_case_insensitive_policy() {
    let metadata = WorkbookMetadata {
        data_sources: read_workbook(&test_data_path("sample.twb"))
            .unwrap()
            .data_sources,
        calculations: vec![Calculation::new(
            "federated.0a1b2c3",
            "[Calculation_9]",
            Some("Lower"),
            "SUM([sales])",
        )],
        ..Default::default()
    };

    let strict = translate_calculations(&metadata, &MigrationOptions::default());
    assert_eq!(
        strict.entries[0].error.as_deref(),
        Some("unknown field [sales]")
    );

    let relaxed = translate_calculations(
        &metadata,
        &MigrationOptions {
            case_insensitive_fields: true,
            ..Default::default()
        },
    );
    assert_eq!(relaxed.entries[0].expression.as_deref(), Some("SUM('Orders'[Sales])"));
}
