//! Per-calculation translation with a report of what failed and why
//!
//! One bad formula never blocks the others: every calculation gets an
//! entry with either its DAX expression or the reason it was refused.

use super::dependency::{DependencyGraph, Step};
use crate::config::MigrationOptions;
use crate::error::{MigrateError, MigrateResult};
use crate::project::Measure;
use crate::translate::{parse_formula, ExpressionTranslator, Expr, FieldResolver, TranslateError};
use crate::types::WorkbookMetadata;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome for one calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationEntry {
    pub datasource: String,
    /// Table the calculation's columns live in
    pub table: String,
    pub calculation: String,
    pub measure: String,
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationEntry {
    pub fn is_translated(&self) -> bool {
        self.expression.is_some()
    }

    /// The failure as a pipeline error naming the field
    pub fn to_error(&self) -> Option<MigrateError> {
        self.error
            .as_ref()
            .map(|reason| MigrateError::UntranslatableExpression {
                field: self.measure.clone(),
                reason: reason.clone(),
            })
    }
}

/// Translation results in calculation (document) order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranslationReport {
    pub entries: Vec<TranslationEntry>,
}

impl TranslationReport {
    pub fn translated(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.iter().filter(|e| e.is_translated())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.iter().filter(|e| !e.is_translated())
    }

    pub fn translated_count(&self) -> usize {
        self.translated().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// Measures for every successful translation, in calculation order
    pub fn measures(&self, format_string: &str) -> Vec<Measure> {
        self.translated()
            .map(|entry| Measure {
                name: entry.measure.clone(),
                expression: entry.expression.clone().unwrap_or_default(),
                format_string: format_string.to_string(),
                table_hint: Some(entry.table.clone()),
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> MigrateResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Translate every calculation of a workbook.
///
/// The full metadata must be known first: a formula may refer to a
/// calculation defined later in the document.
pub fn translate_calculations(
    metadata: &WorkbookMetadata,
    options: &MigrationOptions,
) -> TranslationReport {
    let calculations = &metadata.calculations;
    let resolver = FieldResolver::from_metadata(metadata, options.case_insensitive_fields);
    let translator = ExpressionTranslator::new(&resolver);

    let parsed: Vec<Result<Option<Expr>, TranslateError>> = calculations
        .iter()
        .map(|calc| match calc.formula.as_deref() {
            Some(formula) => parse_formula(formula),
            None => Ok(None),
        })
        .collect();
    let parsed_refs: Vec<Option<&Expr>> = parsed
        .iter()
        .map(|p| p.as_ref().ok().and_then(Option::as_ref))
        .collect();

    let graph = DependencyGraph::build(
        calculations,
        &parsed_refs,
        &resolver,
        options.case_insensitive_fields,
    );

    let mut results: Vec<Option<Result<String, TranslateError>>> = vec![None; calculations.len()];

    for step in graph.steps() {
        match step {
            Step::Cycle(members) => {
                let names: Vec<String> = members
                    .iter()
                    .map(|&i| calculations[i].measure_name())
                    .collect();
                let err = TranslateError::CircularReference(names.join(" -> "));
                for i in members {
                    results[i] = Some(Err(err.clone()));
                }
            }
            Step::Translate(i) => {
                let failed_dependency = graph
                    .dependencies(i)
                    .into_iter()
                    .find(|&dep| !matches!(results[dep], Some(Ok(_))));

                results[i] = Some(match (failed_dependency, &parsed[i]) {
                    (Some(dep), _) => Err(TranslateError::FailedDependency(
                        calculations[dep].measure_name(),
                    )),
                    (None, Err(err)) => Err(err.clone()),
                    (None, Ok(None)) => Ok(String::new()),
                    (None, Ok(Some(expr))) => translator.emit(expr, &calculations[i].datasource),
                });
            }
        }
    }

    let entries = calculations
        .iter()
        .zip(results)
        .map(|(calc, result)| {
            let measure = calc.measure_name();
            let result = result.unwrap_or_else(|| {
                Err(TranslateError::Unsupported("calculation was not scheduled".to_string()))
            });
            match &result {
                Ok(expression) => debug!("Translated '{}' => {}", measure, expression),
                Err(err) => warn!("Cannot translate '{}': {}", measure, err),
            }
            let (expression, error) = match result {
                Ok(expression) => (Some(expression), None),
                Err(err) => (None, Some(err.to_string())),
            };
            TranslationEntry {
                datasource: calc.datasource.clone(),
                table: resolver.table_for(&calc.datasource),
                calculation: calc.name.clone(),
                measure,
                formula: calc.formula.clone(),
                expression,
                error,
            }
        })
        .collect();

    TranslationReport { entries }
}
