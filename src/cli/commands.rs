use crate::config::MigrationOptions;
use crate::core::{translate_calculations, DependencyGraph, TranslationReport};
use crate::project::ProjectMaterializer;
use crate::translate::{parse_formula, Expr, FieldResolver};
use crate::types::WorkbookMetadata;
use crate::workbook::read_workbook;
use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Arguments of the migrate command
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub workbook: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
    pub options: MigrationOptions,
    pub report: Option<PathBuf>,
    pub pages: bool,
}

fn load(workbook: &Path) -> anyhow::Result<WorkbookMetadata> {
    read_workbook(workbook)
        .with_context(|| format!("extracting metadata from {}", workbook.display()))
}

fn print_counts(metadata: &WorkbookMetadata) {
    println!("   Data sources: {}", metadata.data_sources.len());
    println!("   Calculations: {}", metadata.calculations.len());
    println!("   Worksheets:   {}", metadata.worksheets.len());
    println!("   Dashboards:   {}", metadata.dashboards.len());
    println!("   Connections:  {}", metadata.connections.len());
}

/// Print one line per calculation; returns the number of failures
fn print_translations(report: &TranslationReport) -> usize {
    for entry in &report.entries {
        if let Some(expression) = &entry.expression {
            println!(
                "   {} {} = {}",
                "✅".green(),
                entry.measure.bright_blue(),
                expression
            );
        } else if let Some(err) = entry.to_error() {
            println!("   {} {}", "❌".red(), err.to_string().red());
        }
    }
    report.failed_count()
}

fn save_report(report: &TranslationReport, path: &Path) -> anyhow::Result<()> {
    report
        .save(path)
        .with_context(|| format!("writing translation report {}", path.display()))?;
    println!("   Report: {}", path.display());
    Ok(())
}

/// Execute the extract command
pub fn extract(workbook: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "📖 Tabmig - Extracting workbook metadata".bold().green());
    println!("   Workbook: {}\n", workbook.display());

    let metadata = load(&workbook)?;
    print_counts(&metadata);

    if let Some(version) = metadata.info.version.as_deref().filter(|v| !v.is_empty()) {
        println!("   Version:      {}", version);
    }

    let parameters = metadata.parameters();
    if !parameters.is_empty() {
        println!("\n   🎚️  Parameters:");
        for param in parameters {
            println!(
                "      {} = {}",
                param.measure_name().bright_blue(),
                param.formula.as_deref().unwrap_or_default()
            );
        }
    }
    println!();

    if let Some(path) = output {
        metadata
            .save(&path)
            .with_context(|| format!("writing metadata {}", path.display()))?;
        println!("{}", format!("💾 Metadata written to {}", path.display()).green());
    }

    println!("{}", "✅ Extraction complete".bold().green());
    Ok(())
}

/// Execute the translate command
pub fn translate(
    workbook: PathBuf,
    report: Option<PathBuf>,
    options: MigrationOptions,
) -> anyhow::Result<()> {
    println!("{}", "🔄 Tabmig - Translating calculations to DAX".bold().green());
    println!("   Workbook: {}\n", workbook.display());

    let metadata = load(&workbook)?;
    let result = translate_calculations(&metadata, &options);
    let failed = print_translations(&result);
    println!();

    if let Some(path) = report {
        save_report(&result, &path)?;
    }

    println!(
        "{}",
        format!(
            "✅ Translated {} of {} calculation(s)",
            result.translated_count(),
            result.entries.len()
        )
        .bold()
        .green()
    );
    if failed > 0 {
        println!(
            "{}",
            format!("⚠️  {} calculation(s) need manual translation", failed).yellow()
        );
    }
    Ok(())
}

/// Execute the deps command: calculations in dependency order
pub fn deps(workbook: PathBuf, options: MigrationOptions) -> anyhow::Result<()> {
    println!("{}", "🌳 Tabmig - Calculation dependencies".bold().green());
    println!("   Workbook: {}\n", workbook.display());

    let metadata = load(&workbook)?;
    let calculations = &metadata.calculations;
    let resolver = FieldResolver::from_metadata(&metadata, options.case_insensitive_fields);

    let parsed: Vec<Option<Expr>> = calculations
        .iter()
        .map(|calc| {
            calc.formula
                .as_deref()
                .and_then(|f| parse_formula(f).ok().flatten())
        })
        .collect();
    let refs: Vec<Option<&Expr>> = parsed.iter().map(Option::as_ref).collect();

    let graph = DependencyGraph::build(
        calculations,
        &refs,
        &resolver,
        options.case_insensitive_fields,
    );
    let order = graph
        .order(calculations)
        .context("ordering calculations")?;

    for (position, index) in order.into_iter().enumerate() {
        let calc = &calculations[index];
        println!(
            "   {}. {} ({})",
            position + 1,
            calc.measure_name().bright_blue().bold(),
            calc.datasource
        );
        for dep in graph.dependencies(index) {
            println!("      └─ {}", calculations[dep].measure_name().cyan());
        }
    }
    println!();

    println!("{}", "✅ No circular references".bold().green());
    Ok(())
}

/// Execute the migrate command: workbook + template project → populated project
pub fn migrate(args: MigrateArgs) -> anyhow::Result<()> {
    println!("{}", "🚚 Tabmig - Migrating workbook to Power BI".bold().green());
    println!("   Workbook: {}", args.workbook.display());
    println!("   Template: {}", args.template.display());
    println!("   Output:   {}\n", args.output.display());

    println!("{}", "📖 Extracting metadata...".cyan());
    let metadata = load(&args.workbook)?;
    print_counts(&metadata);
    println!();

    let materializer = ProjectMaterializer::new(&args.template, &args.output);

    println!("{}", "📁 Preparing output folder...".cyan());
    materializer
        .prepare_output_folder()
        .with_context(|| format!("copying template {}", args.template.display()))?;
    println!();

    println!("{}", "🔄 Injecting measures...".cyan());
    let injection = materializer
        .inject_measures(&metadata, &args.options)
        .with_context(|| format!("injecting measures into {}", args.output.display()))?;
    let failed = print_translations(&injection.report);
    match &injection.model_path {
        Some(path) => {
            println!("   Semantic model: {}", path.display());
            for placement in &injection.placements {
                println!(
                    "   📊 Table {}: {} measure(s)",
                    placement.table.bright_blue().bold(),
                    placement.count
                );
            }
        }
        None => println!(
            "{}",
            "   ⚠️  No semantic model found, measures not injected".yellow()
        ),
    }
    println!();

    if args.pages {
        println!("{}", "📄 Generating report pages...".cyan());
        let pages = materializer
            .generate_report_pages(&metadata.worksheets)
            .with_context(|| format!("generating report pages in {}", args.output.display()))?;
        if pages.is_empty() {
            println!("{}", "   ⚠️  No PBIR report definition found".yellow());
        } else {
            println!("   Pages: {}", pages.len());
        }
        println!();
    }

    if let Some(path) = &args.report {
        save_report(&injection.report, path)?;
        println!();
    }

    println!(
        "{}",
        format!(
            "✅ Migration complete: {} measure(s) injected",
            injection.injected()
        )
        .bold()
        .green()
    );
    if failed > 0 {
        println!(
            "{}",
            format!("⚠️  {} calculation(s) could not be translated", failed).yellow()
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
