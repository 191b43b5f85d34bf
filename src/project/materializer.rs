//! Clone a template project and fill it from workbook metadata

use super::semantic_model::{Placement, SemanticModel};
use super::write_json;
use crate::config::MigrationOptions;
use crate::core::{translate_calculations, TranslationReport};
use crate::error::{MigrateError, MigrateResult};
use crate::types::{WorkbookMetadata, Worksheet};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PAGE_SCHEMA: &str =
    "https://developer.microsoft.com/json-schemas/fabric/item/report/definition/page/1.3.0/schema.json";
const PAGES_SCHEMA: &str =
    "https://developer.microsoft.com/json-schemas/fabric/item/report/definition/pagesMetadata/1.0.0/schema.json";

/// Result of [`ProjectMaterializer::inject_measures`]
#[derive(Debug, Clone)]
pub struct Injection {
    pub report: TranslationReport,
    /// Semantic model found in the project, if any
    pub model_path: Option<PathBuf>,
    pub placements: Vec<Placement>,
}

impl Injection {
    pub fn injected(&self) -> usize {
        self.placements.iter().map(|p| p.count).sum()
    }
}

pub struct ProjectMaterializer {
    template: PathBuf,
    output: PathBuf,
}

impl ProjectMaterializer {
    pub fn new(template: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            output: output.into(),
        }
    }

    /// Replace the output folder with a fresh copy of the template
    pub fn prepare_output_folder(&self) -> MigrateResult<()> {
        if !self.template.is_dir() {
            return Err(MigrateError::NotFound(format!(
                "template project {}",
                self.template.display()
            )));
        }

        let template = fs::canonicalize(&self.template)?;
        let output = resolve_path(&self.output)?;
        if output.starts_with(&template) || template.starts_with(&output) {
            return Err(MigrateError::Validation(format!(
                "output {} overlaps template {}",
                self.output.display(),
                self.template.display()
            )));
        }

        if self.output.is_dir() {
            debug!("Removing existing output {}", self.output.display());
            fs::remove_dir_all(&self.output)?;
        } else if self.output.exists() {
            fs::remove_file(&self.output)?;
        }

        copy_dir(&self.template, &self.output)?;
        info!(
            "Copied template {} to {}",
            self.template.display(),
            self.output.display()
        );
        Ok(())
    }

    /// Locate the semantic model document inside the output project
    pub fn semantic_model_path(&self) -> Option<PathBuf> {
        let direct = [
            self.output.join("definition").join("model.bim"),
            self.output.join("model.bim"),
        ];
        if let Some(path) = direct.into_iter().find(|p| p.is_file()) {
            return Some(path);
        }

        sorted_entries(&self.output)
            .into_iter()
            .filter(|dir| has_suffix(dir, ".SemanticModel"))
            .flat_map(|dir| [dir.join("model.bim"), dir.join("definition").join("model.bim")])
            .find(|p| p.is_file())
    }

    /// Locate the PBIR report definition folder inside the output project
    pub fn report_definition_path(&self) -> Option<PathBuf> {
        let direct = self.output.join("Report").join("definition");
        if direct.is_dir() {
            return Some(direct);
        }

        sorted_entries(&self.output)
            .into_iter()
            .filter(|dir| has_suffix(dir, ".Report"))
            .map(|dir| dir.join("definition"))
            .find(|p| p.is_dir())
    }

    /// Translate every calculation and append the successful ones as measures.
    ///
    /// Without a semantic model in the project nothing is written, but the
    /// translation report is still produced.
    pub fn inject_measures(
        &self,
        metadata: &WorkbookMetadata,
        options: &MigrationOptions,
    ) -> MigrateResult<Injection> {
        let report = translate_calculations(metadata, options);

        let Some(model_path) = self.semantic_model_path() else {
            info!("No semantic model in {}, skipping measures", self.output.display());
            return Ok(Injection {
                report,
                model_path: None,
                placements: Vec::new(),
            });
        };

        let mut model = SemanticModel::load(&model_path)?;
        let measures = report.measures(&options.format_string);
        let placements = model.add_measures(&measures, &options.target())?;
        if !placements.is_empty() {
            model.save(&model_path)?;
        }

        info!(
            "Injected {} measure(s) into {}",
            measures.len(),
            model_path.display()
        );
        Ok(Injection {
            report,
            model_path: Some(model_path),
            placements,
        })
    }

    /// Write one empty PBIR page per worksheet and register it in `pages.json`.
    ///
    /// Visuals are not generated. Projects without a report definition are
    /// left alone.
    pub fn generate_report_pages(&self, worksheets: &[Worksheet]) -> MigrateResult<Vec<PathBuf>> {
        let Some(definition) = self.report_definition_path() else {
            debug!("No PBIR report definition in {}", self.output.display());
            return Ok(Vec::new());
        };

        let pages_dir = definition.join("pages");
        let mut written = Vec::new();
        let mut page_ids = Vec::new();

        for (i, worksheet) in worksheets.iter().enumerate() {
            let id = format!("page_{:03}", i + 1);
            let page = json!({
                "$schema": PAGE_SCHEMA,
                "name": id,
                "displayName": format!("Page {} - {}", i + 1, worksheet.name),
                "displayOption": "FitToPage",
                "height": 720,
                "width": 1280
            });
            let path = pages_dir.join(&id).join("page.json");
            write_json(&path, &page)?;
            debug!("Wrote page '{}' for worksheet '{}'", id, worksheet.name);
            written.push(path);
            page_ids.push(id);
        }

        if !page_ids.is_empty() {
            update_page_order(&pages_dir.join("pages.json"), &page_ids)?;
        }
        Ok(written)
    }
}

/// Append page ids to `pageOrder`, keeping entries already present
fn update_page_order(path: &Path, page_ids: &[String]) -> MigrateResult<()> {
    let mut metadata = if path.is_file() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str::<Value>(&content)
            .map_err(|e| MigrateError::Parse(format!("{}: {}", path.display(), e)))?
    } else {
        json!({ "$schema": PAGES_SCHEMA })
    };

    let object = metadata.as_object_mut().ok_or_else(|| {
        MigrateError::Validation(format!("{} is not a JSON object", path.display()))
    })?;

    let mut order: Vec<Value> = object
        .get("pageOrder")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for id in page_ids {
        if !order.iter().any(|v| v.as_str() == Some(id)) {
            order.push(Value::String(id.clone()));
        }
    }
    let first = order.first().cloned();
    object.insert("pageOrder".to_string(), Value::Array(order));
    if !object.contains_key("activePageName") {
        if let Some(first) = first {
            object.insert("activePageName".to_string(), first);
        }
    }

    write_json(path, &metadata)
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix))
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn copy_dir(from: &Path, to: &Path) -> MigrateResult<()> {
    fs::create_dir_all(to)?;
    for entry in sorted_entries(from) {
        let Some(name) = entry.file_name() else { continue };
        let target = to.join(name);
        if entry.is_dir() {
            copy_dir(&entry, &target)?;
        } else {
            fs::copy(&entry, &target)?;
        }
    }
    Ok(())
}

/// Absolute form of a path that may not exist yet
fn resolve_path(path: &Path) -> MigrateResult<PathBuf> {
    if path.exists() {
        return Ok(fs::canonicalize(path)?);
    }
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
    let mut resolved = fs::canonicalize(existing)?;
    resolved.extend(rest.iter().rev());
    Ok(resolved)
}
