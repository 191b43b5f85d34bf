//! Tabmig - Tableau workbook to Power BI project migration
//!
//! This library reads Tableau workbooks (`.twb` or packaged `.twbx`),
//! extracts their metadata, translates calculated fields to DAX, and
//! writes the result into a Power BI project cloned from a template.
//!
//! # Pipeline
//!
//! - [`workbook`]: locate and parse the workbook XML, extract metadata
//! - [`translate`]: Tableau formula → DAX expression
//! - [`core`]: dependency ordering and the per-calculation report
//! - [`project`]: clone the template, inject measures, add report pages
//!
//! # Example
//!
//! ```no_run
//! use tabmig::config::MigrationOptions;
//! use tabmig::project::ProjectMaterializer;
//! use tabmig::workbook::read_workbook;
//! use std::path::Path;
//!
//! let metadata = read_workbook(Path::new("sales.twbx"))?;
//! println!("Calculations: {}", metadata.calculations.len());
//!
//! let materializer = ProjectMaterializer::new("template.pbip", "out.pbip");
//! materializer.prepare_output_folder()?;
//! let injection = materializer.inject_measures(&metadata, &MigrationOptions::default())?;
//! println!("Injected: {}", injection.injected());
//! # Ok::<(), tabmig::error::MigrateError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod project;
pub mod translate;
pub mod types;
pub mod workbook;

// Re-export commonly used types
pub use error::{MigrateError, MigrateResult};
pub use types::{Calculation, DataSource, Dashboard, WorkbookMetadata, Worksheet};
