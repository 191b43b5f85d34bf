//! Workbook reading: locate the XML payload, parse it, extract metadata

pub mod extractor;
pub mod loader;
pub mod xml;

pub use extractor::{extract_metadata, MetadataExtractor};
pub use loader::load_workbook;

use crate::error::MigrateResult;
use crate::types::WorkbookMetadata;
use std::path::Path;

/// Load a `.twb`/`.twbx` file and extract its metadata
pub fn read_workbook(path: &Path) -> MigrateResult<WorkbookMetadata> {
    let bytes = load_workbook(path)?;
    extract_metadata(&bytes)
}
