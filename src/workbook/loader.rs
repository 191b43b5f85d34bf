//! Workbook loader: `.twb` files are read as-is, `.twbx` packages are zip
//! archives that must contain exactly one `.twb` document.

use crate::error::{MigrateError, MigrateResult};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

const PACKAGED_EXTENSION: &str = "twbx";
const WORKBOOK_EXTENSION: &str = "twb";

/// Read the raw XML bytes of a workbook
pub fn load_workbook(path: &Path) -> MigrateResult<Vec<u8>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    if extension.eq_ignore_ascii_case(PACKAGED_EXTENSION) {
        let file = File::open(path)?;
        read_packaged(BufReader::new(file), path)
    } else if extension.eq_ignore_ascii_case(WORKBOOK_EXTENSION) {
        debug!("Reading workbook {}", path.display());
        Ok(fs::read(path)?)
    } else {
        Err(MigrateError::UnsupportedFormat(format!(
            "{} (expected .{} or .{})",
            path.display(),
            WORKBOOK_EXTENSION,
            PACKAGED_EXTENSION
        )))
    }
}

/// Extract the single embedded workbook document from a packaged archive
pub fn read_packaged<R: Read + Seek>(reader: R, origin: &Path) -> MigrateResult<Vec<u8>> {
    let mut archive = ZipArchive::new(reader)?;

    let candidates: Vec<String> = archive
        .file_names()
        .filter(|name| is_workbook_entry(name))
        .map(str::to_string)
        .collect();

    let entry = match candidates.as_slice() {
        [] => {
            return Err(MigrateError::NotFound(format!(
                "no .{} document inside {}",
                WORKBOOK_EXTENSION,
                origin.display()
            )))
        }
        [single] => single,
        many => {
            return Err(MigrateError::AmbiguousInput(format!(
                "{} contains {} workbook documents: {}",
                origin.display(),
                many.len(),
                many.join(", ")
            )))
        }
    };

    debug!("Reading embedded workbook {} from {}", entry, origin.display());
    let mut file = archive.by_name(entry)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn is_workbook_entry(name: &str) -> bool {
    let normalized = name.replace('\\', "/");
    if normalized.ends_with('/') || normalized.starts_with("__MACOSX/") {
        return false;
    }
    Path::new(&normalized)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(WORKBOOK_EXTENSION))
}
