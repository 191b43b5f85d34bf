//! Target project materialization
//!
//! A Power BI project (PBIP) folder is cloned from a template, then its
//! semantic model receives the translated measures and its report
//! definition receives one page per worksheet.

pub mod materializer;
pub mod semantic_model;

pub use materializer::{Injection, ProjectMaterializer};
pub use semantic_model::{Measure, Placement, SemanticModel};

use crate::error::{MigrateError, MigrateResult};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as 4-space indented JSON and replace `path` atomically.
///
/// The document is written to a temporary file in the same directory and
/// renamed over the target, so a failure never leaves a truncated file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> MigrateResult<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&buf)?;
    tmp.as_file().sync_all()?;
    if let Ok(existing) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), existing.permissions())?;
    }
    tmp.persist(path)
        .map_err(|e| MigrateError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_json_uses_four_space_indent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_json(&path, &json!({"model": {"tables": []}})).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\n    \"model\": {\n        \"tables\": []\n    }\n}\n");
    }

    #[test]
    fn test_write_json_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "old").unwrap();

        write_json(&path, &json!([1])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n    1\n]\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
