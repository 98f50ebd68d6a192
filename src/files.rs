//! Input discovery and per-file record extraction.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{IngestError, MalformedFile};

/// Accepts either a directory containing `products_*.json` files or a
/// single explicitly named JSON file. Directory matches come back
/// sorted so discovery order is deterministic across runs.
pub fn discover(data_path: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if data_path.is_file() {
        return Ok(vec![data_path.to_path_buf()]);
    }
    if !data_path.is_dir() {
        return Err(IngestError::Config(format!(
            "path not found: {}",
            data_path.display()
        )));
    }

    let entries = fs::read_dir(data_path).map_err(|e| {
        IngestError::Config(format!("cannot list {}: {e}", data_path.display()))
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| IngestError::Config(format!("cannot list directory entry: {e}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.starts_with("products_") && name.ends_with(".json") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(IngestError::NoInputFiles {
            path: data_path.to_path_buf(),
        });
    }
    Ok(files)
}

/// Basename used for provenance and error reporting.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract raw records from one input file.
///
/// Format detection: a first non-whitespace byte of `[` means one JSON
/// array document; anything else is read as newline-delimited objects
/// with blank lines skipped. A syntax error abandons the remainder of
/// the file — records parsed before the error are still returned, so a
/// damaged NDJSON tail does not throw away the good prefix.
pub fn read_records(path: &Path) -> (Vec<Value>, Option<MalformedFile>) {
    let file = display_name(path);
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return (
                Vec::new(),
                Some(MalformedFile {
                    file,
                    line: 0,
                    column: 0,
                    message: format!("unreadable: {e}"),
                }),
            )
        }
    };

    if text.trim_start().starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(&text) {
            Ok(records) => (records, None),
            Err(e) => (
                Vec::new(),
                Some(MalformedFile {
                    file,
                    line: e.line(),
                    column: e.column(),
                    message: e.to_string(),
                }),
            ),
        }
    } else {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(v) => records.push(v),
                Err(e) => {
                    return (
                        records,
                        Some(MalformedFile {
                            file,
                            line: idx + 1,
                            column: e.column(),
                            message: e.to_string(),
                        }),
                    )
                }
            }
        }
        (records, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn discovers_matching_files_sorted() {
        let dir = tempdir().unwrap();
        write(dir.path(), "products_2.json", "[]");
        write(dir.path(), "products_1.json", "[]");
        write(dir.path(), "inventory.json", "[]");
        write(dir.path(), "products_notes.txt", "");

        let files = discover(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["products_1.json", "products_2.json"]);
    }

    #[test]
    fn accepts_single_explicit_file() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "odd_name.json", "[]");
        let files = discover(&path).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn empty_directory_has_no_input_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover(dir.path()),
            Err(IngestError::NoInputFiles { .. })
        ));
    }

    #[test]
    fn missing_path_is_a_config_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(discover(&missing), Err(IngestError::Config(_))));
    }

    #[test]
    fn parses_array_documents() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "products_1.json",
            r#"  [{"id": 1}, {"id": 2}] "#,
        );
        let (records, err) = read_records(&path);
        assert!(err.is_none());
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn parses_newline_delimited_documents() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "products_1.json",
            "{\"id\": 1}\n\n{\"id\": 2}\n",
        );
        let (records, err) = read_records(&path);
        assert!(err.is_none());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn malformed_array_document_reports_position() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "products_1.json", "[{\"id\": 1},\n{\"id\": ]");
        let (records, err) = read_records(&path);
        assert!(records.is_empty());
        let err = err.unwrap();
        assert_eq!(err.file, "products_1.json");
        assert_eq!(err.line, 2);
        assert!(err.column > 0);
    }

    #[test]
    fn ndjson_error_keeps_the_preceding_records() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "products_1.json",
            "{\"id\": 1}\n{\"id\": 2}\n{broken\n{\"id\": 3}\n",
        );
        let (records, err) = read_records(&path);
        assert_eq!(records.len(), 2);
        let err = err.unwrap();
        assert_eq!(err.line, 3);
    }
}
