//! CSV table reading and writing.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{IngestError, Result};

/// Path of the CSV file holding `table` inside `dir`.
pub fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.csv"))
}

/// Reads a CSV file with a single header row into a DataFrame.
///
/// Columns that look like dates or timestamps are parsed as such. The whole
/// file is scanned for schema inference so a late value cannot change a
/// column's type halfway through. `rows_limit` stops reading after that many
/// data rows.
pub fn read_csv(path: &Path, rows_limit: Option<usize>) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_n_rows(rows_limit)
        .map_parse_options(|options| options.with_try_parse_dates(true))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Writes `table` as CSV with a header row, creating parent directories.
pub fn write_csv(path: &Path, table: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path).map_err(|e| IngestError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(table)
        .map_err(|e| IngestError::CsvWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| IngestError::DirectoryCreate {
        path: dir.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_csv_parses_dates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.csv");
        fs::write(&path, "id,visit\n1,2024-01-05\n2,2024-02-11\n").unwrap();

        let df = read_csv(&path, None).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("visit").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn test_read_csv_rows_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "id\n1\n2\n3\n4\n").unwrap();

        let df = read_csv(&path, Some(2)).unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_read_csv_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = read_csv(&dir.path().join("absent.csv"), None);
        assert!(matches!(result, Err(IngestError::FileNotFound { .. })));
    }

    #[test]
    fn test_write_csv_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = table_path(&dir.path().join("out/nested"), "patients");
        let mut df = df! { "id" => &[1i64, 2] }.unwrap();

        write_csv(&path, &mut df).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "id\n1\n2\n");
    }
}
