//! Filesystem storage for de-identification runs.
//!
//! Tables are CSV files named after the table; the mapping store is a
//! directory holding one CSV file per store key.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use deid_ingest::{load_mappings, read_csv, save_mappings, table_path};
//!
//! let store = load_mappings(Path::new("mappings/prev"))?;
//! let table = read_csv(&table_path(Path::new("data/raw"), "patients"), None)?;
//! save_mappings(Path::new("mappings/out"), &store)?;
//! ```

mod csv;
mod discovery;
mod error;
mod mappings;

// === Error Types ===
pub use error::{IngestError, Result};

// === CSV Tables ===
pub use csv::{ensure_dir, read_csv, table_path, write_csv};

// === File Discovery ===
pub use discovery::list_csv_files;

// === Mapping Files ===
pub use mappings::{load_mappings, read_mapping, save_mappings};
