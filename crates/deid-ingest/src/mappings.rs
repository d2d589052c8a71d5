//! Mapping store persistence: one CSV file per store key.
//!
//! The file stem is the store key. Identifier entries hold the columns `R`
//! and `R__deid`; time-shift entries are stored under `R_shift` with the
//! columns `R` and `R_shift`.

use std::path::{Path, PathBuf};

use deid_model::{MappingEntry, MappingStore};
use tracing::{debug, info, warn};

use crate::csv::{ensure_dir, read_csv, table_path, write_csv};
use crate::discovery::list_csv_files;
use crate::error::{IngestError, Result};

/// Read one mapping file as the entry stored under `key`.
pub fn read_mapping(path: &Path, key: &str) -> Result<MappingEntry> {
    let frame = read_csv(path, None)?;
    MappingEntry::from_persisted(key, &frame).map_err(|source| IngestError::Mapping {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every mapping file in `dir` into a new store.
///
/// The directory must exist. Files that cannot be read or do not hold a
/// recognisable entry are skipped with a warning.
pub fn load_mappings(dir: &Path) -> Result<MappingStore> {
    let mut store = MappingStore::new();
    for path in list_csv_files(dir)? {
        let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!(path = %path.display(), "skipping mapping file with a non UTF-8 name");
            continue;
        };

        let entry = match read_mapping(&path, key) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping mapping file");
                continue;
            }
        };
        let rows = entry.len();
        if let Err(err) = store.insert(key, entry) {
            warn!(path = %path.display(), error = %err, "skipping mapping file");
            continue;
        }
        debug!(key, rows, "mapping loaded");
    }

    info!(dir = %dir.display(), entries = store.len(), "mapping store loaded");
    Ok(store)
}

/// Write every entry of `store` to `dir`, returning the written paths.
pub fn save_mappings(dir: &Path, store: &MappingStore) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut written = Vec::with_capacity(store.len());
    for (key, entry) in store.iter() {
        let path = table_path(dir, key);
        let mut frame = entry.frame().clone();
        write_csv(&path, &mut frame)?;
        debug!(key, rows = entry.len(), path = %path.display(), "mapping written");
        written.push(path);
    }
    info!(dir = %dir.display(), entries = written.len(), "mapping store saved");
    Ok(written)
}
