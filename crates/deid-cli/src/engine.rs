//! Multi-table runs: table ordering, store hand-over, persistence.
//!
//! Tables run one at a time in dependency order. Each table works on a clone
//! of the current mapping store; the clone replaces the store only when the
//! table succeeds, so a failed table never leaves half-appended entries
//! behind. Tables whose dependencies did not succeed are skipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use deid_ingest::{
    IngestError, ensure_dir, load_mappings, read_csv, save_mappings, table_path, write_csv,
};
use deid_model::{MappingStore, RunResult, TableResult};
use deid_transform::{Direction, PipelineError, TablePipeline, TransformError};
use thiserror::Error;
use tracing::{error, info, info_span, warn};

use crate::config::ValidatedConfig;
use crate::logging::redact_value;

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum EngineError {
    // === Configuration ===
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("table '{table}' is declared more than once")]
    DuplicateTable { table: String },

    #[error("invalid table '{table}': {source}")]
    InvalidTable {
        table: String,
        #[source]
        source: TransformError,
    },

    #[error("invalid table dependencies: {0}")]
    TableOrder(#[source] PipelineError),

    #[error("reverse runs need io.mappings.output or io.mappings.input")]
    NoMappings,

    #[error("reverse runs need a directory for the restored tables")]
    NoRestoreDir,

    // === Execution ===
    #[error("table '{table}' failed: {source}")]
    TableFailed {
        table: String,
        #[source]
        source: TableError,
    },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("failed to write run status {path}: {source}")]
    Status {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single table failed.
#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Options of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub direction: Direction,
    /// Record failed tables and keep going. Also enabled by the
    /// configuration's `continue_on_error`.
    pub continue_on_error: bool,
    /// Run every table but write nothing.
    pub dry_run: bool,
    /// Read at most this many rows per table.
    pub rows_limit: Option<usize>,
    /// Where reverse runs write restored tables.
    pub restore_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            continue_on_error: false,
            dry_run: false,
            rows_limit: None,
            restore_dir: None,
        }
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: RunResult,
    /// Directory the tables were written to.
    pub output_dir: PathBuf,
    pub mapping_files: Vec<PathBuf>,
    pub status_file: Option<PathBuf>,
}

struct TableIo<'a> {
    input: &'a Path,
    output: &'a Path,
}

/// Run every table of `validated` in order.
pub fn run(validated: &ValidatedConfig, options: &RunOptions) -> Result<RunOutcome, EngineError> {
    let config = validated.config();
    let span = info_span!("run", name = config.name.as_str(), direction = ?options.direction);
    let _guard = span.enter();
    let started = Instant::now();

    let (mut store, io) = match options.direction {
        Direction::Forward => {
            let store = match &config.io.mappings.input {
                Some(dir) => load_mappings(dir)?,
                None => MappingStore::new(),
            };
            let io = TableIo {
                input: &config.io.data.input,
                output: &config.io.data.output,
            };
            (store, io)
        }
        Direction::Reverse => {
            let dir = config
                .io
                .mappings
                .output
                .as_ref()
                .or(config.io.mappings.input.as_ref())
                .ok_or(EngineError::NoMappings)?;
            let io = TableIo {
                input: &config.io.data.output,
                output: options
                    .restore_dir
                    .as_deref()
                    .ok_or(EngineError::NoRestoreDir)?,
            };
            (load_mappings(dir)?, io)
        }
    };

    let continue_on_error = options.continue_on_error || config.continue_on_error;
    let mut result = RunResult::new(validated.table_names());
    let mut unsuccessful: HashSet<&str> = HashSet::new();

    for &index in validated.table_order() {
        let table = &config.tables[index];
        let name = table.name.as_str();

        if let Some(dependency) = table
            .depends_on
            .iter()
            .find(|dependency| unsuccessful.contains(dependency.as_str()))
        {
            warn!(table = name, dependency = dependency.as_str(), "skipping table");
            result.record(
                name,
                TableResult::skipped(format!("dependency '{dependency}' did not succeed")),
            );
            unsuccessful.insert(name);
            continue;
        }

        let pipeline = &validated.pipelines()[index];
        match run_table(pipeline, &store, &io, options) {
            Ok((updated, rows)) => {
                info!(table = name, rows, "table complete");
                if let Some(updated) = updated {
                    store = updated;
                }
                result.record(name, TableResult::success(rows));
            }
            Err(err) => {
                let message = err.to_string();
                error!(table = name, error = redact_value(&message), "table failed");
                result.record(name, TableResult::error(message));
                unsuccessful.insert(name);
                if !continue_on_error {
                    if !options.dry_run {
                        write_status(validated, &result)?;
                    }
                    return Err(EngineError::TableFailed {
                        table: name.to_string(),
                        source: err,
                    });
                }
            }
        }
    }

    let mut outcome = RunOutcome {
        result,
        output_dir: io.output.to_path_buf(),
        mapping_files: Vec::new(),
        status_file: None,
    };
    if !options.dry_run {
        if options.direction == Direction::Forward
            && let Some(dir) = &config.io.mappings.output
        {
            outcome.mapping_files = save_mappings(dir, &store)?;
        }
        outcome.status_file = write_status(validated, &outcome.result)?;
    }

    info!(
        tables = outcome.result.results.len(),
        failed = outcome.result.failed_tables().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );
    Ok(outcome)
}

fn run_table(
    pipeline: &TablePipeline,
    store: &MappingStore,
    io: &TableIo<'_>,
    options: &RunOptions,
) -> Result<(Option<MappingStore>, usize), TableError> {
    let span = info_span!("table", table = pipeline.table());
    let _guard = span.enter();

    let table = read_csv(&table_path(io.input, pipeline.table()), options.rows_limit)?;
    info!(
        rows = table.height(),
        columns = table.width(),
        nodes = pipeline.len(),
        "table loaded"
    );

    let (mut output, store) = match options.direction {
        Direction::Forward => {
            let mut working = store.clone();
            let output = pipeline.transform(table, &mut working)?;
            (output, Some(working))
        }
        Direction::Reverse => (pipeline.reverse(table, store)?, None),
    };

    if !options.dry_run {
        write_csv(&table_path(io.output, pipeline.table()), &mut output)?;
    }
    Ok((store, output.height()))
}

/// Write `status_<name>_<timestamp>.json` to `io.runtime`, if configured.
fn write_status(
    validated: &ValidatedConfig,
    result: &RunResult,
) -> Result<Option<PathBuf>, EngineError> {
    let config = validated.config();
    let Some(dir) = &config.io.runtime else {
        return Ok(None);
    };
    ensure_dir(dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("status_{}_{timestamp}.json", config.name));
    let json = serde_json::to_string_pretty(result).map_err(|err| EngineError::Status {
        path: path.clone(),
        source: std::io::Error::other(err),
    })?;
    fs::write(&path, json).map_err(|source| EngineError::Status {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "run status written");
    Ok(Some(path))
}
