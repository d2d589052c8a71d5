//! Shared data model for the de-identification workspace.
//!
//! Holds the mapping store threaded through every transformer, the run
//! configuration and the per-table run results.

pub mod config;
pub mod error;
pub mod key;
pub mod mapping;
pub mod run;

pub use config::{
    DeidSettings, FilterSpec, IoConfig, MappingPaths, PairedPaths, RunConfig, TableSpec,
    TimeShiftSpec, TimeShiftUnit, TransformerSpec, ValueCast,
};
pub use error::{ModelError, Result};
pub use key::{KeyColumn, KeyFamily, KeyValue, key_series};
pub use mapping::{
    DEID_SUFFIX, MappingEntry, MappingKind, MappingStore, SHIFT_SUFFIX, surrogate_column_name,
    time_shift_key,
};
pub use run::{RunResult, TableResult, TableStatus};
