//! Library side of the `deid` command: configuration loading, the multi-table
//! engine and logging setup.

pub mod config;
pub mod engine;
pub mod logging;

pub use config::{ValidatedConfig, load_config, validate_config};
pub use engine::{EngineError, RunOptions, RunOutcome, TableError, run};
