//! CLI argument definitions for the `deid` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "deid",
    version,
    about = "De-identify related CSV tables with reversible mappings",
    long_about = "De-identify related CSV tables with reversible mappings.\n\n\
                  Identifiers are replaced by stable sequential surrogates and dates are\n\
                  shifted by one random offset per subject. The mappings are written next\n\
                  to the output so a later run can reuse or reverse them."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow raw data values (such as unmatched keys) in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// De-identify every table of a configuration.
    Run(RunArgs),

    /// Restore de-identified tables using the saved mappings.
    Reverse(ReverseArgs),

    /// List the available transformer kinds.
    Kinds,
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the JSON run configuration.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Record failing tables and continue with the next one.
    #[arg(long = "continue-on-error")]
    pub continue_on_error: bool,

    /// Process every table without writing tables, mappings or status files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Read at most N rows from each table.
    #[arg(long = "rows-limit", value_name = "N")]
    pub rows_limit: Option<usize>,
}

#[derive(Args)]
pub struct ReverseArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Directory for the restored tables.
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
