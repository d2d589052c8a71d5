//! `deid` command-line entry point.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use deid_cli::logging::{LogConfig, LogFormat, init_logging};
use deid_cli::{RunOptions, load_config, run};
use deid_transform::{Direction, default_registry};
use tracing::level_filters::LevelFilter;

mod cli;
mod summary;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg, RunArgs};
use crate::summary::{print_kinds, print_summary};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match &cli.command {
        Command::Run(args) => report(execute(args, Direction::Forward, None)),
        Command::Reverse(args) => report(execute(
            &args.run,
            Direction::Reverse,
            Some(args.output_dir.clone()),
        )),
        Command::Kinds => {
            print_kinds(default_registry());
            0
        }
    };
    std::process::exit(exit_code);
}

/// Load the configuration, run it and print the summary. Returns whether
/// every table succeeded.
fn execute(args: &RunArgs, direction: Direction, restore_dir: Option<PathBuf>) -> Result<bool> {
    let validated = load_config(&args.config)
        .with_context(|| format!("load configuration {}", args.config.display()))?;
    let options = RunOptions {
        direction,
        continue_on_error: args.continue_on_error,
        dry_run: args.dry_run,
        rows_limit: args.rows_limit,
        restore_dir,
    };
    let outcome = run(&validated, &options)?;
    print_summary(&validated.config().name, &outcome, args.dry_run);
    Ok(outcome.result.success)
}

fn report(result: Result<bool>) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.log_data = cli.log_data;
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
