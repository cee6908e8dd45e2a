//! crdb - declarative CockroachDB modules.
//!
//! Reads a JSON argument document, runs the `query`, `db` or `info` module and
//! prints a JSON result document on stdout. Logs go to stderr.

mod args;
mod cli;
mod modules;
mod output;

use args::ArgumentDocument;
use clap::Parser;
use cli::Cli;
use crdb_core::logging::{init_logging, LogConfig};
use crdb_core::ModuleState;
use output::ModuleOutput;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging before anything can fail
    let mut log_config = LogConfig::new();
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    if let Some(filter) = &cli.log_level {
        log_config = log_config.with_filter(filter);
    }
    let _logging_guard = init_logging(log_config);

    tracing::info!(module = cli.command.name(), version = env!("CARGO_PKG_VERSION"), "Starting crdb");

    let output = run(&cli);
    println!("{}", output.to_json());
    output.exit_code()
}

/// Run one module; every failure becomes a failure document.
fn run(cli: &Cli) -> ModuleOutput {
    let document = match ArgumentDocument::load(cli.command.args_path()) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load module arguments");
            return ModuleOutput::failure(&e);
        }
    };

    let state = match ModuleState::new(cli.check || document.check_mode()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize module state");
            return ModuleOutput::failure(&e);
        }
    };

    let output = match modules::dispatch(&cli.command, document, &state) {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(error = %e, category = e.category(), "Module failed");
            ModuleOutput::failure(&e)
        }
    };
    output.with_warnings(state.take_warnings())
}
