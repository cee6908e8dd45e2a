//! Command line definition.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Report what would change without changing anything
    #[arg(long, global = true)]
    pub check: bool,

    /// Log filter, e.g. `debug` or `crdb_core=trace`
    #[arg(long, env = "CRDB_LOG", global = true)]
    pub log_level: Option<String>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, env = "CRDB_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one SQL statement
    Query {
        /// JSON argument document, or `-` for stdin
        #[arg(value_name = "ARGS_FILE")]
        args: PathBuf,
    },
    /// Create, alter, rename or drop a database
    Db {
        /// JSON argument document, or `-` for stdin
        #[arg(value_name = "ARGS_FILE")]
        args: PathBuf,
    },
    /// Gather version and catalog information
    Info {
        /// JSON argument document, or `-` for stdin
        #[arg(value_name = "ARGS_FILE")]
        args: PathBuf,
    },
}

impl Command {
    /// Module name as reported in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Db { .. } => "db",
            Self::Info { .. } => "info",
        }
    }

    pub fn args_path(&self) -> &Path {
        match self {
            Self::Query { args } | Self::Db { args } | Self::Info { args } => args,
        }
    }
}
