//! Module runners.
//!
//! Each runner maps the connection options, opens one connection, does its
//! work and closes the connection on every path before returning.

pub mod db;
pub mod info;
pub mod query;

use crate::args::ArgumentDocument;
use crate::cli::Command;
use crate::output::ModuleOutput;

use crdb_core::{CrdbError, ModuleState};

/// Run the module named by `command` against `document`.
pub fn dispatch(command: &Command, document: ArgumentDocument, state: &ModuleState) -> Result<ModuleOutput, CrdbError> {
    tracing::debug!(
        module = command.name(),
        invocation_id = %state.invocation_id(),
        check_mode = state.check_mode(),
        "Dispatching module"
    );

    match command {
        Command::Query { .. } => query::run(state, document.into_args()?),
        Command::Db { .. } => db::run(state, document.into_args()?),
        Command::Info { .. } => info::run(state, document.into_args()?),
    }
}
