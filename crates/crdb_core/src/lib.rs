//! Core library for the crdb CockroachDB management modules.
//!
//! - **error**: `CrdbError` with server error details
//! - **models**: connection options, values, results, versions, database specs
//! - **services**: connection handling, query execution, catalog and lifecycle logic
//! - **state**: per-invocation runtime and warnings
//! - **logging**: structured logging setup

pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

pub use error::CrdbError;
pub use models::{
    parse_version, CellValue, ConnParams, ConnectionConfig, DatabaseSpec, DatabaseState,
    DesiredState, ExecutedStatements, QueryParams, QueryResult, Row, RowShape, SslMode,
    SurvivalGoal, VersionInfo,
};
pub use services::{
    connect, map_connection_params, ConnectOptions, ConnectionHandle, Cursor, QueryService,
    ServerInfo,
};
pub use state::ModuleState;
