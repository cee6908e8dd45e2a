//! Data models for the crdb modules.
//!
//! - `connection` - ConnectionConfig, ConnParams, SslMode, RowShape
//! - `value` - CellValue, PgInterval, Row
//! - `query` - QueryParams, QueryResult, QueryType, ColumnInfo
//! - `version` - VersionInfo and the banner parser
//! - `database` - DatabaseSpec, DatabaseState, ExecutedStatements

pub mod connection;
pub mod database;
pub mod query;
pub mod value;
pub mod version;

pub use connection::{ConnParams, ConnectionConfig, RowShape, SslMode};
pub use database::{
    DatabaseSpec, DatabaseState, DesiredState, ExecutedStatement, ExecutedStatements, SurvivalGoal,
};
pub use query::{statement_body, ColumnInfo, QueryParams, QueryResult, QueryType};
pub use value::{CellValue, PgInterval, Row};
pub use version::{parse_version, VersionInfo};
