//! Services behind the crdb modules.
//!
//! - `params` - connection options to driver parameters
//! - `connection` - open/close one connection, TLS negotiation
//! - `placeholders` - `%s` / `%(name)s` placeholder translation
//! - `cursor` - the `Cursor` seam and its tokio-postgres implementation
//! - `query` - single statement execution
//! - `normalize` - JSON-friendly cell values
//! - `info` - catalog aggregation
//! - `database` - database lifecycle reconciliation

pub mod connection;
pub mod cursor;
pub mod database;
pub mod info;
pub mod normalize;
pub mod params;
pub mod placeholders;
pub mod query;

pub use connection::{connect, ConnectOptions, ConnectionHandle};
pub use cursor::{Cursor, PgCursor};
pub use database::{quote_identifier, reconcile, Reconciliation};
pub use info::{gather, CatalogMap, ServerInfo};
pub use normalize::normalize_rows;
pub use params::map_connection_params;
pub use query::QueryService;
