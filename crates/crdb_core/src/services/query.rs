//! Query execution.
//!
//! Runs one statement, captures the command tag and row count before
//! fetching, and returns normalized rows. A statement without a result set
//! (DDL, most DML) yields an empty row list, not an error.

use crate::error::CrdbError;
use crate::models::{QueryParams, QueryResult, QueryType};
use crate::services::cursor::Cursor;
use crate::services::normalize::normalize_rows;

/// Service for executing statements.
pub struct QueryService;

impl QueryService {
    /// Execute `sql` with `params` and fetch its rows.
    ///
    /// Execution failures become `Execution` errors and fetch failures become
    /// `Fetch` errors, both naming the statement. Nothing is retried.
    pub async fn execute<C>(
        cursor: &mut C,
        sql: &str,
        params: &QueryParams,
    ) -> Result<QueryResult, CrdbError>
    where
        C: Cursor + ?Sized,
    {
        tracing::debug!(query_type = ?QueryType::detect(sql), "Executing query");

        if let Err(err) = cursor.execute(sql, params).await {
            tracing::warn!(error = %err, "Query execution failed");
            return Err(CrdbError::execution(sql, err.message()));
        }

        // Captured before fetching so they describe this statement even if the fetch fails.
        let status_message = cursor.status_message();
        let row_count = cursor.row_count();
        let columns = cursor.columns();

        let rows = match cursor.fetch_all().await {
            Ok(rows) => rows,
            Err(err) if err.is_no_results() => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "Fetching rows failed");
                return Err(CrdbError::fetch(sql, err.message()));
            }
        };

        tracing::debug!(row_count = rows.len(), status = ?status_message, "Query completed");

        Ok(QueryResult { columns, status_message, row_count, rows: normalize_rows(rows) })
    }
}
