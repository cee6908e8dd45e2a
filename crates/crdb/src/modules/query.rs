//! The `query` module: run one statement and return its rows.

use crate::args::QueryArgs;
use crate::output::ModuleOutput;

use crdb_core::models::{QueryResult, Row};
use crdb_core::services::{connect, map_connection_params, ConnectOptions, QueryService};
use crdb_core::{CrdbError, ModuleState};

use serde::Serialize;

/// Message reported when dry-run mode is requested.
pub const CHECK_MODE_UNSUPPORTED: &str = "remote module (query) does not support check mode";

#[derive(Debug, Serialize)]
struct QueryPayload<'a> {
    query: &'a str,
    statusmessage: Option<&'a str>,
    rowcount: Option<u64>,
    query_result: &'a [Row],
}

pub fn run(state: &ModuleState, args: QueryArgs) -> Result<ModuleOutput, CrdbError> {
    let params = args.params()?;
    if state.check_mode() {
        tracing::info!("Check mode requested, query skipped");
        return Ok(ModuleOutput::skipped(CHECK_MODE_UNSUPPORTED));
    }

    let conn_params = map_connection_params(&args.connection);
    let options = ConnectOptions::default().autocommit(args.autocommit).row_shape(args.rows_type);

    let result = state.block_on(async {
        let Some(mut conn) = connect(&conn_params, options, state).await? else {
            return Err(CrdbError::connection("no connection was opened"));
        };

        let outcome = {
            let mut cursor = conn.cursor();
            QueryService::execute(&mut cursor, &args.query, &params).await
        };
        let outcome = match outcome {
            Ok(result) => conn.commit().await.map(|()| result),
            Err(err) => Err(err),
        };

        conn.close().await;
        outcome
    })?;

    output_for(&args.query, &result)
}

/// Arbitrary SQL may write through any statement form, so a run always reports a change.
fn output_for(query: &str, result: &QueryResult) -> Result<ModuleOutput, CrdbError> {
    tracing::info!(rows = result.rows.len(), status = ?result.status_message, "Query module finished");

    ModuleOutput::changed(true).with_payload(&QueryPayload {
        query,
        statusmessage: result.status_message.as_deref(),
        rowcount: result.row_count,
        query_result: &result.rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentDocument;
    use crdb_core::CellValue;
    use serde_json::{json, Value};

    fn to_doc(output: &ModuleOutput) -> Value {
        serde_json::from_str(&output.to_json()).unwrap()
    }

    #[test]
    fn test_select_output_reports_change() {
        let result = QueryResult {
            columns: Vec::new(),
            status_message: Some("SELECT 1".into()),
            row_count: Some(1),
            rows: vec![Row::Keyed(vec![("n".into(), CellValue::Int(1))])],
        };
        let doc = to_doc(&output_for("SELECT 1 AS n", &result).unwrap());
        assert_eq!(
            doc,
            json!({
                "changed": true,
                "query": "SELECT 1 AS n",
                "statusmessage": "SELECT 1",
                "rowcount": 1,
                "query_result": [{"n": 1}]
            })
        );
    }

    #[test]
    fn test_write_output_is_changed() {
        let result = QueryResult {
            columns: Vec::new(),
            status_message: Some("INSERT 0 2".into()),
            row_count: Some(2),
            rows: Vec::new(),
        };
        let doc = to_doc(&output_for("INSERT INTO t VALUES (1), (2)", &result).unwrap());
        assert_eq!(doc["changed"], json!(true));
        assert_eq!(doc["query_result"], json!([]));
    }

    #[test]
    fn test_writes_hidden_behind_reads_report_change() {
        let result = QueryResult {
            columns: Vec::new(),
            status_message: Some("SELECT 1".into()),
            row_count: Some(1),
            rows: vec![Row::Tuple(vec![CellValue::Int(5)])],
        };
        for query in [
            "WITH d AS (DELETE FROM t RETURNING *) SELECT count(*) FROM d",
            "SELECT nextval('seq')",
            "SHOW USERS",
        ] {
            assert!(output_for(query, &result).unwrap().changed, "{query}");
        }
    }

    #[test]
    fn test_check_mode_skips_without_connecting() {
        let state = ModuleState::new(true).unwrap();
        let args = ArgumentDocument::from_value(json!({"query": "DROP TABLE t", "login_port": 1}))
            .unwrap()
            .into_args()
            .unwrap();

        let output = run(&state, args).unwrap();
        assert!(output.skipped);
        assert!(!output.changed);
        assert_eq!(output.msg.as_deref(), Some(CHECK_MODE_UNSUPPORTED));
    }

    #[test]
    fn test_unreachable_server_fails() {
        let state = ModuleState::new(false).unwrap();
        let args = ArgumentDocument::from_value(json!({
            "query": "SELECT 1",
            "login_host": "127.0.0.1",
            "login_port": 1,
            "ssl_mode": "disable"
        }))
        .unwrap()
        .into_args()
        .unwrap();

        let err = run(&state, args).unwrap_err();
        assert!(err.is_connect_failure());
        assert!(err.to_string().starts_with("unable to connect to database"));
    }
}
