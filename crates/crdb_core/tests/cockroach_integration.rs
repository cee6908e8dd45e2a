//! Integration tests against a live CockroachDB node.
//!
//! Enabled with `--features cockroach-tests`. The node is taken from
//! `CRDB_TEST_HOST` (and optionally `CRDB_TEST_PORT`); an insecure
//! single-node cluster is expected:
//!
//! ```text
//! cockroach start-single-node --insecure --listen-addr=localhost:26257
//! CRDB_TEST_HOST=localhost cargo test -p crdb_core --features cockroach-tests
//! ```

#![cfg(feature = "cockroach-tests")]

use crdb_core::models::{ConnectionConfig, DatabaseSpec, ExecutedStatements, QueryParams, SslMode};
use crdb_core::services::{connect, database, info, map_connection_params, ConnectOptions};
use crdb_core::{CellValue, ModuleState, QueryService, Row, RowShape};

use serde_json::json;

fn test_config() -> Option<ConnectionConfig> {
    let host = std::env::var("CRDB_TEST_HOST").ok()?;
    let mut config = ConnectionConfig::new();
    config.login_host = Some(host);
    config.login_port = std::env::var("CRDB_TEST_PORT").ok().and_then(|p| p.parse().ok()).or(Some(26257));
    config.ssl_mode = Some(SslMode::Disable);
    Some(config)
}

macro_rules! require_cluster {
    () => {
        match test_config() {
            Some(config) => config,
            None => {
                eprintln!("CRDB_TEST_HOST not set, skipping");
                return;
            }
        }
    };
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

#[test]
fn test_select_with_positional_args() {
    let config = require_cluster!();
    let state = ModuleState::new(false).unwrap();

    state.block_on(async {
        let params = map_connection_params(&config);
        let mut conn = connect(&params, ConnectOptions::default().autocommit(true), &state)
            .await
            .unwrap()
            .unwrap();

        let result = {
            let mut cursor = conn.cursor();
            QueryService::execute(
                &mut cursor,
                "SELECT %s::INT + 1 AS n, 1.01::DECIMAL AS d, '12 hours'::INTERVAL AS i",
                &QueryParams::Positional(vec![json!(41)]),
            )
            .await
            .unwrap()
        };

        assert_eq!(result.status_message.as_deref(), Some("SELECT 1"));
        assert_eq!(
            result.rows,
            vec![Row::Tuple(vec![
                CellValue::Int(42),
                CellValue::Float(1.01),
                CellValue::Text("12:00:00".into()),
            ])]
        );
        conn.close().await;
    });
}

#[test]
fn test_wide_values_decode() {
    let config = require_cluster!();
    let state = ModuleState::new(false).unwrap();

    state.block_on(async {
        let params = map_connection_params(&config);
        let mut conn = connect(&params, ConnectOptions::default().autocommit(true), &state)
            .await
            .unwrap()
            .unwrap();

        let result = {
            let mut cursor = conn.cursor();
            QueryService::execute(
                &mut cursor,
                "/* wide */ SELECT 1e30::DECIMAL, 123456789012345678901234567890.5::DECIMAL, \
                 'NaN'::DECIMAL, '1.2.3.4'::INET, ARRAY['12 hours'::INTERVAL], ARRAY[1.5::FLOAT4], \
                 '12:00:00+02'::TIMETZ",
                &QueryParams::None,
            )
            .await
            .unwrap()
        };

        assert_eq!(result.status_message.as_deref(), Some("SELECT 1"));
        assert_eq!(
            result.rows,
            vec![Row::Tuple(vec![
                CellValue::Float(1e30),
                CellValue::Float(123456789012345678901234567890.5),
                CellValue::Text("NaN".into()),
                CellValue::Text("1.2.3.4".into()),
                CellValue::Array(vec![CellValue::Text("12:00:00".into())]),
                CellValue::Array(vec![CellValue::Float(1.5)]),
                CellValue::Text("12:00:00+02".into()),
            ])]
        );
        conn.close().await;
    });
}

#[test]
fn test_ddl_has_no_rows() {
    let config = require_cluster!();
    let state = ModuleState::new(false).unwrap();
    let table = unique_name("crdb_it");

    state.block_on(async {
        let params = map_connection_params(&config);
        let options = ConnectOptions::default().autocommit(true).row_shape(RowShape::Keyed);
        let mut conn = connect(&params, options, &state).await.unwrap().unwrap();
        let mut cursor = conn.cursor();

        let created = QueryService::execute(&mut cursor, &format!("CREATE TABLE {table} (a INT)"), &QueryParams::None)
            .await
            .unwrap();
        assert!(created.rows.is_empty());

        let mut named = serde_json::Map::new();
        named.insert("a".into(), json!(7));
        let inserted = QueryService::execute(
            &mut cursor,
            &format!("INSERT INTO {table} VALUES (%(a)s), (%(a)s)"),
            &QueryParams::Named(named),
        )
        .await
        .unwrap();
        assert_eq!(inserted.row_count, Some(2));

        QueryService::execute(&mut cursor, &format!("DROP TABLE {table}"), &QueryParams::None)
            .await
            .unwrap();
        drop(cursor);
        conn.close().await;
    });
}

#[test]
fn test_info_collects_catalogs() {
    let config = require_cluster!();
    let state = ModuleState::new(false).unwrap();

    state.block_on(async {
        let params = map_connection_params(&config);
        let options = ConnectOptions::default().autocommit(true).row_shape(RowShape::Keyed);
        let mut conn = connect(&params, options, &state).await.unwrap().unwrap();

        let server = {
            let mut cursor = conn.cursor();
            info::collect(&mut cursor).await.unwrap()
        };

        assert!(server.version.is_parsed());
        assert!(server.databases.contains_key("defaultdb"));
        assert!(server.users.contains_key("root"));
        assert!(!server.settings.is_empty());
        conn.close().await;
    });
}

#[test]
fn test_database_lifecycle() {
    let config = require_cluster!();
    let state = ModuleState::new(false).unwrap();
    let name = unique_name("crdb_db");

    state.block_on(async {
        let params = map_connection_params(&config);
        let options = ConnectOptions::default().autocommit(true).row_shape(RowShape::Keyed);
        let mut conn = connect(&params, options, &state).await.unwrap().unwrap();
        let mut cursor = conn.cursor();

        let present = DatabaseSpec::present(name.as_str());
        let created = database::reconcile(&mut cursor, &present, false, ExecutedStatements::new())
            .await
            .unwrap();
        assert!(created.changed);
        assert!(created.state.exists);

        let again = database::reconcile(&mut cursor, &present, false, ExecutedStatements::new())
            .await
            .unwrap();
        assert!(!again.changed);

        let absent = DatabaseSpec::absent(name.as_str());
        let dropped = database::reconcile(&mut cursor, &absent, false, ExecutedStatements::new())
            .await
            .unwrap();
        assert!(dropped.changed);
        assert!(!dropped.state.exists);

        drop(cursor);
        conn.close().await;
    });
}

#[test]
fn test_unreachable_node_soft_fails() {
    let _ = require_cluster!();
    let state = ModuleState::new(false).unwrap();

    let mut config = ConnectionConfig::new();
    config.login_host = Some("127.0.0.1".into());
    config.login_port = Some(1);
    config.ssl_mode = Some(SslMode::Disable);

    let handle = state.block_on(async {
        let options = ConnectOptions::default().fail_on_connect_error(false);
        connect(&map_connection_params(&config), options, &state).await.unwrap()
    });

    assert!(handle.is_none());
    assert_eq!(state.warnings().len(), 1);
}
