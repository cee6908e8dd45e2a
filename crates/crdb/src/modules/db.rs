//! The `db` module: reconcile one database.

use crate::args::DbArgs;
use crate::output::ModuleOutput;

use crdb_core::models::{ExecutedStatements, RowShape};
use crdb_core::services::database::{reconcile, Reconciliation};
use crdb_core::services::{connect, map_connection_params, ConnectOptions};
use crdb_core::{CrdbError, ModuleState};

use serde::Serialize;

#[derive(Debug, Serialize)]
struct DbPayload<'a> {
    executed_statements: &'a ExecutedStatements,
    exists: bool,
    owner: Option<&'a str>,
    primary_region: Option<&'a str>,
    regions: &'a [String],
    survive_failure: Option<&'a str>,
}

pub fn run(state: &ModuleState, args: DbArgs) -> Result<ModuleOutput, CrdbError> {
    let conn_params = map_connection_params(&args.connection);
    let options = ConnectOptions::default().autocommit(true).row_shape(RowShape::Keyed);

    let reconciliation = state.block_on(async {
        let Some(mut conn) = connect(&conn_params, options, state).await? else {
            return Err(CrdbError::connection("no connection was opened"));
        };

        let outcome = {
            let mut cursor = conn.cursor();
            reconcile(&mut cursor, &args.database, state.check_mode(), ExecutedStatements::new()).await
        };

        conn.close().await;
        outcome
    })?;

    state.extend_warnings(reconciliation.warnings.iter().cloned());
    output_for(&reconciliation)
}

fn output_for(reconciliation: &Reconciliation) -> Result<ModuleOutput, CrdbError> {
    let state = &reconciliation.state;
    tracing::info!(
        database = %state.name,
        changed = reconciliation.changed,
        statements = reconciliation.executed_statements.len(),
        "Database module finished"
    );

    ModuleOutput::changed(reconciliation.changed).with_payload(&DbPayload {
        executed_statements: &reconciliation.executed_statements,
        exists: state.exists,
        owner: state.owner.as_deref(),
        primary_region: state.primary_region.as_deref(),
        regions: &state.regions,
        survive_failure: state.survival_goal.as_deref(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crdb_core::DatabaseState;
    use serde_json::{json, Value};

    #[test]
    fn test_output_after_create() {
        let mut executed = ExecutedStatements::new();
        executed.record("CREATE DATABASE \"movr\" OWNER \"alice\"");
        let reconciliation = Reconciliation {
            changed: true,
            state: DatabaseState {
                name: "movr".into(),
                exists: true,
                owner: Some("alice".into()),
                primary_region: None,
                regions: Vec::new(),
                survival_goal: None,
            },
            executed_statements: executed,
            warnings: Vec::new(),
        };

        let doc: Value = serde_json::from_str(&output_for(&reconciliation).unwrap().to_json()).unwrap();
        assert_eq!(
            doc,
            json!({
                "changed": true,
                "executed_statements": [["CREATE DATABASE \"movr\" OWNER \"alice\"", []]],
                "exists": true,
                "owner": "alice",
                "primary_region": null,
                "regions": [],
                "survive_failure": null
            })
        );
    }

    #[test]
    fn test_output_for_missing_database() {
        let reconciliation = Reconciliation {
            changed: false,
            state: DatabaseState::missing("movr"),
            executed_statements: ExecutedStatements::new(),
            warnings: Vec::new(),
        };
        let output = output_for(&reconciliation).unwrap();
        assert!(!output.changed);
        assert_eq!(output.payload["exists"], json!(false));
        assert_eq!(output.payload["executed_statements"], json!([]));
    }
}
