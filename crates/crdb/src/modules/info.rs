//! The `info` module: version and catalog information.
//!
//! An unreachable server is not a failure here; the run succeeds with a
//! warning and no information.

use crate::args::InfoArgs;
use crate::output::ModuleOutput;

use crdb_core::models::RowShape;
use crdb_core::services::info::{collect, ServerInfo};
use crdb_core::services::{connect, map_connection_params, ConnectOptions};
use crdb_core::{CrdbError, ModuleState};

pub fn run(state: &ModuleState, args: InfoArgs) -> Result<ModuleOutput, CrdbError> {
    let conn_params = map_connection_params(&args.connection);
    let options = ConnectOptions::default()
        .autocommit(true)
        .row_shape(RowShape::Keyed)
        .fail_on_connect_error(false);

    let info = state.block_on(async {
        let Some(mut conn) = connect(&conn_params, options, state).await? else {
            return Ok::<_, CrdbError>(None);
        };

        let outcome = {
            let mut cursor = conn.cursor();
            collect(&mut cursor).await
        };

        conn.close().await;
        outcome.map(Some)
    })?;

    output_for(info.as_ref())
}

fn output_for(info: Option<&ServerInfo>) -> Result<ModuleOutput, CrdbError> {
    let output = ModuleOutput::changed(false);
    match info {
        Some(info) => output.with_payload(info),
        None => Ok(output),
    }
}
