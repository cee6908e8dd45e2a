//! Catalog aggregation for the info module.

use crate::error::CrdbError;
use crate::models::{parse_version, CellValue, QueryParams, Row, VersionInfo};
use crate::services::cursor::Cursor;
use crate::services::query::QueryService;

use serde::Serialize;
use std::collections::BTreeMap;

/// Catalog rows keyed by one column, each holding the selected value columns.
pub type CatalogMap = BTreeMap<String, BTreeMap<String, CellValue>>;

/// Everything the info module reports about a cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub version: VersionInfo,
    pub databases: CatalogMap,
    pub users: CatalogMap,
    pub settings: CatalogMap,
    pub regions: CatalogMap,
}

/// One fixed catalog query and how to key it.
struct CatalogQuery {
    sql: &'static str,
    key: &'static str,
    values: &'static [&'static str],
}

const DATABASES: CatalogQuery = CatalogQuery {
    sql: "SHOW DATABASES WITH COMMENT",
    key: "database_name",
    values: &["owner", "primary_region", "regions", "survival_goal", "comment"],
};

const USERS: CatalogQuery = CatalogQuery {
    sql: "SHOW USERS",
    key: "username",
    values: &["options", "member_of"],
};

const SETTINGS: CatalogQuery = CatalogQuery {
    sql: "SHOW CLUSTER SETTINGS",
    key: "variable",
    values: &["value", "setting_type", "description"],
};

const REGIONS: CatalogQuery = CatalogQuery {
    sql: "SHOW REGIONS",
    key: "region",
    values: &["zones", "database_names", "primary_region_of"],
};

/// Run `query` and key its rows by `key_column`.
///
/// Later rows overwrite earlier ones with the same key. Only `value_columns`
/// are copied, and a value column missing from the result is left out of
/// every entry.
pub async fn gather<C>(
    cursor: &mut C,
    query: &str,
    key_column: &str,
    value_columns: &[&str],
) -> Result<CatalogMap, CrdbError>
where
    C: Cursor + ?Sized,
{
    tracing::debug!(query, key_column, "Gathering catalog");

    let result = QueryService::execute(cursor, query, &QueryParams::None).await?;
    let mut map = CatalogMap::new();
    if result.rows.is_empty() {
        return Ok(map);
    }

    let columns = result.column_names();
    for row in &result.rows {
        let Some(key) = row.get(key_column, &columns) else {
            tracing::warn!(query, key_column, "Key column missing from catalog result");
            return Err(CrdbError::fetch(query, format!("column \"{key_column}\" not found")));
        };

        let entry = value_columns
            .iter()
            .filter_map(|name| row.get(name, &columns).map(|value| (name.to_string(), value.clone())))
            .collect();
        map.insert(key.as_key(), entry);
    }

    Ok(map)
}

async fn gather_catalog<C>(cursor: &mut C, query: &CatalogQuery) -> Result<CatalogMap, CrdbError>
where
    C: Cursor + ?Sized,
{
    gather(cursor, query.sql, query.key, query.values).await
}

/// Fetch and parse the server version banner.
pub async fn server_version<C>(cursor: &mut C) -> Result<VersionInfo, CrdbError>
where
    C: Cursor + ?Sized,
{
    const SQL: &str = "SELECT version()";

    let result = QueryService::execute(cursor, SQL, &QueryParams::None).await?;
    let raw = result
        .rows
        .first()
        .and_then(|row| match row {
            Row::Tuple(values) => values.first(),
            Row::Keyed(pairs) => pairs.first().map(|(_, v)| v),
        })
        .and_then(CellValue::as_str)
        .ok_or_else(|| CrdbError::fetch(SQL, "server returned no version"))?;

    let version = parse_version(raw);
    tracing::debug!(raw, parsed = version.is_parsed(), "Server version");
    version.into_result()
}

/// Run the fixed catalog set against one connection.
pub async fn collect<C>(cursor: &mut C) -> Result<ServerInfo, CrdbError>
where
    C: Cursor + ?Sized,
{
    let version = server_version(cursor).await?;
    let databases = gather_catalog(cursor, &DATABASES).await?;
    let users = gather_catalog(cursor, &USERS).await?;
    let settings = gather_catalog(cursor, &SETTINGS).await?;
    let regions = gather_catalog(cursor, &REGIONS).await?;

    tracing::info!(
        databases = databases.len(),
        users = users.len(),
        settings = settings.len(),
        regions = regions.len(),
        "Collected server info"
    );

    Ok(ServerInfo { version, databases, users, settings, regions })
}
