//! Database lifecycle reconciliation.
//!
//! Compares a `DatabaseSpec` with what `SHOW DATABASES` reports and issues the
//! smallest set of DDL statements that closes the gap. Every issued statement
//! is appended to the caller's `ExecutedStatements`.

use crate::error::CrdbError;
use crate::models::{
    CellValue, DatabaseSpec, DatabaseState, DesiredState, ExecutedStatements, QueryParams,
    SurvivalGoal,
};
use crate::services::cursor::Cursor;
use crate::services::query::QueryService;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Whether anything changed (or would have, in dry-run mode)
    pub changed: bool,
    /// Observed state after reconciling
    pub state: DatabaseState,
    /// Audit trail, including statements recorded before this call
    pub executed_statements: ExecutedStatements,
    /// Requested changes that were not applied
    pub warnings: Vec<String>,
}

/// Quote an identifier for interpolation into DDL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the `CREATE DATABASE` statement for `spec`.
///
/// Optional clauses follow a fixed order: primary region, regions, survival
/// goal, owner.
pub fn create_statement(spec: &DatabaseSpec) -> String {
    let mut sql = format!("CREATE DATABASE {}", quote_identifier(&spec.name));

    if let Some(region) = spec.primary_region.as_deref().filter(|r| !r.is_empty()) {
        sql.push_str(&format!(" PRIMARY REGION {}", quote_identifier(region)));
    }
    if let Some(regions) = spec.regions.as_ref().filter(|r| !r.is_empty()) {
        let quoted: Vec<String> = regions.iter().map(|r| quote_identifier(r)).collect();
        sql.push_str(&format!(" REGIONS {}", quoted.join(", ")));
    }
    if let Some(goal) = spec.survive_failure {
        sql.push_str(&format!(" SURVIVE {} FAILURE", goal.as_sql()));
    }
    if let Some(owner) = spec.owner.as_deref().filter(|o| !o.is_empty()) {
        sql.push_str(&format!(" OWNER {}", quote_identifier(owner)));
    }

    sql
}

/// Read the current state of database `name`.
pub async fn fetch_state<C>(cursor: &mut C, name: &str) -> Result<DatabaseState, CrdbError>
where
    C: Cursor + ?Sized,
{
    let result = QueryService::execute(cursor, "SHOW DATABASES", &QueryParams::None).await?;
    let columns = result.column_names();

    let text = |value: Option<&CellValue>| {
        value.and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(String::from)
    };

    let found = result.rows.iter().find(|row| {
        row.get("database_name", &columns).and_then(|v| v.as_str()) == Some(name)
    });

    let state = match found {
        Some(row) => DatabaseState {
            name: name.to_string(),
            exists: true,
            owner: text(row.get("owner", &columns)),
            primary_region: text(row.get("primary_region", &columns)),
            regions: row.get("regions", &columns).map(|v| v.to_string_list()).unwrap_or_default(),
            survival_goal: text(row.get("survival_goal", &columns)),
        },
        None => DatabaseState::missing(name),
    };

    tracing::debug!(database = name, exists = state.exists, "Fetched database state");
    Ok(state)
}

/// Bring database `spec.name` to the desired state.
///
/// With `dry_run` set no DDL runs and nothing is recorded, but `changed`
/// reports what would have happened.
pub async fn reconcile<C>(
    cursor: &mut C,
    spec: &DatabaseSpec,
    dry_run: bool,
    executed: ExecutedStatements,
) -> Result<Reconciliation, CrdbError>
where
    C: Cursor + ?Sized,
{
    let mut ddl = Ddl { dry_run, executed, changed: false };
    let mut warnings = Vec::new();

    let observed = fetch_state(cursor, &spec.name).await?;
    tracing::debug!(
        database = %spec.name,
        desired = ?spec.state,
        exists = observed.exists,
        dry_run,
        "Reconciling database"
    );

    let (observed, final_name) = match spec.state {
        DesiredState::Absent => {
            if observed.exists {
                ddl.run(cursor, format!("DROP DATABASE {}", quote_identifier(&spec.name))).await?;
            }
            (observed, spec.name.as_str())
        }
        DesiredState::Present if !observed.exists => match spec.rename_target() {
            Some(target) => {
                let renamed = fetch_state(cursor, target).await?;
                if renamed.exists {
                    // Already renamed by an earlier run.
                    alter_existing(cursor, spec, &renamed, &mut ddl, &mut warnings).await?;
                    (renamed, target)
                } else {
                    ddl.run(cursor, create_statement(spec)).await?;
                    ddl.run(cursor, rename_statement(&spec.name, target)).await?;
                    (observed, target)
                }
            }
            None => {
                ddl.run(cursor, create_statement(spec)).await?;
                (observed, spec.name.as_str())
            }
        },
        DesiredState::Present => {
            alter_existing(cursor, spec, &observed, &mut ddl, &mut warnings).await?;
            if let Some(target) = spec.rename_target() {
                ddl.run(cursor, rename_statement(&spec.name, target)).await?;
                (observed, target)
            } else {
                (observed, spec.name.as_str())
            }
        }
    };

    let state = if ddl.changed && !dry_run {
        fetch_state(cursor, final_name).await?
    } else {
        observed
    };

    Ok(Reconciliation { changed: ddl.changed, state, executed_statements: ddl.executed, warnings })
}

fn rename_statement(name: &str, target: &str) -> String {
    format!("ALTER DATABASE {} RENAME TO {}", quote_identifier(name), quote_identifier(target))
}

/// Owner changes on an existing database, plus warnings for attributes that
/// cannot be altered here.
async fn alter_existing<C>(
    cursor: &mut C,
    spec: &DatabaseSpec,
    observed: &DatabaseState,
    ddl: &mut Ddl,
    warnings: &mut Vec<String>,
) -> Result<(), CrdbError>
where
    C: Cursor + ?Sized,
{
    if let Some(owner) = spec.owner.as_deref().filter(|o| !o.is_empty()) {
        if observed.owner.as_deref() != Some(owner) {
            let sql = format!(
                "ALTER DATABASE {} OWNER TO {}",
                quote_identifier(&observed.name),
                quote_identifier(owner)
            );
            ddl.run(cursor, sql).await?;
        }
    }

    if let Some(region) = spec.primary_region.as_deref().filter(|r| !r.is_empty()) {
        if observed.primary_region.as_deref() != Some(region) {
            warnings.push(unsupported(&observed.name, "primary_region"));
        }
    }
    if let Some(regions) = spec.regions.as_ref() {
        let mut wanted: Vec<&str> = regions.iter().map(String::as_str).collect();
        let mut current: Vec<&str> = observed.regions.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        current.sort_unstable();
        if wanted != current {
            warnings.push(unsupported(&observed.name, "regions"));
        }
    }
    if let Some(goal) = spec.survive_failure {
        if !survival_matches(goal, observed.survival_goal.as_deref()) {
            warnings.push(unsupported(&observed.name, "survive_failure"));
        }
    }

    Ok(())
}

fn survival_matches(goal: SurvivalGoal, observed: Option<&str>) -> bool {
    observed.is_some_and(|current| current.eq_ignore_ascii_case(goal.as_str()))
}

fn unsupported(database: &str, attribute: &str) -> String {
    tracing::warn!(database, attribute, "Attribute cannot be changed on an existing database");
    format!("Changing {attribute} of existing database \"{database}\" is not supported; no statement was issued")
}

/// DDL runner that honors dry-run and keeps the audit trail.
struct Ddl {
    dry_run: bool,
    executed: ExecutedStatements,
    changed: bool,
}

impl Ddl {
    async fn run<C>(&mut self, cursor: &mut C, sql: String) -> Result<(), CrdbError>
    where
        C: Cursor + ?Sized,
    {
        self.changed = true;
        if self.dry_run {
            tracing::debug!(statement = %sql, "Dry run, statement skipped");
            return Ok(());
        }

        tracing::debug!(statement = %sql, "Executing DDL");
        if let Err(err) = cursor.execute(&sql, &QueryParams::None).await {
            tracing::warn!(statement = %sql, error = %err, "DDL failed");
            return Err(CrdbError::definition(sql, err.message()));
        }
        self.executed.record(sql);
        Ok(())
    }
}
