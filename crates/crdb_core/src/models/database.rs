//! Database lifecycle models.

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Desired existence of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

/// Failure domain a multi-region database must survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurvivalGoal {
    Region,
    Zone,
}

impl SurvivalGoal {
    /// SQL keyword for the `SURVIVE ... FAILURE` clause.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Region => "REGION",
            Self::Zone => "ZONE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Zone => "zone",
        }
    }
}

impl fmt::Display for SurvivalGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The database an invocation wants to exist (or not).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Database name
    pub name: String,
    /// Desired existence
    #[serde(default)]
    pub state: DesiredState,
    /// Owner role
    #[serde(default)]
    pub owner: Option<String>,
    /// New name to rename the database to
    #[serde(default)]
    pub target: Option<String>,
    /// Primary region (creation only)
    #[serde(default)]
    pub primary_region: Option<String>,
    /// Database regions (creation only)
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    /// Survival goal (creation only)
    #[serde(default)]
    pub survive_failure: Option<SurvivalGoal>,
}

impl DatabaseSpec {
    /// Desired-present spec for `name` with no optional attributes.
    pub fn present(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Desired-absent spec for `name`.
    pub fn absent(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: DesiredState::Absent, ..Self::default() }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_primary_region(mut self, region: impl Into<String>) -> Self {
        self.primary_region = Some(region.into());
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_survival_goal(mut self, goal: SurvivalGoal) -> Self {
        self.survive_failure = Some(goal);
        self
    }

    /// Rename target, ignoring an empty string or one equal to `name`.
    pub fn rename_target(&self) -> Option<&str> {
        self.target.as_deref().filter(|target| !target.is_empty() && *target != self.name)
    }
}

/// Observed database attributes, fetched fresh on every reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DatabaseState {
    pub name: String,
    pub exists: bool,
    pub owner: Option<String>,
    pub primary_region: Option<String>,
    pub regions: Vec<String>,
    pub survival_goal: Option<String>,
}

impl DatabaseState {
    /// State of a database that does not exist.
    pub fn missing(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// One audited statement: SQL text and its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<serde_json::Value>,
}

/// Serialized as `[sql, [params...]]`.
impl Serialize for ExecutedStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.sql)?;
        tuple.serialize_element(&self.params)?;
        tuple.end()
    }
}

/// Append-only audit trail of statements issued during one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutedStatements(Vec<ExecutedStatement>);

impl ExecutedStatements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a statement that takes no parameters.
    pub fn record(&mut self, sql: impl Into<String>) {
        self.0.push(ExecutedStatement { sql: sql.into(), params: Vec::new() });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutedStatement> {
        self.0.iter()
    }

    /// Statement texts in execution order.
    pub fn statements(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.sql.as_str()).collect()
    }
}
