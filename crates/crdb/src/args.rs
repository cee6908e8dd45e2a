//! Module argument documents.
//!
//! Arguments arrive as one JSON object, either flat or wrapped as
//! `{"ANSIBLE_MODULE_ARGS": {...}}`. `_ansible_check_mode` turns on dry-run;
//! every other `_ansible_*` key is dropped before deserialization.

use crdb_core::models::{ConnectionConfig, DatabaseSpec, QueryParams, RowShape};
use crdb_core::CrdbError;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

const WRAPPER_KEY: &str = "ANSIBLE_MODULE_ARGS";
const CHECK_MODE_KEY: &str = "_ansible_check_mode";
const INTERNAL_PREFIX: &str = "_ansible_";

/// Typed arguments of one module.
pub trait ModuleArgs: DeserializeOwned {
    /// Cross-field checks that serde cannot express.
    fn validate(&self) -> Result<(), CrdbError> {
        Ok(())
    }
}

/// A loaded argument document.
#[derive(Debug, Clone)]
pub struct ArgumentDocument {
    values: Map<String, Value>,
    check_mode: bool,
}

impl ArgumentDocument {
    /// Read a document from `path`, or from stdin when `path` is `-`.
    pub fn load(path: &Path) -> Result<Self, CrdbError> {
        let text = if path == Path::new("-") {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| CrdbError::invalid_argument(format!("cannot read arguments from stdin: {e}")))?;
            text
        } else {
            std::fs::read_to_string(path).map_err(|e| {
                CrdbError::invalid_argument(format!("cannot read arguments from {}: {e}", path.display()))
            })?
        };
        tracing::debug!(path = %path.display(), bytes = text.len(), "Loaded argument document");
        Self::parse_str(&text)
    }

    pub fn parse_str(text: &str) -> Result<Self, CrdbError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, CrdbError> {
        let Value::Object(mut values) = value else {
            return Err(CrdbError::invalid_argument("module arguments must be a JSON object"));
        };

        if let Some(inner) = values.remove(WRAPPER_KEY) {
            let Value::Object(inner) = inner else {
                return Err(CrdbError::invalid_argument(format!("{WRAPPER_KEY} must be a JSON object")));
            };
            values = inner;
        }

        let check_mode = values.get(CHECK_MODE_KEY).and_then(Value::as_bool).unwrap_or(false);
        values.retain(|key, _| !key.starts_with(INTERNAL_PREFIX));

        Ok(Self { values, check_mode })
    }

    /// Whether the document asks for dry-run mode.
    pub fn check_mode(&self) -> bool {
        self.check_mode
    }

    /// Deserialize and validate the module's arguments.
    pub fn into_args<T: ModuleArgs>(self) -> Result<T, CrdbError> {
        let args: T = serde_json::from_value(Value::Object(self.values))
            .map_err(|e| CrdbError::invalid_argument(format!("invalid module arguments: {e}")))?;
        args.validate()?;
        Ok(args)
    }
}

/// Arguments of the `query` module.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryArgs {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    pub query: String,
    #[serde(default)]
    pub positional_args: Option<Vec<Value>>,
    #[serde(default)]
    pub named_args: Option<Map<String, Value>>,
    #[serde(default)]
    pub rows_type: RowShape,
    #[serde(default)]
    pub autocommit: bool,
}

impl QueryArgs {
    pub fn params(&self) -> Result<QueryParams, CrdbError> {
        QueryParams::from_args(self.positional_args.clone(), self.named_args.clone())
            .map_err(CrdbError::invalid_argument)
    }
}

impl ModuleArgs for QueryArgs {
    fn validate(&self) -> Result<(), CrdbError> {
        if self.query.trim().is_empty() {
            return Err(CrdbError::invalid_argument("query must not be empty"));
        }
        self.params().map(|_| ())
    }
}

/// Arguments of the `db` module.
#[derive(Debug, Clone, Deserialize)]
pub struct DbArgs {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub database: DatabaseSpec,
}

impl ModuleArgs for DbArgs {
    fn validate(&self) -> Result<(), CrdbError> {
        if self.database.name.is_empty() {
            return Err(CrdbError::invalid_argument("name must not be empty"));
        }
        Ok(())
    }
}

/// Arguments of the `info` module.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoArgs {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
}

impl ModuleArgs for InfoArgs {}
