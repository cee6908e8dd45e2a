//! The JSON result document printed on stdout.

use crdb_core::CrdbError;

use serde::Serialize;
use serde_json::{Map, Value};
use std::process::ExitCode;

/// Result of one module run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleOutput {
    pub changed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Suggested remedy for a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Module-specific fields, merged into the top level
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ModuleOutput {
    pub fn changed(changed: bool) -> Self {
        Self { changed, ..Self::default() }
    }

    /// A run that did nothing because the module cannot honor check mode.
    pub fn skipped(msg: impl Into<String>) -> Self {
        Self { skipped: true, msg: Some(msg.into()), ..Self::default() }
    }

    /// A failed run carrying the error's message and hint.
    pub fn failure(err: &CrdbError) -> Self {
        Self {
            failed: true,
            msg: Some(err.to_string()),
            hint: err.hint().map(String::from),
            ..Self::default()
        }
    }

    /// Merge the fields of `payload`, which must serialize to a JSON object.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, CrdbError> {
        match serde_json::to_value(payload)
            .map_err(|e| CrdbError::internal(format!("Failed to serialize module result: {e}")))?
        {
            Value::Object(fields) => {
                self.payload.extend(fields);
                Ok(self)
            }
            other => Err(CrdbError::internal(format!("module result is not an object: {other}"))),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize module output");
            format!(
                r#"{{"changed": false, "failed": true, "msg": {}}}"#,
                Value::String(format!("Failed to serialize module output: {e}"))
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_document() {
        let output = ModuleOutput::changed(true)
            .with_payload(&json!({"rowcount": 1, "statusmessage": "INSERT 0 1"}))
            .unwrap();
        let doc: Value = serde_json::from_str(&output.to_json()).unwrap();
        assert_eq!(doc, json!({"changed": true, "rowcount": 1, "statusmessage": "INSERT 0 1"}));
        assert!(!output.failed);
    }

    #[test]
    fn test_failure_document() {
        let err = CrdbError::execution("SELEC 1", "syntax error");
        let output = ModuleOutput::failure(&err).with_warnings(vec!["careful".into()]);
        let doc: Value = serde_json::from_str(&output.to_json()).unwrap();
        assert_eq!(
            doc,
            json!({
                "changed": false,
                "failed": true,
                "msg": "Cannot execute query \"SELEC 1\": syntax error",
                "warnings": ["careful"]
            })
        );
        assert!(output.failed);
    }

    #[test]
    fn test_failure_document_carries_hint() {
        let err = CrdbError::connection("connection refused");
        let doc: Value = serde_json::from_str(&ModuleOutput::failure(&err).to_json()).unwrap();
        assert_eq!(doc["msg"], json!("unable to connect to database: connection refused"));
        assert_eq!(doc["hint"], json!("Check that the CockroachDB node is running"));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(ModuleOutput::changed(false).with_payload(&json!([1])).is_err());
    }
}
