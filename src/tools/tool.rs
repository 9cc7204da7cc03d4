//! Tool trait and shared helpers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::context::TaskContext;

/// Errors returned to whoever invoked a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }
}

/// A capability a task's external actor can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the parameters object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Read a required array-of-strings parameter.
pub fn require_str_array(params: &serde_json::Value, key: &str) -> Result<Vec<String>, ToolError> {
    let values = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{key}' parameter")))?;
    values
        .iter()
        .map(|v| {
            v.as_str().map(String::from).ok_or_else(|| {
                ToolError::InvalidParameters(format!("'{key}' must contain only strings"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_array_reports_missing_key() {
        let err = require_str_array(&serde_json::json!({}), "task_ids").unwrap_err();
        assert!(err.to_string().contains("task_ids"));
    }

    #[test]
    fn require_str_array_rejects_mixed_types() {
        let ok = serde_json::json!({"ids": ["a", "b"]});
        assert_eq!(require_str_array(&ok, "ids").unwrap(), vec!["a", "b"]);

        let mixed = serde_json::json!({"ids": ["a", 1]});
        assert!(matches!(
            require_str_array(&mixed, "ids"),
            Err(ToolError::InvalidParameters(_))
        ));
    }
}
