//! Revisit tool — the regression capability as seen by a task's external actor.
//!
//! Installed on a task only when at least one other task has already started.
//! The description and schema enumerate the eligible tasks so a model can
//! pick from them directly.

use std::time::Instant;

use async_trait::async_trait;

use crate::context::TaskContext;
use crate::error::RegressionError;
use crate::group::regression::RegressionHandle;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str_array};

/// Registered name of the revisit tool.
pub const REVISIT_TASKS_TOOL: &str = "revisit_tasks";

/// Tool that sends execution back to earlier tasks.
pub struct RevisitTasksTool {
    handle: RegressionHandle,
    description: String,
}

impl RevisitTasksTool {
    pub fn new(handle: RegressionHandle) -> Self {
        let mut description = String::from(
            "Go back to one or more earlier steps, for example when the user wants to \
             change an answer they already gave. The listed steps run again in the order \
             given, then the current step resumes. Available steps:",
        );
        for task in handle.eligible() {
            description.push_str(&format!("\n- {}: {}", task.id, task.description));
        }
        Self {
            handle,
            description,
        }
    }
}

#[async_trait]
impl Tool for RevisitTasksTool {
    fn name(&self) -> &str {
        REVISIT_TASKS_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let ids: Vec<&str> = self.handle.eligible().iter().map(|t| t.id.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_ids": {
                    "type": "array",
                    "items": {"type": "string", "enum": ids},
                    "minItems": 1,
                    "description": "Steps to revisit, in the order they should run"
                }
            },
            "required": ["task_ids"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let task_ids = require_str_array(&params, "task_ids")?;

        if ctx.task_id != self.handle.task_id() {
            return Err(ToolError::ExecutionFailed(format!(
                "revisit capability belongs to task {}",
                self.handle.task_id()
            )));
        }

        self.handle
            .request(task_ids.clone())
            .await
            .map_err(|e| match e {
                RegressionError::EmptyRequest | RegressionError::InvalidTarget { .. } => {
                    ToolError::InvalidParameters(e.to_string())
                }
                other => ToolError::ExecutionFailed(other.to_string()),
            })?;

        Ok(ToolOutput::text(
            format!("Returning to: {}", task_ids.join(", ")),
            start.elapsed(),
        ))
    }
}
