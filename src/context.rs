//! Task context — the execution environment handed to a running task.

use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RegressionError;
use crate::group::regression::RegressionHandle;
use crate::history::{ChatHistory, ToolCallRecord, ToolOutputRecord};
use crate::tools::{ToolError, ToolOutput, ToolRegistry};

/// Environment for one task iteration.
///
/// Built fresh by the scheduler each time a task is popped from the queue.
/// The history is a private copy of the group history; the group adopts it
/// back when the iteration ends.
pub struct TaskContext {
    /// Id of the group run this iteration belongs to.
    pub run_id: Uuid,
    /// Id the task was registered under.
    pub task_id: String,
    /// 1 for the first start of this id in the run, incremented on every re-run.
    pub attempt: u32,
    /// Private copy of the group history.
    pub history: ChatHistory,
    /// When the iteration started.
    pub started_at: DateTime<Utc>,
    tools: ToolRegistry,
    regression: Option<RegressionHandle>,
}

impl TaskContext {
    pub(crate) fn new(
        run_id: Uuid,
        task_id: impl Into<String>,
        attempt: u32,
        history: ChatHistory,
        tools: ToolRegistry,
        regression: Option<RegressionHandle>,
    ) -> Self {
        Self {
            run_id,
            task_id: task_id.into(),
            attempt,
            history,
            started_at: Utc::now(),
            tools,
            regression,
        }
    }

    /// A context outside of any group run: empty history, no tools, no
    /// regression capability.
    pub fn detached(task_id: impl Into<String>) -> Self {
        Self::new(
            Uuid::new_v4(),
            task_id,
            1,
            ChatHistory::new(),
            ToolRegistry::new(),
            None,
        )
    }

    /// Tools installed for this iteration.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The regression capability, if any other task has already started.
    pub fn regression(&self) -> Option<&RegressionHandle> {
        self.regression.as_ref()
    }

    /// Ask the scheduler to re-run `targets` before this task.
    ///
    /// On success the scheduler discards this task instance; the caller
    /// should not expect to keep running.
    pub async fn request_regression<I, S>(&self, targets: I) -> Result<(), RegressionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match &self.regression {
            Some(handle) => handle.request(targets).await,
            None => Err(RegressionError::NotInstalled {
                task_id: self.task_id.clone(),
            }),
        }
    }

    /// Run a tool and record the call and its output in the history.
    pub async fn call_tool(
        &mut self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let call_id = Uuid::new_v4().to_string();
        self.history.add_tool_call(ToolCallRecord {
            call_id: call_id.clone(),
            name: name.to_string(),
            arguments: params.clone(),
        });

        let start = Instant::now();
        let result = self.tools.execute(name, params, self).await;
        tracing::debug!(
            task = %self.task_id,
            tool = %name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Tool call finished"
        );

        let (output, is_error) = match &result {
            Ok(out) => (
                match &out.result {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                false,
            ),
            Err(e) => (e.to_string(), true),
        };
        self.history.add_tool_output(ToolOutputRecord {
            call_id,
            name: name.to_string(),
            output,
            is_error,
        });
        result
    }

    /// Consume the context, keeping its history.
    pub fn into_history(self) -> ChatHistory {
        self.history
    }
}
