//! Task trait — one unit of work in a group.

use async_trait::async_trait;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::group::regression::RegressionSignal;

/// A unit of work run by the scheduler.
///
/// A fresh instance is created from the registered factory every time the
/// task's id is popped from the queue. If the task's external actor requests
/// a regression while `run` is pending, the scheduler drops the future; any
/// in-flight sub-work must be safe to abandon.
#[async_trait]
pub trait Task: Send {
    async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError>;
}

/// How one iteration of the scheduler ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task finished with a value.
    Completed(serde_json::Value),
    /// The task was interrupted by an accepted regression request.
    Regressed(RegressionSignal),
    /// The task failed.
    Failed(TaskError),
}

impl From<Result<serde_json::Value, TaskError>> for TaskOutcome {
    fn from(result: Result<serde_json::Value, TaskError>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(error) => Self::Failed(error),
        }
    }
}
