//! Result aggregation for a group run.

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// A task failure captured under collect-and-continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedFailure {
    /// Display text of the original error.
    pub message: String,
}

/// Terminal outcome recorded for a task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Completed(serde_json::Value),
    Failed(CapturedFailure),
}

impl TaskResult {
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Completed(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CapturedFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Task id → outcome, ordered by most recent completion.
///
/// Recording an id that is already present moves it to the end, so a task
/// that was re-run after a regression is ordered by its last completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: Vec<(String, TaskResult)>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, task_id: impl Into<String>, result: TaskResult) {
        let task_id = task_id.into();
        self.entries.retain(|(id, _)| *id != task_id);
        self.entries.push((task_id, result));
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.entries
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, result)| result)
    }

    /// Successful value for `task_id`, if any.
    pub fn value(&self, task_id: &str) -> Option<&serde_json::Value> {
        self.get(task_id).and_then(TaskResult::value)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.get(task_id).is_some()
    }

    /// Ids in result order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskResult)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, result) in &self.entries {
            map.serialize_entry(id, result)?;
        }
        map.end()
    }
}

/// Final outcome of a group run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskGroupResult {
    pub results: ResultSet,
}

/// Passed to the completion handler after each successful task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCompletedEvent {
    pub task_id: String,
    pub result: serde_json::Value,
}

/// Called after each task completes successfully, in completion order.
///
/// An error aborts the whole run regardless of failure policy.
#[async_trait]
pub trait TaskCompletionHandler: Send + Sync {
    async fn on_task_completed(&self, event: &TaskCompletedEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> TaskCompletionHandler for F
where
    F: Fn(&TaskCompletedEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_task_completed(&self, event: &TaskCompletedEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rerecording_moves_to_end() {
        let mut results = ResultSet::new();
        results.record("name", TaskResult::Completed(json!("Ada")));
        results.record("email", TaskResult::Completed(json!("ada@example.com")));
        results.record("name", TaskResult::Completed(json!("Ada Lovelace")));

        assert_eq!(results.ids().collect::<Vec<_>>(), vec!["email", "name"]);
        assert_eq!(results.value("name"), Some(&json!("Ada Lovelace")));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn serializes_as_object_in_result_order() {
        let mut results = ResultSet::new();
        results.record("b", TaskResult::Completed(json!(2)));
        results.record(
            "a",
            TaskResult::Failed(CapturedFailure {
                message: "boom".to_string(),
            }),
        );

        let text = serde_json::to_string(&results).unwrap();
        assert_eq!(text, r#"{"b":{"completed":2},"a":{"failed":{"message":"boom"}}}"#);
    }

    #[test]
    fn failure_accessors() {
        let failed = TaskResult::Failed(CapturedFailure {
            message: "nope".to_string(),
        });
        assert!(failed.is_failed());
        assert!(failed.value().is_none());
        assert_eq!(failed.failure().unwrap().message, "nope");
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = |event: &TaskCompletedEvent| {
            anyhow::ensure!(event.task_id != "bad", "rejected {}", event.task_id);
            Ok(())
        };
        let ok = TaskCompletedEvent {
            task_id: "good".to_string(),
            result: json!(1),
        };
        let bad = TaskCompletedEvent {
            task_id: "bad".to_string(),
            result: json!(1),
        };
        assert!(handler.on_task_completed(&ok).await.is_ok());
        assert!(handler.on_task_completed(&bad).await.is_err());
    }
}
