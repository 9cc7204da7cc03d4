//! Task group scheduler.
//!
//! Runs registered tasks one at a time, starting in registration order. The
//! queue is mutable for the duration of a run: when the active task's actor
//! requests a regression, the requested tasks are pushed in front of the
//! interrupted one and the loop continues from the first of them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::GroupConfig;
use crate::context::TaskContext;
use crate::error::{ConfigError, GroupError};
use crate::group::regression::{EligibleTask, RegressionHandle};
use crate::group::registry::TaskRegistry;
use crate::group::results::{
    CapturedFailure, ResultSet, TaskCompletedEvent, TaskCompletionHandler, TaskGroupResult,
    TaskResult,
};
use crate::group::task::{Task, TaskOutcome};
use crate::history::{ChatHistory, HistoryFilter, HistorySummarizer};
use crate::tools::builtin::RevisitTasksTool;
use crate::tools::{Tool, ToolRegistry};

/// Per-run bookkeeping. Created when `run` starts and dropped when it ends.
#[derive(Debug, Default)]
struct RunState {
    queue: VecDeque<String>,
    /// Ids that have started at least once. Never shrinks.
    visited: HashSet<String>,
    attempts: HashMap<String, u32>,
    results: ResultSet,
}

impl RunState {
    fn new<'a>(ids: impl Iterator<Item = &'a str>) -> Self {
        Self {
            queue: ids.map(String::from).collect(),
            ..Default::default()
        }
    }

    /// Visited ids other than `active`, in registration order.
    fn eligible_for(&self, active: &str, registry: &TaskRegistry) -> Vec<EligibleTask> {
        registry
            .keys()
            .filter(|id| *id != active && self.visited.contains(*id))
            .map(|id| EligibleTask {
                id: id.to_string(),
                description: registry.description(id).unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Mark `task_id` visited and return its attempt number.
    fn start(&mut self, task_id: &str) -> u32 {
        self.visited.insert(task_id.to_string());
        let attempt = self.attempts.entry(task_id.to_string()).or_insert(0);
        *attempt += 1;
        *attempt
    }

    /// Put `interrupted` back at the front with `targets` ahead of it.
    fn requeue(&mut self, interrupted: String, targets: Vec<String>) {
        self.queue.push_front(interrupted);
        for target in targets.into_iter().rev() {
            self.queue.push_front(target);
        }
    }
}

/// A group of tasks run sequentially with support for regressions.
pub struct TaskGroup {
    config: GroupConfig,
    registry: TaskRegistry,
    history: ChatHistory,
    summarizer: Option<Arc<dyn HistorySummarizer>>,
    on_task_completed: Option<Arc<dyn TaskCompletionHandler>>,
    tools: Vec<Arc<dyn Tool>>,
}

impl TaskGroup {
    /// Create an empty group.
    pub fn new(config: GroupConfig) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            history: ChatHistory::new(),
            summarizer: None,
            on_task_completed: None,
            tools: Vec::new(),
        }
    }

    /// Start from an existing history (e.g. the parent conversation).
    pub fn with_history(mut self, history: ChatHistory) -> Self {
        self.history = history;
        self
    }

    /// Summarizer used when `summarize_history` is enabled.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn HistorySummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Handler invoked after each successful task.
    pub fn on_task_completed(mut self, handler: impl TaskCompletionHandler + 'static) -> Self {
        self.on_task_completed = Some(Arc::new(handler));
        self
    }

    /// Tool installed on every task, alongside the built-in ones.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register a task. Last write wins for duplicate ids.
    pub fn add<F, T>(&mut self, factory: F, id: impl Into<String>, description: impl Into<String>)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Task + 'static,
    {
        self.registry.add(factory, id, description);
    }

    /// Registered tasks, in registration order.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Configuration the group was built with.
    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// The group's history. After a run with summarization enabled this is
    /// the compressed history.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn into_history(self) -> ChatHistory {
        self.history
    }

    /// Run every task until the queue drains, then finalize.
    pub async fn run(&mut self) -> Result<TaskGroupResult, GroupError> {
        if self.config.summarize_history && self.summarizer.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "summarizer".to_string(),
                hint: "summarize_history is enabled; call with_summarizer()".to_string(),
            }
            .into());
        }

        let run_id = Uuid::new_v4();
        let mut run = RunState::new(self.registry.keys());
        let mut previous: Option<String> = None;

        tracing::info!(run = %run_id, tasks = run.queue.len(), "Task group started");

        while let Some(task_id) = run.queue.pop_front() {
            let mut task = self
                .registry
                .get(&task_id)
                .ok_or_else(|| GroupError::UnknownTask {
                    id: task_id.clone(),
                })?
                .instantiate();

            self.history.add_handoff(previous.replace(task_id.clone()), &task_id);

            let eligible = run.eligible_for(&task_id, &self.registry);
            let regression = (!eligible.is_empty()).then(|| {
                RegressionHandle::new(&task_id, eligible, self.config.dedupe_regression_targets)
            });
            let attempt = run.start(&task_id);
            let mut ctx = self.build_context(run_id, &task_id, attempt, regression.clone()).await;

            tracing::info!(
                task = %task_id,
                attempt,
                can_regress = regression.is_some(),
                "Running task"
            );

            let outcome = run_one(task.as_mut(), &mut ctx, regression.as_ref()).await;
            drop(task);
            if let Some(handle) = &regression {
                handle.close().await;
            }
            self.history = ctx.into_history();

            match outcome {
                TaskOutcome::Completed(value) => {
                    tracing::info!(task = %task_id, "Task completed");
                    run.results
                        .record(task_id.clone(), TaskResult::Completed(value.clone()));
                    if let Some(handler) = &self.on_task_completed {
                        let event = TaskCompletedEvent {
                            task_id: task_id.clone(),
                            result: value,
                        };
                        handler.on_task_completed(&event).await.map_err(|e| {
                            GroupError::Callback {
                                task_id: task_id.clone(),
                                reason: format!("{e:#}"),
                            }
                        })?;
                    }
                }
                TaskOutcome::Regressed(signal) => {
                    tracing::info!(
                        task = %task_id,
                        targets = ?signal.targets,
                        "Task interrupted by regression"
                    );
                    run.requeue(task_id, signal.targets);
                    tracing::debug!(queue = ?run.queue, "Queue after regression");
                }
                TaskOutcome::Failed(error) => {
                    if self.config.collect_failures {
                        tracing::warn!(task = %task_id, error = %error, "Task failed, continuing");
                        run.results.record(
                            task_id,
                            TaskResult::Failed(CapturedFailure {
                                message: error.to_string(),
                            }),
                        );
                    } else {
                        tracing::error!(task = %task_id, error = %error, "Task failed, aborting group");
                        return Err(GroupError::TaskFailed {
                            task_id,
                            source: error,
                        });
                    }
                }
            }
        }

        self.finalize(run.results).await
    }

    async fn build_context(
        &self,
        run_id: Uuid,
        task_id: &str,
        attempt: u32,
        regression: Option<RegressionHandle>,
    ) -> TaskContext {
        let tools = ToolRegistry::new();
        if let Some(handle) = &regression {
            tools.register_builtin(Arc::new(RevisitTasksTool::new(handle.clone())));
        }
        for tool in &self.tools {
            tools.register(Arc::clone(tool)).await;
        }
        TaskContext::new(
            run_id,
            task_id,
            attempt,
            self.history.copy(&HistoryFilter::default()),
            tools,
            regression,
        )
    }

    async fn finalize(&mut self, results: ResultSet) -> Result<TaskGroupResult, GroupError> {
        if self.config.summarize_history
            && let Some(summarizer) = &self.summarizer
        {
            let filtered = self.history.copy(&HistoryFilter::for_summary());
            let summarized = summarizer
                .summarize(&filtered, &self.config.summary)
                .await
                .map_err(|e| GroupError::Summarization {
                    reason: e.to_string(),
                })?;
            tracing::info!(
                before = self.history.len(),
                after = summarized.len(),
                "Replaced group history with summary"
            );
            self.history = summarized;
        }

        tracing::info!(results = results.len(), "Task group completed");
        Ok(TaskGroupResult { results })
    }
}

/// Run one task, racing it against its regression capability.
///
/// A signal accepted during the same poll in which the task returns still
/// wins: the instance counts as forcibly completed.
async fn run_one(
    task: &mut dyn Task,
    ctx: &mut TaskContext,
    regression: Option<&RegressionHandle>,
) -> TaskOutcome {
    let signal = async {
        match regression {
            Some(handle) => handle.triggered().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        signal = signal => TaskOutcome::Regressed(signal),
        result = task.run(ctx) => {
            if let Some(handle) = regression
                && let Some(signal) = handle.finish().await
            {
                return TaskOutcome::Regressed(signal);
            }
            result.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, RegressionError, TaskError};
    use crate::history::SummaryOptions;
    use crate::llm::ChatMessage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Succeeds with a fixed value, logging each start.
    struct Constant {
        id: &'static str,
        value: serde_json::Value,
        log: Log,
    }

    #[async_trait]
    impl Task for Constant {
        async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
            self.log.lock().unwrap().push(self.id.to_string());
            ctx.history
                .add_message(ChatMessage::assistant(format!("{} done", self.id)));
            Ok(self.value.clone())
        }
    }

    /// Regresses to `targets` on its first attempt, then succeeds.
    struct RegressOnce {
        id: &'static str,
        targets: Vec<&'static str>,
        log: Log,
    }

    #[async_trait]
    impl Task for RegressOnce {
        async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
            self.log.lock().unwrap().push(self.id.to_string());
            if ctx.attempt == 1 {
                ctx.request_regression(self.targets.clone())
                    .await
                    .map_err(|e| TaskError::failed(e.to_string()))?;
                std::future::pending::<()>().await;
            }
            Ok(json!(format!("{} attempt {}", self.id, ctx.attempt)))
        }
    }

    struct Failing(&'static str);

    #[async_trait]
    impl Task for Failing {
        async fn run(&mut self, _ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
            Err(TaskError::failed(self.0))
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn add_constant(group: &mut TaskGroup, id: &'static str, value: serde_json::Value, log: &Log) {
        let log = Arc::clone(log);
        group.add(
            move || Constant {
                id,
                value: value.clone(),
                log: Arc::clone(&log),
            },
            id,
            id.to_uppercase(),
        );
    }

    #[test]
    fn requeue_puts_targets_before_interrupted() {
        let mut run = RunState::new(["a", "b", "c", "d"].into_iter());
        run.queue.pop_front();
        run.queue.pop_front();
        run.queue.pop_front();
        run.requeue("c".to_string(), vec!["b".to_string(), "a".to_string()]);
        let queue: Vec<&str> = run.queue.iter().map(String::as_str).collect();
        assert_eq!(queue, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn visited_is_monotonic() {
        let mut registry = TaskRegistry::new();
        let l = log();
        for id in ["a", "b"] {
            let l = Arc::clone(&l);
            registry.add(
                move || Constant {
                    id,
                    value: json!(null),
                    log: Arc::clone(&l),
                },
                id,
                id,
            );
        }

        let mut run = RunState::new(registry.keys());
        assert!(run.eligible_for("a", &registry).is_empty());
        assert_eq!(run.start("a"), 1);
        assert_eq!(run.start("b"), 1);
        assert_eq!(run.start("a"), 2);

        assert!(run.visited.contains("a"));
        assert!(run.visited.contains("b"));
        let eligible: Vec<String> = run
            .eligible_for("b", &registry)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(eligible, vec!["a"]);
    }

    #[tokio::test]
    async fn first_task_gets_no_capability() {
        struct Probe(Arc<Mutex<Vec<bool>>>);

        #[async_trait]
        impl Task for Probe {
            async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
                let has_tool = ctx.tools().has(crate::tools::builtin::REVISIT_TASKS_TOOL).await;
                self.0.lock().unwrap().push(ctx.regression().is_some() && has_tool);
                Ok(json!(null))
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::new(GroupConfig::default());
        for id in ["a", "b"] {
            let seen = Arc::clone(&seen);
            group.add(move || Probe(Arc::clone(&seen)), id, id);
        }
        group.run().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn self_regression_is_rejected() {
        struct SelfRegress;

        #[async_trait]
        impl Task for SelfRegress {
            async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
                let err = ctx.request_regression(["b"]).await.unwrap_err();
                assert_eq!(
                    err,
                    RegressionError::InvalidTarget {
                        id: "b".to_string(),
                        eligible: vec!["a".to_string()],
                    }
                );
                Ok(json!("kept running"))
            }
        }

        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        group.add(|| SelfRegress, "b", "B");

        let result = group.run().await.unwrap();
        assert_eq!(result.results.value("b"), Some(&json!("kept running")));
        assert_eq!(*l.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn stale_handle_is_expired() {
        struct Keep(Arc<Mutex<Option<RegressionHandle>>>);

        #[async_trait]
        impl Task for Keep {
            async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
                *self.0.lock().unwrap() = ctx.regression().cloned();
                Ok(json!(null))
            }
        }

        let kept = Arc::new(Mutex::new(None));
        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        let k = Arc::clone(&kept);
        group.add(move || Keep(Arc::clone(&k)), "b", "B");
        group.run().await.unwrap();

        let handle = kept.lock().unwrap().take().unwrap();
        assert!(!handle.is_active().await);
        assert!(matches!(
            handle.request(["a"]).await,
            Err(RegressionError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn spawned_request_is_either_honoured_or_expired() {
        type Pending = Arc<Mutex<Option<tokio::task::JoinHandle<Result<(), RegressionError>>>>>;

        struct SpawnsRequest(Pending);

        #[async_trait]
        impl Task for SpawnsRequest {
            async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
                if ctx.attempt == 1
                    && let Some(handle) = ctx.regression().cloned()
                {
                    let join = tokio::spawn(async move { handle.request(["a"]).await });
                    *self.0.lock().unwrap() = Some(join);
                }
                Ok(json!(ctx.attempt))
            }
        }

        let pending: Pending = Arc::new(Mutex::new(None));
        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        let p = Arc::clone(&pending);
        group.add(move || SpawnsRequest(Arc::clone(&p)), "b", "B");

        let result = group.run().await.unwrap();
        let join = pending.lock().unwrap().take().unwrap();
        match join.await.unwrap() {
            Ok(()) => {
                assert_eq!(*l.lock().unwrap(), vec!["a", "a"]);
                assert_eq!(result.results.value("b"), Some(&json!(2)));
            }
            Err(err) => {
                assert!(matches!(err, RegressionError::Expired { .. }));
                assert_eq!(*l.lock().unwrap(), vec!["a"]);
                assert_eq!(result.results.value("b"), Some(&json!(1)));
            }
        }
    }

    #[tokio::test]
    async fn regression_wins_over_same_poll_completion() {
        struct RegressAndReturn;

        #[async_trait]
        impl Task for RegressAndReturn {
            async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
                if ctx.attempt == 1 {
                    ctx.request_regression(["a"])
                        .await
                        .map_err(|e| TaskError::failed(e.to_string()))?;
                    return Ok(json!("should be discarded"));
                }
                Ok(json!("second"))
            }
        }

        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        group.add(|| RegressAndReturn, "b", "B");

        let result = group.run().await.unwrap();
        assert_eq!(*l.lock().unwrap(), vec!["a", "a"]);
        assert_eq!(result.results.value("b"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn duplicate_targets_run_each_time_by_default() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        let rl = Arc::clone(&l);
        group.add(
            move || RegressOnce {
                id: "b",
                targets: vec!["a", "a"],
                log: Arc::clone(&rl),
            },
            "b",
            "B",
        );

        group.run().await.unwrap();
        assert_eq!(*l.lock().unwrap(), vec!["a", "b", "a", "a", "b"]);
    }

    #[tokio::test]
    async fn duplicate_targets_deduped_when_configured() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig {
            dedupe_regression_targets: true,
            ..Default::default()
        });
        add_constant(&mut group, "a", json!(1), &l);
        let rl = Arc::clone(&l);
        group.add(
            move || RegressOnce {
                id: "b",
                targets: vec!["a", "a"],
                log: Arc::clone(&rl),
            },
            "b",
            "B",
        );

        group.run().await.unwrap();
        assert_eq!(*l.lock().unwrap(), vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn callback_failure_is_fatal_even_when_collecting() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig {
            collect_failures: true,
            ..Default::default()
        })
        .on_task_completed(|event: &TaskCompletedEvent| {
            anyhow::ensure!(event.task_id != "a", "refused {}", event.task_id);
            Ok(())
        });
        add_constant(&mut group, "a", json!(1), &l);
        add_constant(&mut group, "b", json!(2), &l);

        let err = group.run().await.unwrap_err();
        assert!(matches!(err, GroupError::Callback { ref task_id, .. } if task_id == "a"));
        assert_eq!(*l.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn handoffs_and_task_turns_reach_group_history() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig::default());
        add_constant(&mut group, "a", json!(1), &l);
        add_constant(&mut group, "b", json!(2), &l);
        group.run().await.unwrap();

        let contents: Vec<&str> = group
            .history()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["a done", "b done"]);
        assert_eq!(group.history().len(), 4);
    }

    #[tokio::test]
    async fn summarize_without_summarizer_fails_before_running() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig {
            summarize_history: true,
            ..Default::default()
        });
        add_constant(&mut group, "a", json!(1), &l);

        let err = group.run().await.unwrap_err();
        assert!(matches!(err, GroupError::Config(ConfigError::MissingRequired { .. })));
        assert!(l.lock().unwrap().is_empty());
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl HistorySummarizer for BrokenSummarizer {
        async fn summarize(
            &self,
            _history: &ChatHistory,
            _options: &SummaryOptions,
        ) -> Result<ChatHistory, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "connection reset".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn summarization_failure_is_fatal() {
        let l = log();
        let mut group = TaskGroup::new(GroupConfig {
            summarize_history: true,
            collect_failures: true,
            ..Default::default()
        })
        .with_summarizer(Arc::new(BrokenSummarizer));
        add_constant(&mut group, "a", json!(1), &l);

        let err = group.run().await.unwrap_err();
        assert!(matches!(err, GroupError::Summarization { .. }));
        assert!(err.to_string().contains("failed to summarize chat history"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn failing_task_is_not_retried() {
        let mut group = TaskGroup::new(GroupConfig {
            collect_failures: true,
            ..Default::default()
        });
        group.add(|| Failing("nope"), "a", "A");
        let result = group.run().await.unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(
            result.results.get("a").and_then(|r| r.failure()).map(|f| f.message.as_str()),
            Some("nope")
        );
    }
}
