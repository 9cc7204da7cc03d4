//! Error types for task groups.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Regression error: {0}")]
    Regression(#[from] RegressionError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors that end a group run.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Task {task_id} failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: TaskError,
    },

    #[error("Completion callback failed for task {task_id}: {reason}")]
    Callback { task_id: String, reason: String },

    #[error("failed to summarize chat history: {reason}")]
    Summarization { reason: String },

    #[error("Task {id} is queued but not registered")]
    UnknownTask { id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure raised by a task while it runs.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Plain failure carrying a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Rejections at the regression capability boundary.
///
/// None of these interrupt the active task or touch scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegressionError {
    #[error("At least one task id is required")]
    EmptyRequest,

    #[error("Task id {id} is not eligible for regression (eligible: {})", eligible.join(", "))]
    InvalidTarget { id: String, eligible: Vec<String> },

    #[error("Regression capability for task {task_id} is no longer active")]
    Expired { task_id: String },

    #[error("Task {task_id} already requested a regression")]
    AlreadyRequested { task_id: String },

    #[error("No regression capability is installed for task {task_id}")]
    NotInstalled { task_id: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
