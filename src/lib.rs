//! Task Group — sequential, regressable task workflows.

pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod history;
pub mod llm;
pub mod tools;

pub use config::GroupConfig;
pub use context::TaskContext;
pub use error::{Error, GroupError, RegressionError, TaskError};
pub use group::{Task, TaskGroup, TaskGroupResult, TaskResult};
pub use history::ChatHistory;
