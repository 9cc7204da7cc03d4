//! Task groups — sequential task execution with regression.
//!
//! Core components:
//! - `registry` — insertion-ordered task descriptors
//! - `task` — the `Task` trait and the three-way iteration outcome
//! - `regression` — per-iteration regression capability
//! - `results` — result set, completion handler, final outcome
//! - `scheduler` — the `TaskGroup` run loop and finalization

pub mod registry;
pub mod regression;
pub mod results;
pub mod scheduler;
pub mod task;

pub use registry::{TaskDescriptor, TaskFactory, TaskRegistry};
pub use regression::{EligibleTask, RegressionHandle, RegressionSignal};
pub use results::{
    CapturedFailure, ResultSet, TaskCompletedEvent, TaskCompletionHandler, TaskGroupResult,
    TaskResult,
};
pub use scheduler::TaskGroup;
pub use task::{Task, TaskOutcome};
