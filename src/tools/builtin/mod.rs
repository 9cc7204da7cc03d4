//! Built-in tools.

pub mod revisit;

pub use revisit::{REVISIT_TASKS_TOOL, RevisitTasksTool};
