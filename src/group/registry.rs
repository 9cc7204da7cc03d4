//! Task registry — insertion-ordered task descriptors.

use std::collections::HashMap;

use crate::group::task::Task;

/// Builds a fresh task instance.
pub type TaskFactory = Box<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// A registered task. Immutable once added.
pub struct TaskDescriptor {
    pub id: String,
    /// Shown to the actor deciding whether to regress.
    pub description: String,
    factory: TaskFactory,
}

impl TaskDescriptor {
    /// Create a new task instance.
    pub fn instantiate(&self) -> Box<dyn Task> {
        (self.factory)()
    }
}

impl std::fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registry of the tasks in a group, in registration order.
///
/// Re-adding an id replaces its descriptor and keeps its original position.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    order: Vec<String>,
    entries: HashMap<String, TaskDescriptor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Last write wins for duplicate ids.
    pub fn add<F, T>(&mut self, factory: F, id: impl Into<String>, description: impl Into<String>)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Task + 'static,
    {
        let id = id.into();
        let descriptor = TaskDescriptor {
            id: id.clone(),
            description: description.into(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Task>),
        };

        if self.entries.insert(id.clone(), descriptor).is_some() {
            tracing::warn!(task = %id, "Replaced existing task registration");
        } else {
            tracing::debug!(task = %id, "Registered task");
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&TaskDescriptor> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn description(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|d| d.description.as_str())
    }

    /// Ids in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
