use thiserror::Error;

/// Non-recoverable preprocessing failure. Raised only while constructing a `Runner`/graph,
/// never after any task has started running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalError {
    #[error("Found multiple tasks with name '{0}'. Task name is a unique identity of a task. It should be unique across all tasks.")]
    DuplicateTaskName(String),

    #[error("Invalid target task '{0}'. Targets must also be present in the task list.")]
    UnknownTarget(String),

    #[error("Task '{task}' has an invalid value for its {field} field.")]
    InvalidInputShape { task: String, field: &'static str },

    #[error("Invalid task name '{missing}' used in the TaskResult of task '{task}'.")]
    UnknownPlaceholder { task: String, missing: String },

    #[error("Cyclic dependency in tasks: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

/// Recoverable failure raised by runtime API misuse, or by a task body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid task '{0}'")]
    UnknownTask(String),

    #[error("Command '{command}' failed with exit code {exit_code}")]
    ShellCommandFailed { command: String, exit_code: i32 },
}
