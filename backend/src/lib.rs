//! Pluggable execution strategies for running task bodies off the scheduler thread.
//!
//! Every backend implements the same three-operation contract (`submit`/`acknowledge`/`close`),
//! mirroring the `submit`/pool vocabulary this codebase already uses for handing work to worker
//! threads (see `command_pool.rs` in the build engine crate this workspace is built from). The
//! scheduler is the only caller of any of these three methods, and always from one thread.

mod bounded;
mod inline;
mod unbounded;

pub use bounded::BoundedPoolBackend;
pub use inline::InlineBackend;
pub use unbounded::UnboundedBackend;

use std::{collections::BTreeMap, sync::Arc};

use taskgraph_core::{Task, TaskId, TaskStatus, Value};

/// A body's terminal outcome, delivered to the scheduler's completion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// The sender half of the scheduler's completion channel. Cloned freely and handed to every
/// worker; sending is the only thing a worker does to communicate back with the scheduler.
pub type CompletionSender = crossbeam_channel::Sender<Completion>;
pub type CompletionReceiver = crossbeam_channel::Receiver<Completion>;

/// An execution strategy for task bodies.
///
/// Implementations must guarantee: for every `submit` call that returns, exactly one
/// `on_complete` send for that task id eventually happens, regardless of whether the body
/// panicked, returned `Err`, or succeeded. `submit` itself must not block waiting for the body to
/// finish.
pub trait Backend: Send + Sync {
    fn submit(
        &self,
        task: Arc<Task>,
        on_complete: CompletionSender,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    );

    /// Tells the backend the scheduler has drained this task's completion message. Bounded pools
    /// use this to free the worker slot for the next queued task.
    fn acknowledge(&self, task_id: TaskId);

    /// Declares no further `submit` calls for this run. Implementations must be safe to `submit`
    /// into again afterwards — reinitializing whatever internal state `close` tore down.
    fn close(&self);
}

/// Runs a task body, catching panics and recording `set_result`/`set_error` the same way
/// regardless of which backend invoked it. Shared by all three backends so that "what happens
/// when a body panics" has exactly one implementation.
pub(crate) fn run_and_report(
    task: &Task,
    positional: &[Value],
    keyword: &BTreeMap<String, Value>,
) -> TaskStatus {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run(positional, keyword)));
    match outcome {
        Ok(Ok(value)) => {
            task.set_result(value);
            TaskStatus::Success
        }
        Ok(Err(error)) => {
            task.set_error(format!("{:#}", error));
            TaskStatus::Failure
        }
        Err(panic) => {
            let message = panic_message(&panic);
            log::error!("task '{}' panicked: {}", task.name(), message);
            task.set_error(format!("task panicked: {}", message));
            TaskStatus::Failure
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
