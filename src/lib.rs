//! A cooperative, single-threaded scheduler for running a declared graph of tasks against a
//! pluggable, multi-threaded execution backend.
//!
//! Build a list of [`Task`]s (via [`Task::simple`], [`Task::abortable`] or
//! [`Task::shell_command`]), wire them together with [`Placeholder`] references to each other's
//! results, hand them to a [`Runner`] along with a backend and a target list, and call
//! [`Runner::run`].

mod error;
mod runner;
mod scheduler;

pub use error::SchedulerError;
pub use runner::Runner;

pub use taskgraph_backend::{Backend, BoundedPoolBackend, InlineBackend, UnboundedBackend};
pub use taskgraph_core::{
    visit_placeholders, AbortFn, ActionFn, Command, DomainError, FatalError, InputNode, Placeholder, Task, TaskId,
    TaskStatus, Value,
};
