use thiserror::Error;

/// Raised when the backend contract is violated in a way the scheduler cannot recover from.
/// Distinct from a task body's own failure, which is reported as `TaskStatus::Failure` and never
/// surfaces as an `Err` here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("a task's placeholder input referenced a task whose result was not available at dispatch time")]
    UnresolvedPlaceholder,

    #[error("the backend's completion channel was closed before every in-progress task reported a result")]
    CompletionChannelClosed,
}
