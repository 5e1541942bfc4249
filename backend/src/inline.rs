use std::{collections::BTreeMap, sync::Arc};

use taskgraph_core::{Task, TaskId, Value};

use crate::{run_and_report, Backend, Completion, CompletionSender};

/// Runs every task body synchronously on the thread that calls `submit`, i.e. the scheduler
/// thread. Useful for deterministic tests and for graphs too small to be worth a thread.
#[derive(Debug, Default)]
pub struct InlineBackend;

impl InlineBackend {
    pub fn new() -> Self {
        InlineBackend
    }
}

impl Backend for InlineBackend {
    fn submit(
        &self,
        task: Arc<Task>,
        on_complete: CompletionSender,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    ) {
        let task_id = task.id().expect("task has been assigned an id by preprocessing");
        let status = run_and_report(&task, &positional, &keyword);
        let _ = on_complete.send(Completion { task_id, status });
    }

    fn acknowledge(&self, _task_id: TaskId) {}

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskgraph_core::TaskStatus;

    #[test]
    fn submit_runs_body_synchronously_and_reports_success() {
        let task = Arc::new(Task::simple(
            "double",
            |positional, _keyword| Ok(Value::Int(positional[0].as_int().unwrap() * 2)),
            vec![],
            BTreeMap::new(),
            None,
        ));
        task.set_id_for_test(0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let backend = InlineBackend::new();
        backend.submit(task.clone(), tx, vec![Value::Int(21)], BTreeMap::new());
        let completion = rx.try_recv().expect("completion sent before submit returns");
        assert_eq!(completion.task_id, 0);
        assert_eq!(completion.status, TaskStatus::Success);
        assert_eq!(task.result(), Some(Value::Int(42)));
    }

    #[test]
    fn body_error_is_recorded_without_panicking() {
        let task = Arc::new(Task::simple(
            "boom",
            |_p, _k| anyhow::bail!("deliberate failure"),
            vec![],
            BTreeMap::new(),
            None,
        ));
        task.set_id_for_test(1);
        let (tx, rx) = crossbeam_channel::unbounded();
        InlineBackend::new().submit(task.clone(), tx, vec![], BTreeMap::new());
        assert_eq!(rx.try_recv().unwrap().status, TaskStatus::Failure);
        assert!(task.error().unwrap().contains("deliberate failure"));
    }
}
