use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use taskgraph_core::{Task, TaskId, Value};

use crate::{run_and_report, Backend, Completion, CompletionSender};

/// Spawns a fresh `std::thread` for every submission. No bound on concurrency; appropriate for
/// graphs whose task count is known to be small, or whose bodies are mostly I/O-bound.
#[derive(Default)]
pub struct UnboundedBackend {
    handles: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

impl UnboundedBackend {
    pub fn new() -> Self {
        UnboundedBackend::default()
    }
}

impl Backend for UnboundedBackend {
    fn submit(
        &self,
        task: Arc<Task>,
        on_complete: CompletionSender,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    ) {
        let task_id = task.id().expect("task has been assigned an id by preprocessing");
        let handle = std::thread::Builder::new()
            .name(format!("taskgraph-worker-{}", task_id))
            .spawn(move || {
                let status = run_and_report(&task, &positional, &keyword);
                let _ = on_complete.send(Completion { task_id, status });
            })
            .expect("failed to spawn worker thread");
        self.handles.lock().unwrap().insert(task_id, handle);
    }

    /// Joins and discards this task's thread. The completion has already been observed by the
    /// scheduler by the time `acknowledge` is called, so the join here is just reclaiming the
    /// `JoinHandle`, never a meaningful wait.
    fn acknowledge(&self, task_id: TaskId) {
        if let Some(handle) = self.handles.lock().unwrap().remove(&task_id) {
            let _ = handle.join();
        }
    }

    fn close(&self) {
        let stragglers: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain().map(|(_, h)| h).collect();
        for handle in stragglers {
            let _ = handle.join();
        }
    }
}
