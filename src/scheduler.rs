use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use taskgraph_backend::{Backend, Completion, CompletionReceiver, CompletionSender};
use taskgraph_core::{visit_placeholders, Placeholder, PreprocessedGraph, Task, TaskId, TaskStatus, Value};

use crate::error::SchedulerError;

/// The dependency relation restricted to the effective task set, in both directions, built once
/// per run from [`taskgraph_core::DependencyGraph`]. `outgoing[t]` is kept in ascending task-id
/// order so that when several dependents of a completing task become ready at once, they are
/// dispatched in declared order rather than hash-map order.
struct RuntimeGraph {
    incoming: HashMap<TaskId, HashSet<TaskId>>,
    outgoing: HashMap<TaskId, Vec<TaskId>>,
}

impl RuntimeGraph {
    fn build(graph: &PreprocessedGraph) -> RuntimeGraph {
        let mut incoming: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();
        let mut outgoing: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut effective: Vec<TaskId> = graph.effective.iter().copied().collect();
        effective.sort_unstable();
        for &id in &effective {
            incoming.entry(id).or_default();
            outgoing.entry(id).or_default();
        }
        for &id in &effective {
            for dep in graph.dependency_graph.dependencies_of(id) {
                if !graph.effective.contains(&dep) {
                    continue;
                }
                incoming.entry(id).or_default().insert(dep);
                outgoing.entry(dep).or_default().push(id);
            }
        }
        RuntimeGraph { incoming, outgoing }
    }
}

/// Runs the effective task set of `graph` to completion against `backend`, driving a cooperative
/// single-threaded dispatch loop over whatever concurrency `backend` provides. Returns the
/// terminal status of every effective task that was dispatched.
pub fn run(
    graph: &PreprocessedGraph,
    backend: &dyn Backend,
    continue_on_failure: bool,
) -> Result<HashMap<TaskId, TaskStatus>, SchedulerError> {
    taskgraph_metrics::scoped_metric!("scheduler_run");

    let tasks: HashMap<TaskId, Arc<Task>> = graph.tasks.iter().map(|t| (t.id().unwrap(), t.clone())).collect();
    for &id in &graph.effective {
        tasks[&id].reset();
    }

    let runtime = RuntimeGraph::build(graph);
    let (tx, rx): (CompletionSender, CompletionReceiver) = crossbeam_channel::unbounded();
    let mut in_progress: HashSet<TaskId> = HashSet::new();
    let mut incoming = runtime.incoming.clone();
    let mut statuses: HashMap<TaskId, TaskStatus> = HashMap::new();
    let mut broke_on_failure = false;

    let mut ready: Vec<TaskId> = incoming
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(&id, _)| id)
        .collect();
    ready.sort_unstable();
    for id in ready {
        dispatch(&tasks, id, backend, tx.clone(), &mut in_progress)?;
    }

    while !in_progress.is_empty() {
        let Completion { task_id, status } = rx.recv().map_err(|_| SchedulerError::CompletionChannelClosed)?;
        log::debug!("task '{}' completed with {:?}", tasks[&task_id].name(), status);
        tasks[&task_id].set_status(status);
        taskgraph_metrics::record_outcome(outcome_name(status));
        backend.acknowledge(task_id);
        in_progress.remove(&task_id);
        statuses.insert(task_id, status);

        if status != TaskStatus::Success {
            if !continue_on_failure {
                broke_on_failure = true;
                break;
            }
            continue;
        }

        for &dependent in runtime.outgoing.get(&task_id).into_iter().flatten() {
            let deps = incoming
                .get_mut(&dependent)
                .expect("runtime graph built from the same effective set");
            deps.remove(&task_id);
            if deps.is_empty() {
                dispatch(&tasks, dependent, backend, tx.clone(), &mut in_progress)?;
            }
        }
    }

    if broke_on_failure {
        for &id in &in_progress {
            log::warn!("aborting in-progress task '{}' after a failure", tasks[&id].name());
            tasks[&id].try_abort();
        }
    }
    backend.close();

    Ok(statuses)
}

fn outcome_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Success => "success",
        TaskStatus::Failure => "failure",
        TaskStatus::Aborted => "aborted",
        TaskStatus::Skipped => "skipped",
    }
}

/// Resolves `task`'s declared inputs against its dependencies' already-completed results, marks
/// it in-progress, and hands it to the backend. The dependency contract guarantees every
/// placeholder this task carries names a task that has already finished successfully, since a
/// task is only dispatched once every incoming edge (one per dependency) has cleared.
fn dispatch(
    tasks: &HashMap<TaskId, Arc<Task>>,
    task_id: TaskId,
    backend: &dyn Backend,
    on_complete: CompletionSender,
    in_progress: &mut HashSet<TaskId>,
) -> Result<(), SchedulerError> {
    taskgraph_metrics::scoped_metric!("dispatch");

    let task = &tasks[&task_id];
    log::trace!("dispatching task '{}'", task.name());

    let resolve = |placeholder: &Placeholder| -> Result<Value, SchedulerError> {
        let target_id = placeholder.resolved_id().ok_or(SchedulerError::UnresolvedPlaceholder)?;
        tasks
            .get(&target_id)
            .and_then(|t| t.result())
            .ok_or(SchedulerError::UnresolvedPlaceholder)
    };
    let (positional, keyword) = visit_placeholders(task.positional(), task.keyword(), resolve)?;

    in_progress.insert(task_id);
    backend.submit(task.clone(), on_complete, positional, keyword);
    Ok(())
}
