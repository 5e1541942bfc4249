use taskgraph_backend::Backend;
use taskgraph_core::{preprocess, DomainError, FatalError, PreprocessedGraph, Task, TaskId, TaskStatus};

use crate::{error::SchedulerError, scheduler};

/// Runs a fixed task graph against one backend, end to end.
///
/// Preprocessing happens eagerly in [`Runner::new`]: a malformed graph is rejected before any
/// task has a chance to run, rather than failing partway through a run.
#[derive(Debug)]
pub struct Runner<B: Backend> {
    graph: PreprocessedGraph,
    backend: B,
    succeeded: Vec<TaskId>,
    failed: Vec<TaskId>,
    skipped: Vec<TaskId>,
}

impl<B: Backend> Runner<B> {
    pub fn new(tasks: Vec<Task>, backend: B, targets: &[String]) -> Result<Runner<B>, FatalError> {
        let graph = preprocess(tasks, targets)?;
        Ok(Runner {
            graph,
            backend,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        })
    }

    /// Runs every effective task to completion. `continue_on_failure = false` stops dispatching
    /// new work at the first failure and leaves downstream tasks `Skipped`; `true` lets
    /// independent branches keep going.
    pub fn run(&mut self, continue_on_failure: bool) -> Result<(), SchedulerError> {
        let statuses = scheduler::run(&self.graph, &self.backend, continue_on_failure)?;

        self.succeeded.clear();
        self.failed.clear();
        self.skipped.clear();

        let mut effective: Vec<TaskId> = self.graph.effective.iter().copied().collect();
        effective.sort_unstable();
        for id in effective {
            match statuses.get(&id).copied().unwrap_or(TaskStatus::Skipped) {
                TaskStatus::Success => self.succeeded.push(id),
                TaskStatus::Failure | TaskStatus::Aborted => self.failed.push(id),
                TaskStatus::Skipped => self.skipped.push(id),
            }
        }
        Ok(())
    }

    pub fn task(&self, name: &str) -> Result<&Task, DomainError> {
        let id = self
            .graph
            .name_to_id
            .get(name)
            .ok_or_else(|| DomainError::UnknownTask(name.to_owned()))?;
        Ok(&self.graph.tasks[*id])
    }

    pub fn succeeded_tasks(&self) -> impl Iterator<Item = &Task> {
        self.succeeded.iter().map(move |&id| self.graph.tasks[id].as_ref())
    }

    pub fn failed_tasks(&self) -> impl Iterator<Item = &Task> {
        self.failed.iter().map(move |&id| self.graph.tasks[id].as_ref())
    }

    pub fn skipped_tasks(&self) -> impl Iterator<Item = &Task> {
        self.skipped.iter().map(move |&id| self.graph.tasks[id].as_ref())
    }

    pub fn success_summary(&self) -> String {
        let total = self.graph.effective.len();
        let mut out = String::new();
        for (count, label) in [
            (self.succeeded.len(), "succeeded"),
            (self.failed.len(), "failed"),
            (self.skipped.len(), "skipped"),
        ] {
            if count > 0 {
                out.push_str(&format!("{}/{} tasks {}.\n", count, total, label));
            }
        }
        let mut effective: Vec<TaskId> = self.graph.effective.iter().copied().collect();
        effective.sort_unstable();
        for id in effective {
            let task = &self.graph.tasks[id];
            out.push_str(&format!(" {} : {:?}\n", task.name(), task.status()));
        }
        out
    }

    pub fn error_summary(&self) -> String {
        if self.failed.is_empty() {
            return "No failed task.".to_owned();
        }
        let mut out = String::new();
        for &id in &self.failed {
            let task = &self.graph.tasks[id];
            out.push_str(&format!(
                "{}:\n{}\n--------------------\n",
                task.name(),
                task.error().unwrap_or_default()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use taskgraph_backend::InlineBackend;
    use taskgraph_core::{InputNode, Placeholder, Value};

    #[test]
    fn linear_dependency_runs_in_order_and_reports_success() {
        let tasks = vec![
            Task::simple("bread", |_p, _k| Ok(Value::from("bread")), vec![], BTreeMap::new(), None),
            Task::simple(
                "sandwich",
                |positional, _k| Ok(Value::from(format!("sandwich with {}", positional[0].as_text().unwrap()))),
                vec![InputNode::Placeholder(Placeholder::new("bread"))],
                BTreeMap::new(),
                None,
            ),
        ];
        let mut runner = Runner::new(tasks, InlineBackend::new(), &["sandwich".to_owned()]).unwrap();
        runner.run(false).unwrap();
        assert_eq!(runner.succeeded_tasks().count(), 2);
        assert_eq!(
            runner.task("sandwich").unwrap().result(),
            Some(Value::from("sandwich with bread"))
        );
    }

    #[test]
    fn failure_without_continue_on_failure_skips_dependents() {
        let tasks = vec![
            Task::simple("flour", |_p, _k| anyhow::bail!("no flour"), vec![], BTreeMap::new(), None),
            Task::simple(
                "bread",
                |_p, _k| Ok(Value::Null),
                vec![InputNode::Placeholder(Placeholder::new("flour"))],
                BTreeMap::new(),
                None,
            ),
        ];
        let mut runner = Runner::new(tasks, InlineBackend::new(), &["bread".to_owned()]).unwrap();
        runner.run(false).unwrap();
        assert_eq!(runner.failed_tasks().count(), 1);
        assert_eq!(runner.skipped_tasks().count(), 1);
        assert!(runner.error_summary().contains("no flour"));
    }

    #[test]
    fn continue_on_failure_lets_independent_branches_finish() {
        let tasks = vec![
            Task::simple("a", |_p, _k| anyhow::bail!("a failed"), vec![], BTreeMap::new(), None),
            Task::simple("b", |_p, _k| Ok(Value::Null), vec![], BTreeMap::new(), None),
        ];
        let mut runner = Runner::new(tasks, InlineBackend::new(), &["a".to_owned(), "b".to_owned()]).unwrap();
        runner.run(true).unwrap();
        assert_eq!(runner.failed_tasks().count(), 1);
        assert_eq!(runner.succeeded_tasks().count(), 1);
    }

    #[test]
    fn unknown_task_lookup_is_a_domain_error() {
        let tasks = vec![Task::simple("a", |_p, _k| Ok(Value::Null), vec![], BTreeMap::new(), None)];
        let runner = Runner::new(tasks, InlineBackend::new(), &["a".to_owned()]).unwrap();
        assert!(matches!(runner.task("missing"), Err(DomainError::UnknownTask(_))));
    }

    #[test]
    fn no_failed_task_message_when_everything_succeeds() {
        let tasks = vec![Task::simple("a", |_p, _k| Ok(Value::Null), vec![], BTreeMap::new(), None)];
        let mut runner = Runner::new(tasks, InlineBackend::new(), &["a".to_owned()]).unwrap();
        runner.run(false).unwrap();
        assert_eq!(runner.error_summary(), "No failed task.");
    }
}
