use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    error::FatalError,
    graph::{cycle_detection, deps_cover, CycleReport},
    task::{visit_placeholders, Task, TaskId},
    value::Value,
};

/// The dependency relation among an effective set of tasks, backed by a `petgraph` directed
/// graph: `graph[node] -> task`, an edge `dependent -> dependency` for every placeholder
/// reference. Built once during preprocessing and never mutated afterwards.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    index_of: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    fn build(tasks: &HashMap<TaskId, Arc<Task>>) -> DependencyGraph {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        for &id in tasks.keys() {
            index_of.insert(id, graph.add_node(id));
        }
        for (&id, task) in tasks {
            for dep in task.dependencies() {
                graph.add_edge(index_of[&id], index_of[&dep], ());
            }
        }
        DependencyGraph { graph, index_of }
    }

    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        match self.index_of.get(&id) {
            Some(&idx) => self
                .graph
                .neighbors(idx)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }
}

/// The outcome of preprocessing: a fully-validated, id-assigned, placeholder-resolved task
/// collection, its dependency graph, and the effective set to schedule.
///
/// Tasks are `Arc`-wrapped here, rather than owned outright, because the scheduler must hand a
/// shared, thread-safe handle to a backend's worker thread for the duration of one `submit`, while
/// itself retaining the ability to read `result()`/`status()` for dispatch decisions.
#[derive(Debug)]
pub struct PreprocessedGraph {
    pub tasks: Vec<Arc<Task>>,
    pub name_to_id: HashMap<String, TaskId>,
    pub dependency_graph: DependencyGraph,
    pub effective: HashSet<TaskId>,
}

/// Assigns identities, validates targets and placeholders, checks for cycles, and computes the
/// effective task set over a freshly-constructed task list and a target name list. Deterministic
/// and idempotent: building twice from the same input yields identical ids.
pub fn preprocess(tasks: Vec<Task>, target_names: &[String]) -> Result<PreprocessedGraph, FatalError> {
    taskgraph_metrics::scoped_metric!("preprocess");

    let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();

    // Step 1: assign identities, check name uniqueness.
    let mut name_to_id: HashMap<String, TaskId> = HashMap::with_capacity(tasks.len());
    for (index, task) in tasks.iter().enumerate() {
        task.set_id(index);
        if name_to_id.insert(task.name().to_owned(), index).is_some() {
            return Err(FatalError::DuplicateTaskName(task.name().to_owned()));
        }
    }

    // Step 2: validate targets.
    let mut targets: BTreeSet<TaskId> = BTreeSet::new();
    for name in target_names {
        match name_to_id.get(name) {
            Some(&id) => {
                targets.insert(id);
            }
            None => return Err(FatalError::UnknownTarget(name.clone())),
        }
    }

    // Step 3 + 4: resolve placeholders against task names, building each task's dependency set
    // as we go. Input shape validation has no failure path to exercise here: the public
    // constructors only accept Vec<InputNode>/BTreeMap<String, InputNode>, so a malformed shape
    // can't reach this point.
    for task in &tasks {
        let mut dependencies = BTreeSet::new();
        let visitor_result = visit_placeholders(
            task.positional(),
            task.keyword(),
            |placeholder: &crate::task::Placeholder| -> Result<Value, FatalError> {
                match name_to_id.get(placeholder.target_name()) {
                    Some(&target_id) => {
                        placeholder.resolve(target_id);
                        dependencies.insert(target_id);
                        Ok(Value::Null)
                    }
                    None => Err(FatalError::UnknownPlaceholder {
                        task: task.name().to_owned(),
                        missing: placeholder.target_name().to_owned(),
                    }),
                }
            },
        );
        visitor_result?;
        task.set_dependencies(dependencies);
    }

    // Step 5: cycle check, restricted to what's reachable from the targets.
    let task_by_id: HashMap<TaskId, Arc<Task>> = tasks.iter().map(|t| (t.id().unwrap(), t.clone())).collect();
    let successors = |id: TaskId| -> Vec<TaskId> { task_by_id[&id].dependencies().into_iter().collect() };
    let seed_nodes: Vec<TaskId> = targets.iter().copied().collect();
    if let CycleReport::Found(cycle) = cycle_detection(&seed_nodes, successors) {
        let cycle_names = cycle.into_iter().map(|id| task_by_id[&id].name().to_owned()).collect();
        return Err(FatalError::CyclicDependency { cycle: cycle_names });
    }

    // Step 6: effective set = dependency cover of targets.
    let effective = deps_cover(targets.iter().copied(), successors);
    log::debug!(
        "preprocessing resolved {} task(s), {} in the effective set for {} target(s)",
        tasks.len(),
        effective.len(),
        targets.len()
    );

    let dependency_graph = DependencyGraph::build(&task_by_id);

    Ok(PreprocessedGraph {
        tasks,
        name_to_id,
        dependency_graph,
        effective,
    })
}
