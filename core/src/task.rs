use std::{
    collections::BTreeMap,
    collections::BTreeSet,
    fmt,
    process::Child,
    sync::Mutex,
};

use crate::value::Value;

pub type TaskId = usize;

/// Outcome of running a task. A task that never ran because a dependency failed and one that was
/// deliberately excluded from the effective set are both reported as `Skipped`; callers that need
/// to tell them apart can check the task's dependencies' own statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Skipped,
    Success,
    Failure,
    Aborted,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Skipped
    }
}

/// A placeholder for another task's result, embedded anywhere in a task's declared inputs.
///
/// `resolved` is set exactly once, by the preprocessor, and read afterwards by the scheduler at
/// dispatch time. It uses a `Mutex` rather than plain mutation because a `Task`'s declared inputs
/// are shared across thread boundaries once a backend moves an `Arc<Task>` onto a worker thread,
/// and `Arc<Task>: Send` requires every field `Task` owns, transitively, to be `Sync`.
#[derive(Debug)]
pub struct Placeholder {
    name: String,
    resolved: Mutex<Option<TaskId>>,
}

impl Clone for Placeholder {
    fn clone(&self) -> Self {
        Placeholder {
            name: self.name.clone(),
            resolved: Mutex::new(*self.resolved.lock().unwrap()),
        }
    }
}

impl Placeholder {
    pub fn new(target_name: impl Into<String>) -> Self {
        Placeholder {
            name: target_name.into(),
            resolved: Mutex::new(None),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.name
    }

    pub fn resolved_id(&self) -> Option<TaskId> {
        *self.resolved.lock().unwrap()
    }

    /// Stamps the resolved target identity. Called exactly once, by the preprocessor.
    pub(crate) fn resolve(&self, id: TaskId) {
        *self.resolved.lock().unwrap() = Some(id);
    }
}

impl PartialEq for Placeholder {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// A node in a task's declared input tree: either a literal value, a placeholder for another
/// task's result, or a container of further nodes. A typed variant rather than a dynamic value so
/// the visitor below can tell a literal container from a placeholder without downcasting.
#[derive(Debug, Clone)]
pub enum InputNode {
    Value(Value),
    Seq(Vec<InputNode>),
    Map(BTreeMap<String, InputNode>),
    Placeholder(Placeholder),
}

impl From<Value> for InputNode {
    fn from(v: Value) -> Self {
        InputNode::Value(v)
    }
}

impl From<&str> for InputNode {
    fn from(s: &str) -> Self {
        InputNode::Value(Value::from(s))
    }
}

impl From<i64> for InputNode {
    fn from(i: i64) -> Self {
        InputNode::Value(Value::from(i))
    }
}

impl From<Placeholder> for InputNode {
    fn from(p: Placeholder) -> Self {
        InputNode::Placeholder(p)
    }
}

/// Walks `positional`/`keyword`, calling `visitor` on every placeholder leaf and rebuilding
/// sequences/maps with the same shape but placeholder leaves replaced by the visitor's return
/// value. Deterministic (iterates `positional` in order, `keyword` in key order) and reentrant:
/// the preprocessor calls this once to discover dependencies, and the scheduler calls it again
/// at dispatch time to resolve concrete arguments.
pub fn visit_placeholders<F, E>(
    positional: &[InputNode],
    keyword: &BTreeMap<String, InputNode>,
    mut visitor: F,
) -> Result<(Vec<Value>, BTreeMap<String, Value>), E>
where
    F: FnMut(&Placeholder) -> Result<Value, E>,
{
    fn walk<F, E>(node: &InputNode, visitor: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Placeholder) -> Result<Value, E>,
    {
        Ok(match node {
            InputNode::Value(v) => v.clone(),
            InputNode::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(walk(item, visitor)?);
                }
                Value::List(out)
            }
            InputNode::Map(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k.clone(), walk(v, visitor)?);
                }
                Value::Map(out)
            }
            InputNode::Placeholder(p) => visitor(p)?,
        })
    }

    let mut pos = Vec::with_capacity(positional.len());
    for node in positional {
        pos.push(walk(node, &mut visitor)?);
    }
    let mut kw = BTreeMap::new();
    for (k, node) in keyword {
        kw.insert(k.clone(), walk(node, &mut visitor)?);
    }
    Ok((pos, kw))
}

pub type ActionFn = Box<dyn Fn(&[Value], &BTreeMap<String, Value>) -> anyhow::Result<Value> + Send + Sync>;
pub type AbortFn = Box<dyn Fn() + Send + Sync>;

/// The command a `ShellCommand` task runs: either fixed, or derived from the task's resolved
/// inputs (mirrors `BashCommandTask`'s `command` being either a string or a callable).
pub enum Command {
    Literal(String),
    Factory(Box<dyn Fn(&[Value], &BTreeMap<String, Value>) -> String + Send + Sync>),
}

impl Command {
    fn resolve(&self, positional: &[Value], keyword: &BTreeMap<String, Value>) -> String {
        match self {
            Command::Literal(s) => s.clone(),
            Command::Factory(f) => f(positional, keyword),
        }
    }
}

pub enum TaskVariant {
    Action(ActionFn),
    Abortable(ActionFn, AbortFn),
    ShellCommand {
        command: Command,
        child: Mutex<Option<Child>>,
    },
}

impl fmt::Debug for TaskVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TaskVariant::Action(_) => "Action",
            TaskVariant::Abortable(..) => "Abortable",
            TaskVariant::ShellCommand { .. } => "ShellCommand",
        };
        write!(f, "TaskVariant::{}", kind)
    }
}

#[derive(Debug, Default)]
struct TaskState {
    status: TaskStatus,
    result: Option<Value>,
    error: Option<String>,
}

/// A named unit of work: a declared input tree, an action body, and the mutable state the
/// scheduler and backend fill in as it runs.
#[derive(Debug)]
pub struct Task {
    id: Mutex<Option<TaskId>>,
    name: String,
    positional: Vec<InputNode>,
    keyword: BTreeMap<String, InputNode>,
    default: Option<Value>,
    variant: TaskVariant,
    state: Mutex<TaskState>,
    dependencies: Mutex<BTreeSet<TaskId>>,
}

impl Task {
    fn new(
        name: impl Into<String>,
        variant: TaskVariant,
        positional: Vec<InputNode>,
        keyword: BTreeMap<String, InputNode>,
        default: Option<Value>,
    ) -> Task {
        Task {
            id: Mutex::new(None),
            name: name.into(),
            positional,
            keyword,
            default,
            variant,
            state: Mutex::new(TaskState::default()),
            dependencies: Mutex::new(BTreeSet::new()),
        }
    }

    /// Constructs an `Action` task: invokes `action` once all of its dependencies' results are
    /// resolved.
    pub fn simple(
        name: impl Into<String>,
        action: impl Fn(&[Value], &BTreeMap<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
        positional: Vec<InputNode>,
        keyword: BTreeMap<String, InputNode>,
        default: Option<Value>,
    ) -> Task {
        Task::new(name, TaskVariant::Action(Box::new(action)), positional, keyword, default)
    }

    /// Constructs an `Abortable` task: same as [`Task::simple`], but `abort` is invoked (at most
    /// once) if the scheduler gives up on the run while this task is still in progress.
    pub fn abortable(
        name: impl Into<String>,
        action: impl Fn(&[Value], &BTreeMap<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
        abort: impl Fn() + Send + Sync + 'static,
        positional: Vec<InputNode>,
        keyword: BTreeMap<String, InputNode>,
        default: Option<Value>,
    ) -> Task {
        Task::new(
            name,
            TaskVariant::Abortable(Box::new(action), Box::new(abort)),
            positional,
            keyword,
            default,
        )
    }

    /// Constructs a `ShellCommand` task: runs `command` (possibly templated by its resolved
    /// inputs) via `/bin/sh -c`, failing with [`crate::error::DomainError::ShellCommandFailed`]
    /// on a non-zero exit code.
    pub fn shell_command(
        name: impl Into<String>,
        command: Command,
        positional: Vec<InputNode>,
        keyword: BTreeMap<String, InputNode>,
        default: Option<Value>,
    ) -> Task {
        Task::new(
            name,
            TaskVariant::ShellCommand {
                command,
                child: Mutex::new(None),
            },
            positional,
            keyword,
            default,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positional(&self) -> &[InputNode] {
        &self.positional
    }

    pub fn keyword(&self) -> &BTreeMap<String, InputNode> {
        &self.keyword
    }

    pub fn id(&self) -> Option<TaskId> {
        *self.id.lock().unwrap()
    }

    /// Assigns this task's identity. Called exactly once, by the preprocessor.
    pub(crate) fn set_id(&self, id: TaskId) {
        let mut slot = self.id.lock().unwrap();
        debug_assert!(slot.is_none(), "task id assigned twice");
        *slot = Some(id);
    }

    /// Test-only escape hatch for assigning an id without going through `preprocess`, so that
    /// other crates' unit tests can build a runnable `Task` directly.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_id_for_test(&self, id: TaskId) {
        self.set_id(id);
    }

    pub(crate) fn set_dependencies(&self, deps: BTreeSet<TaskId>) {
        *self.dependencies.lock().unwrap() = deps;
    }

    pub fn dependencies(&self) -> BTreeSet<TaskId> {
        self.dependencies.lock().unwrap().clone()
    }

    /// Runs this task's body with fully-resolved arguments. Only ever called by a backend, on a
    /// worker thread, never directly by the scheduler.
    pub fn run(&self, positional: &[Value], keyword: &BTreeMap<String, Value>) -> anyhow::Result<Value> {
        match &self.variant {
            TaskVariant::Action(f) => f(positional, keyword),
            TaskVariant::Abortable(f, _) => f(positional, keyword),
            TaskVariant::ShellCommand { command, child } => {
                self.run_shell_command(command, child, positional, keyword)
            }
        }
    }

    fn run_shell_command(
        &self,
        command: &Command,
        child_slot: &Mutex<Option<Child>>,
        positional: &[Value],
        keyword: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Value> {
        let command_line = command.resolve(positional, keyword);
        let child = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(&command_line)
            .spawn()?;
        // Publish the child so try_abort() can kill it, then reclaim it to wait. There is a
        // short window where abort() can't find it (already reclaimed); that's fine, abort is
        // advisory.
        *child_slot.lock().unwrap() = Some(child);
        let mut reclaimed = child_slot
            .lock()
            .unwrap()
            .take()
            .expect("child was just inserted");
        let status = reclaimed.wait()?;
        if !status.success() {
            return Err(crate::error::DomainError::ShellCommandFailed {
                command: command_line,
                exit_code: status.code().unwrap_or(-1),
            }
            .into());
        }
        Ok(Value::Null)
    }

    /// Advisory cancellation. No-op for `Action` tasks; invokes the registered abort callback
    /// for `Abortable`; kills the spawned child (if still running) for `ShellCommand`.
    pub fn try_abort(&self) {
        match &self.variant {
            TaskVariant::Action(_) => {}
            TaskVariant::Abortable(_, abort) => abort(),
            TaskVariant::ShellCommand { child, .. } => {
                if let Some(child) = child.lock().unwrap().as_mut() {
                    let _ = child.kill();
                }
            }
        }
    }

    pub fn set_result(&self, value: Value) {
        let mut state = self.state.lock().unwrap();
        state.result = Some(value);
    }

    pub fn set_error(&self, description: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.error = Some(description.into());
    }

    pub fn result(&self) -> Option<Value> {
        self.state.lock().unwrap().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.state.lock().unwrap().status = status;
    }

    /// Resets this task to its initial state: `Skipped`, result = default, error = absent.
    /// Called by the runner at the start of every `run()`.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Skipped;
        state.result = self.default.clone();
        state.error = None;
    }
}
