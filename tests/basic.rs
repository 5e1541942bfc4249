use std::{collections::BTreeMap, sync::Mutex};

use taskgraph::{BoundedPoolBackend, InlineBackend, InputNode, Placeholder, Runner, Task, TaskStatus, UnboundedBackend, Value};

// A small diamond dependency graph: bread and onion are independent, the sandwich needs both.

fn bread_task() -> Task {
    Task::simple("bread", |_p, _k| Ok(Value::from("bread")), vec![], BTreeMap::new(), None)
}

fn onion_task() -> Task {
    Task::simple("onion", |_p, _k| Ok(Value::from("onion")), vec![], BTreeMap::new(), None)
}

fn sandwich_task() -> Task {
    Task::simple(
        "sandwich",
        |positional, _k| {
            Ok(Value::from(format!(
                "{} and {} sandwich",
                positional[0].as_text().unwrap(),
                positional[1].as_text().unwrap()
            )))
        },
        vec![
            InputNode::Placeholder(Placeholder::new("bread")),
            InputNode::Placeholder(Placeholder::new("onion")),
        ],
        BTreeMap::new(),
        None,
    )
}

#[test]
fn inline_backend_resolves_diamond_dependencies() {
    let tasks = vec![bread_task(), onion_task(), sandwich_task()];
    let mut runner = Runner::new(tasks, InlineBackend::new(), &["sandwich".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(
        runner.task("sandwich").unwrap().result(),
        Some(Value::from("bread and onion sandwich"))
    );
    assert_eq!(runner.succeeded_tasks().count(), 3);
}

#[test]
fn bounded_pool_backend_resolves_the_same_graph() {
    let tasks = vec![bread_task(), onion_task(), sandwich_task()];
    let mut runner = Runner::new(tasks, BoundedPoolBackend::new(2, false), &["sandwich".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(
        runner.task("sandwich").unwrap().result(),
        Some(Value::from("bread and onion sandwich"))
    );
}

#[test]
fn unbounded_backend_resolves_the_same_graph() {
    let tasks = vec![bread_task(), onion_task(), sandwich_task()];
    let mut runner = Runner::new(tasks, UnboundedBackend::new(), &["sandwich".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.succeeded_tasks().count(), 3);
}

#[test]
fn unreachable_tasks_are_excluded_from_the_effective_set() {
    let tasks = vec![bread_task(), onion_task(), sandwich_task(), Task::simple(
        "unrelated",
        |_p, _k| Ok(Value::Null),
        vec![],
        BTreeMap::new(),
        None,
    )];
    let mut runner = Runner::new(tasks, InlineBackend::new(), &["sandwich".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.succeeded_tasks().count() + runner.failed_tasks().count() + runner.skipped_tasks().count(), 3);
}

#[test]
fn cyclic_dependency_is_rejected_with_the_expected_message() {
    let tasks = vec![
        Task::simple(
            "make_money",
            |_p, _k| Ok(Value::Null),
            vec![InputNode::Placeholder(Placeholder::new("make_sandwich"))],
            BTreeMap::new(),
            None,
        ),
        Task::simple(
            "make_sandwich",
            |_p, _k| Ok(Value::Null),
            vec![
                InputNode::Placeholder(Placeholder::new("buy_onion")),
                InputNode::from(10),
            ],
            BTreeMap::new(),
            None,
        ),
        Task::simple(
            "buy_onion",
            |_p, _k| Ok(Value::Null),
            vec![InputNode::Placeholder(Placeholder::new("make_money"))],
            BTreeMap::new(),
            None,
        ),
    ];
    let err = Runner::new(tasks, InlineBackend::new(), &["make_money".to_owned()]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cyclic dependency in tasks: make_money -> make_sandwich -> buy_onion -> make_money"
    );
}

#[test]
fn duplicate_task_names_are_rejected() {
    let tasks = vec![
        Task::simple("task1", |_p, _k| Ok(Value::Null), vec![], BTreeMap::new(), None),
        Task::simple("task1", |_p, _k| Ok(Value::Null), vec![], BTreeMap::new(), None),
    ];
    let err = Runner::new(tasks, InlineBackend::new(), &["task1".to_owned()]).unwrap_err();
    assert!(err.to_string().contains("Found multiple tasks with name 'task1'"));
}

#[test]
fn abortable_task_is_aborted_when_a_sibling_dependency_fails() {
    static ABORTED: Mutex<bool> = Mutex::new(false);
    let tasks = vec![
        Task::simple("flour", |_p, _k| anyhow::bail!("no flour today"), vec![], BTreeMap::new(), None),
        Task::abortable(
            "knead_dough",
            |_p, _k| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(Value::Null)
            },
            || {
                *ABORTED.lock().unwrap() = true;
            },
            vec![],
            BTreeMap::new(),
            None,
        ),
        Task::simple(
            "bread",
            |_p, _k| Ok(Value::Null),
            vec![
                InputNode::Placeholder(Placeholder::new("flour")),
                InputNode::Placeholder(Placeholder::new("knead_dough")),
            ],
            BTreeMap::new(),
            None,
        ),
    ];
    let mut runner = Runner::new(tasks, BoundedPoolBackend::new(2, false), &["bread".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.failed_tasks().count(), 1);
    // Both the sibling in-progress task and "bread" (blocked on flour) stay Skipped: the run
    // breaks on the first failure before knead_dough's completion is ever drained.
    assert_eq!(runner.skipped_tasks().count(), 2);
    assert!(*ABORTED.lock().unwrap(), "in-progress abortable task should have been aborted");
}

#[test]
fn shell_command_task_runs_and_reports_failure_exit_codes() {
    let ok = vec![Task::shell_command(
        "touch_nothing",
        taskgraph::Command::Literal("true".to_owned()),
        vec![],
        BTreeMap::new(),
        None,
    )];
    let mut runner = Runner::new(ok, InlineBackend::new(), &["touch_nothing".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.succeeded_tasks().count(), 1);

    let failing = vec![Task::shell_command(
        "fail",
        taskgraph::Command::Literal("exit 3".to_owned()),
        vec![],
        BTreeMap::new(),
        None,
    )];
    let mut runner = Runner::new(failing, InlineBackend::new(), &["fail".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.failed_tasks().count(), 1);
    assert!(runner.error_summary().contains("exit code 3"));
}

#[test]
fn tasks_can_be_rerun_after_a_previous_run() {
    let tasks = vec![bread_task()];
    let mut runner = Runner::new(tasks, InlineBackend::new(), &["bread".to_owned()]).unwrap();
    runner.run(false).unwrap();
    assert_eq!(runner.task("bread").unwrap().status(), TaskStatus::Success);
    runner.run(false).unwrap();
    assert_eq!(runner.task("bread").unwrap().status(), TaskStatus::Success);
}
