use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use taskgraph_core::{Task, TaskId, Value};

use crate::{run_and_report, Backend, Completion, CompletionSender};

type RunningJobs = Arc<AtomicUsize>;

enum Job {
    Run(Arc<Task>, CompletionSender, Vec<Value>, BTreeMap<String, Value>),
    Stop,
}

struct Queued {
    task: Arc<Task>,
    on_complete: CompletionSender,
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

struct PoolState {
    senders: Vec<crossbeam_channel::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    /// Indices of workers with no job in flight, popped LIFO (order among idle workers doesn't
    /// matter for correctness, only which tasks get dispatched does).
    available: Vec<usize>,
    /// Tasks submitted while every worker was busy, dispatched FIFO as workers free up.
    waiting: VecDeque<Queued>,
    allocated_on: HashMap<TaskId, usize>,
}

/// A fixed-size pool of `num_workers` persistent worker threads, each with its own private
/// channel. `submit` hands a task straight to an idle worker, or queues it behind `waiting` if
/// every worker is busy; `acknowledge` is what lets a freed worker pick the next queued task.
///
/// Mirrors this codebase's existing `CommandPool`, but with a per-worker private channel instead
/// of a shared work-stealing `Injector`, because the scheduler needs to know and react to exactly
/// which worker a given task landed on (see `acknowledge`), not merely that some worker took it.
pub struct BoundedPoolBackend {
    num_workers: usize,
    daemon: bool,
    state: Mutex<Option<PoolState>>,
    running_jobs: RunningJobs,
}

impl BoundedPoolBackend {
    pub fn new(num_workers: usize, daemon: bool) -> Self {
        let num_workers = num_workers.max(1);
        BoundedPoolBackend {
            num_workers,
            daemon,
            state: Mutex::new(None),
            running_jobs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `BoundedPoolBackend::new(num_cpus::get(), false)`.
    pub fn with_default_parallelism() -> Self {
        BoundedPoolBackend::new(num_cpus::get(), false)
    }

    fn spawn_worker(running_jobs: RunningJobs, index: usize) -> (crossbeam_channel::Sender<Job>, JoinHandle<()>) {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name(format!("taskgraph-pool-worker-{}", index))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Stop => break,
                        Job::Run(task, on_complete, positional, keyword) => {
                            running_jobs.fetch_add(1, Ordering::SeqCst);
                            let _guard = scopeguard::guard((), |_| {
                                running_jobs.fetch_sub(1, Ordering::SeqCst);
                            });
                            let task_id = task.id().expect("task has been assigned an id by preprocessing");
                            let status = run_and_report(&task, &positional, &keyword);
                            let _ = on_complete.send(Completion { task_id, status });
                        }
                    }
                }
            })
            .expect("failed to spawn pool worker thread");
        (tx, handle)
    }

    fn ensure_initialized<'a>(&self, state: &'a mut Option<PoolState>) -> &'a mut PoolState {
        if state.is_none() {
            log::debug!("bounded pool: spawning {} workers", self.num_workers);
            let mut senders = Vec::with_capacity(self.num_workers);
            let mut handles = Vec::with_capacity(self.num_workers);
            for index in 0..self.num_workers {
                let (tx, handle) = BoundedPoolBackend::spawn_worker(self.running_jobs.clone(), index);
                senders.push(tx);
                handles.push(handle);
            }
            *state = Some(PoolState {
                senders,
                handles,
                available: (0..self.num_workers).collect(),
                waiting: VecDeque::new(),
                allocated_on: HashMap::new(),
            });
        }
        state.as_mut().unwrap()
    }

    pub fn has_capacity(&self) -> bool {
        self.running_jobs.load(Ordering::Relaxed) < self.num_workers
    }
}

impl Backend for BoundedPoolBackend {
    fn submit(
        &self,
        task: Arc<Task>,
        on_complete: CompletionSender,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    ) {
        taskgraph_metrics::scoped_metric!("bounded_pool_submit");
        let task_id = task.id().expect("task has been assigned an id by preprocessing");
        let mut guard = self.state.lock().unwrap();
        let pool = self.ensure_initialized(&mut guard);
        match pool.available.pop() {
            Some(worker) => {
                pool.allocated_on.insert(task_id, worker);
                let _ = pool.senders[worker].send(Job::Run(task, on_complete, positional, keyword));
            }
            None => {
                pool.waiting.push_back(Queued {
                    task,
                    on_complete,
                    positional,
                    keyword,
                });
            }
        }
    }

    fn acknowledge(&self, task_id: TaskId) {
        let mut guard = self.state.lock().unwrap();
        let pool = match guard.as_mut() {
            Some(pool) => pool,
            None => return,
        };
        let worker = match pool.allocated_on.remove(&task_id) {
            Some(worker) => worker,
            None => return,
        };
        match pool.waiting.pop_front() {
            Some(queued) => {
                let next_id = queued.task.id().expect("task has been assigned an id by preprocessing");
                pool.allocated_on.insert(next_id, worker);
                let _ = pool.senders[worker].send(Job::Run(queued.task, queued.on_complete, queued.positional, queued.keyword));
            }
            None => {
                pool.available.push(worker);
            }
        }
    }

    fn close(&self) {
        let mut guard = self.state.lock().unwrap();
        let pool = match guard.take() {
            Some(pool) => pool,
            None => return,
        };
        for sender in &pool.senders {
            let _ = sender.send(Job::Stop);
        }
        if !self.daemon {
            for handle in pool.handles {
                let _ = handle.join();
            }
        }
    }
}
