//! Dependency-ordered task graph executed on a fixed pool of worker threads.
//!
//! A single coordinator (the thread calling [`TaskManager::execute`]) owns all
//! task state. Workers only run task bodies and report back over a channel,
//! so the "are all dependencies done?" check for a finished task's dependents
//! happens in one place and a task can never be submitted twice.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use thiserror::Error;

pub type TaskBody = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task {0} declared more than once")]
    DuplicateTask(String),
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },
    #[error("dependency cycle through task {0}")]
    Cycle(String),
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    /// Not needed this run; treated as completed by dependents.
    Skipped,
    /// Never started because another task failed.
    Blocked,
}

impl TaskState {
    fn satisfies_dependents(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Skipped)
    }
}

struct TaskNode<K> {
    id: K,
    dependencies: Vec<K>,
    body: Option<TaskBody>,
    state: TaskState,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport<K> {
    pub id: K,
    pub state: TaskState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<K> {
    /// One entry per task, in declaration order.
    pub tasks: Vec<TaskReport<K>>,
    /// Tasks in the order their bodies finished.
    pub finish_order: Vec<K>,
}

impl<K: PartialEq> RunReport<K> {
    pub fn succeeded(&self) -> bool {
        self.tasks.iter().all(|task| task.state != TaskState::Failed)
    }

    pub fn state(&self, id: &K) -> Option<TaskState> {
        self.tasks
            .iter()
            .find(|task| &task.id == id)
            .map(|task| task.state)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport<K>> {
        self.tasks
            .iter()
            .filter(|task| task.state == TaskState::Failed)
    }

    /// Tasks whose bodies ran to completion.
    pub fn completed(&self) -> impl Iterator<Item = &K> {
        self.tasks
            .iter()
            .filter(|task| task.state == TaskState::Completed)
            .map(|task| &task.id)
    }
}

struct Job {
    index: usize,
    label: String,
    body: TaskBody,
}

struct Completion {
    index: usize,
    outcome: Result<(), String>,
}

pub struct TaskManager<K> {
    threads: usize,
    nodes: Vec<TaskNode<K>>,
}

impl<K> TaskManager<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + 'static,
{
    pub fn new(threads: usize) -> Self {
        TaskManager {
            threads: threads.max(1),
            nodes: Vec::new(),
        }
    }

    /// Pool sized to the number of available CPUs.
    pub fn with_available_parallelism() -> Self {
        let threads = thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        Self::new(threads)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Declares a task. Tasks that are not `needed` never run and count as
    /// completed for their dependents.
    pub fn add_task<D, F>(
        &mut self,
        id: K,
        dependencies: D,
        body: F,
        needed: bool,
    ) -> Result<(), ScheduleError>
    where
        D: IntoIterator<Item = K>,
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        if self.nodes.iter().any(|node| node.id == id) {
            return Err(ScheduleError::DuplicateTask(id.to_string()));
        }
        self.nodes.push(TaskNode {
            id,
            dependencies: dependencies.into_iter().collect(),
            body: Some(Box::new(body)),
            state: if needed {
                TaskState::Pending
            } else {
                TaskState::Skipped
            },
            error: None,
        });
        Ok(())
    }

    /// Runs every needed task once its dependencies have completed.
    ///
    /// After the first failure nothing new is submitted; tasks already running
    /// are allowed to finish and everything still pending ends up `Blocked`.
    pub fn execute(mut self) -> Result<RunReport<K>, ScheduleError> {
        let graph = Graph::build(&self.nodes)?;

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let workers = spawn_workers(self.threads, job_rx, done_tx)?;

        let mut roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&index| self.is_ready(&graph, index))
            .collect();
        // Stable: equal fan-out keeps declaration order.
        roots.sort_by_key(|&index| std::cmp::Reverse(graph.dependents[index].len()));

        let mut in_flight = 0usize;
        let mut failed = false;
        let mut finish_order = Vec::new();

        for index in roots {
            in_flight += self.submit(index, &job_tx);
        }

        while in_flight > 0 {
            let Ok(completion) = done_rx.recv() else {
                break;
            };
            in_flight -= 1;

            let node = &mut self.nodes[completion.index];
            finish_order.push(node.id.clone());
            match completion.outcome {
                Ok(()) => {
                    node.state = TaskState::Completed;
                    log::info!("task {} completed", node.id);
                }
                Err(cause) => {
                    log::error!("task {} failed: {cause}", node.id);
                    node.state = TaskState::Failed;
                    node.error = Some(cause);
                    failed = true;
                }
            }

            if failed {
                continue;
            }
            for &dependent in &graph.dependents[completion.index] {
                if self.is_ready(&graph, dependent) {
                    in_flight += self.submit(dependent, &job_tx);
                }
            }
        }

        drop(job_tx);
        for worker in workers {
            if worker.join().is_err() {
                log::warn!("conversion worker thread panicked outside a task");
            }
        }

        let tasks = self
            .nodes
            .into_iter()
            .map(|node| TaskReport {
                state: match node.state {
                    TaskState::Pending => TaskState::Blocked,
                    other => other,
                },
                id: node.id,
                error: node.error,
            })
            .collect();

        Ok(RunReport {
            tasks,
            finish_order,
        })
    }

    fn is_ready(&self, graph: &Graph, index: usize) -> bool {
        self.nodes[index].state == TaskState::Pending
            && graph.dependencies[index]
                .iter()
                .all(|&dependency| self.nodes[dependency].state.satisfies_dependents())
    }

    /// Returns the number of jobs handed to the pool (0 or 1).
    fn submit(&mut self, index: usize, jobs: &Sender<Job>) -> usize {
        let node = &mut self.nodes[index];
        let Some(body) = node.body.take() else {
            return 0;
        };
        node.state = TaskState::Running;
        let job = Job {
            index,
            label: node.id.to_string(),
            body,
        };
        if jobs.send(job).is_err() {
            node.state = TaskState::Failed;
            node.error = Some("worker pool shut down".to_string());
            return 0;
        }
        1
    }
}

/// Index-based adjacency built from the declared dependency ids.
struct Graph {
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl Graph {
    fn build<K: Clone + Eq + Hash + fmt::Display>(nodes: &[TaskNode<K>]) -> Result<Self, ScheduleError> {
        let index: HashMap<&K, usize> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (&node.id, position))
            .collect();

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (position, node) in nodes.iter().enumerate() {
            for dependency in &node.dependencies {
                let Some(&target) = index.get(dependency) else {
                    return Err(ScheduleError::UnknownDependency {
                        task: node.id.to_string(),
                        dependency: dependency.to_string(),
                    });
                };
                dependencies[position].push(target);
                dependents[target].push(position);
            }
        }

        // Kahn's algorithm; anything left unvisited sits on a cycle.
        let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            for &dependent in &dependents[current] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        if visited != nodes.len() {
            let stuck = remaining
                .iter()
                .position(|&count| count > 0)
                .map(|position| nodes[position].id.to_string())
                .unwrap_or_default();
            return Err(ScheduleError::Cycle(stuck));
        }

        Ok(Graph {
            dependencies,
            dependents,
        })
    }
}

fn spawn_workers(
    count: usize,
    jobs: Receiver<Job>,
    done: Sender<Completion>,
) -> Result<Vec<JoinHandle<()>>, ScheduleError> {
    let jobs = Arc::new(Mutex::new(jobs));
    let mut handles = Vec::with_capacity(count);
    for worker in 0..count {
        let jobs = Arc::clone(&jobs);
        let done = done.clone();
        let handle = thread::Builder::new()
            .name(format!("convert-worker-{worker}"))
            .spawn(move || worker_loop(jobs, done))
            .map_err(ScheduleError::Spawn)?;
        handles.push(handle);
    }
    Ok(handles)
}

fn worker_loop(jobs: Arc<Mutex<Receiver<Job>>>, done: Sender<Completion>) {
    loop {
        let next = match jobs.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        let Ok(job) = next else {
            break;
        };

        log::info!("task {} started", job.label);
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job.body)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        if done
            .send(Completion {
                index: job.index,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
