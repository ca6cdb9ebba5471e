//! Background task queue with priorities and retrying consumers.
//!
//! Handlers submit work as async closures; the queue orders it by
//! descending priority (FIFO within a priority) and a fixed pool of workers
//! drains it. A failing task is re-enqueued after its retry delay until its
//! retry budget is exhausted. Tasks are cooperative about cancellation: the
//! closure receives a [`CancellationToken`] derived from the queue's
//! shutdown token and is expected to poll it at suspension points; a task
//! that has not started yet can be cancelled outright.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::response::epoch_seconds;

/// Task identifier returned by [`TaskQueue::add_task`].
pub type TaskId = String;

/// Scheduling priority; higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl TaskStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

type TaskFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
type TaskCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Submission options for a task.
pub struct TaskOptions {
    priority: TaskPriority,
    task_type: String,
    max_retries: u32,
    retry_delay: Duration,
    callback: Option<TaskCallback>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            priority: TaskPriority::Normal,
            task_type: "default".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            callback: None,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Type tag consumers filter on. Defaults to `"default"`, the tag every
    /// worker accepts.
    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Callback invoked once with the result when the task completes.
    pub fn callback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callback = Some(Arc::new(move |value| Box::pin(f(value))));
        self
    }
}

/// Serializable view of a task's state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: String,
    pub created_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<Value>,
    pub error: Option<String>,
}

struct TaskRecord {
    snapshot: TaskSnapshot,
    retry_delay: Duration,
    run: TaskFn,
    callback: Option<TaskCallback>,
}

struct QueuedRef {
    priority: TaskPriority,
    seq: u64,
    id: TaskId,
    task_type: String,
}

impl PartialEq for QueuedRef {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRef {}

impl PartialOrd for QueuedRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRef {
    // Max-heap: highest priority first, earliest submission among equals.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueInner {
    heap: Mutex<BinaryHeap<QueuedRef>>,
    records: DashMap<TaskId, TaskRecord>,
    notify: Notify,
    seq: AtomicU64,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Shared handle to the background task queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Creates a queue drained by `workers` consumers once started.
    pub fn new(workers: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                heap: Mutex::new(BinaryHeap::new()),
                records: DashMap::new(),
                notify: Notify::new(),
                seq: AtomicU64::new(0),
                workers: workers.max(1),
                handles: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Submits a task and returns its id.
    pub fn add_task<F, Fut>(&self, f: F, opts: TaskOptions) -> TaskId
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let run: TaskFn = Arc::new(move |token| Box::pin(f(token)));

        let record = TaskRecord {
            snapshot: TaskSnapshot {
                id: id.clone(),
                status: TaskStatus::Pending,
                priority: opts.priority,
                task_type: opts.task_type.clone(),
                created_at: epoch_seconds(),
                started_at: None,
                completed_at: None,
                retry_count: 0,
                max_retries: opts.max_retries,
                result: None,
                error: None,
            },
            retry_delay: opts.retry_delay,
            run,
            callback: opts.callback,
        };
        self.inner.records.insert(id.clone(), record);

        self.enqueue(opts.priority, id.clone(), opts.task_type);
        debug!(task_id = %id, "task submitted");
        id
    }

    fn enqueue(&self, priority: TaskPriority, id: TaskId, task_type: String) {
        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner.heap.lock().push(QueuedRef {
            priority,
            seq,
            id,
            task_type,
        });
        self.inner.notify.notify_one();
    }

    /// Pops the highest-priority task whose type the caller accepts.
    ///
    /// A popped task with a non-accepted type is pushed back and `None` is
    /// returned; refs to tasks cancelled while queued are discarded.
    pub(crate) fn pop_matching(&self, accepted: &[String]) -> Option<TaskId> {
        let mut heap = self.inner.heap.lock();
        loop {
            let item = heap.pop()?;
            let status = self
                .inner
                .records
                .get(&item.id)
                .map(|r| r.snapshot.status);
            match status {
                Some(TaskStatus::Cancelled) | None => continue,
                _ if accepted.iter().any(|t| t == &item.task_type) => return Some(item.id),
                _ => {
                    heap.push(item);
                    return None;
                }
            }
        }
    }

    /// Starts the consumer pool. Idempotent per queue lifetime is not
    /// required; calling twice simply adds more workers.
    pub fn start(&self) {
        for i in 0..self.inner.workers {
            let queue = self.clone();
            let accepted = vec!["default".to_string()];
            let name = format!("consumer-{i}");
            let handle = tokio::spawn(async move {
                queue.consume(name, accepted).await;
            });
            self.inner.handles.lock().push(handle);
        }
    }

    /// Starts one additional consumer accepting the given type tags.
    pub fn start_consumer(&self, name: impl Into<String>, accepted: &[&str]) {
        let queue = self.clone();
        let accepted: Vec<String> = accepted.iter().map(|s| s.to_string()).collect();
        let name = name.into();
        let handle = tokio::spawn(async move {
            queue.consume(name, accepted).await;
        });
        self.inner.handles.lock().push(handle);
    }

    async fn consume(self, name: String, accepted: Vec<String>) {
        let shutdown = self.inner.shutdown.clone();
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match self.pop_matching(&accepted) {
                Some(id) => self.process(&name, id).await,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.inner.notify.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                    }
                }
            }
        }
        debug!(consumer = %name, "consumer stopped");
    }

    async fn process(&self, consumer: &str, id: TaskId) {
        let (run, retry_delay) = match self.inner.records.get_mut(&id) {
            Some(mut record) => {
                if record.snapshot.status == TaskStatus::Cancelled {
                    return;
                }
                record.snapshot.status = TaskStatus::Running;
                record.snapshot.started_at = Some(epoch_seconds());
                (record.run.clone(), record.retry_delay)
            }
            None => return,
        };

        let token = self.inner.shutdown.child_token();
        let outcome = run(token).await;

        match outcome {
            Ok(result) => {
                let callback = {
                    let mut record = match self.inner.records.get_mut(&id) {
                        Some(record) => record,
                        None => return,
                    };
                    record.snapshot.status = TaskStatus::Completed;
                    record.snapshot.result = Some(result.clone());
                    record.snapshot.completed_at = Some(epoch_seconds());
                    record.callback.clone()
                };
                if let Some(callback) = callback {
                    callback(result).await;
                }
            }
            Err(err) => {
                let retry = {
                    let mut record = match self.inner.records.get_mut(&id) {
                        Some(record) => record,
                        None => return,
                    };
                    if record.snapshot.retry_count < record.snapshot.max_retries {
                        record.snapshot.retry_count += 1;
                        record.snapshot.status = TaskStatus::Retrying;
                        Some((record.snapshot.priority, record.snapshot.task_type.clone()))
                    } else {
                        record.snapshot.status = TaskStatus::Failed;
                        record.snapshot.error = Some(err.to_string());
                        record.snapshot.completed_at = Some(epoch_seconds());
                        error!(task_id = %id, consumer, error = %err, "task failed");
                        None
                    }
                };
                if let Some((priority, task_type)) = retry {
                    if !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                    self.enqueue(priority, id, task_type);
                }
            }
        }
    }

    /// Cancels a task that has not started (or is waiting on a retry).
    ///
    /// Running tasks are not force-aborted; they observe the cancellation
    /// token instead.
    pub fn cancel(&self, id: &str) -> bool {
        match self.inner.records.get_mut(id) {
            Some(mut record)
                if matches!(
                    record.snapshot.status,
                    TaskStatus::Pending | TaskStatus::Retrying
                ) =>
            {
                record.snapshot.status = TaskStatus::Cancelled;
                record.snapshot.completed_at = Some(epoch_seconds());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of a task's state.
    pub fn status(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner.records.get(id).map(|r| r.snapshot.clone())
    }

    /// Waits until a task reaches a terminal state or the timeout elapses.
    pub async fn wait_for(&self, id: &str, timeout: Duration) -> Option<TaskSnapshot> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(snapshot) = self.status(id) {
                if snapshot.status.is_terminal() {
                    return Some(snapshot);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return self.status(id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Number of queued (not yet started) refs, for introspection.
    pub fn queued_len(&self) -> usize {
        self.inner.heap.lock().len()
    }

    /// Stops the consumers and waits for them to wind down.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
        let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
