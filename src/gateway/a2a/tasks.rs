//! In-memory A2A task service.
//!
//! Tracks tasks through their `submitted → working → completed | failed |
//! canceled` lifecycle.  The table is guarded by a reader–writer lock:
//! `create`, `update_state`, and `cleanup_terminal` take the write side,
//! `get` only reads.  Submissions flow through a bounded queue; when it is
//! full the task is still recorded, but born `failed` with a standard
//! message rather than blocking the caller.  A background reaper sweeps
//! terminal tasks on a fixed interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::gateway::a2a::types::{A2aMessage, Task, TaskState, TaskStatus};

/// Status message for submissions rejected by a full queue.
pub const QUEUE_FULL_MESSAGE: &str = "Task queue is full";

/// In-memory task table plus bounded submission queue.
pub struct TaskService {
    tasks: RwLock<HashMap<String, Task>>,
    queue: mpsc::Sender<String>,
}

impl TaskService {
    /// Create the service and hand back the consumer side of the queue.
    ///
    /// The receiver yields task ids in submission order; consumers move each
    /// task to `working` while they process it.
    pub fn new(queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        (
            Arc::new(Self {
                tasks: RwLock::new(HashMap::new()),
                queue: tx,
            }),
            rx,
        )
    }

    /// Record a new task and enqueue it.
    ///
    /// When the queue is full the task is created directly in `failed` state
    /// with [`QUEUE_FULL_MESSAGE`]; no error is raised.
    pub async fn create(&self, context_id: &str, message: Option<A2aMessage>) -> Task {
        let id = uuid::Uuid::new_v4().to_string();
        let mut task = Task {
            id: id.clone(),
            context_id: context_id.to_string(),
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Submitted,
                message,
                timestamp: Utc::now().to_rfc3339(),
            },
            artifacts: None,
            history: None,
        };

        if self.queue.try_send(id.clone()).is_err() {
            log::warn!("task {} rejected: {}", id, QUEUE_FULL_MESSAGE);
            task.status.state = TaskState::Failed;
            task.status.message = Some(A2aMessage::user_text(QUEUE_FULL_MESSAGE, None));
            task.status.timestamp = Utc::now().to_rfc3339();
        }

        self.tasks.write().await.insert(id, task.clone());
        task
    }

    /// Snapshot of a task by id.
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Advance a task's state, refreshing its timestamp.
    ///
    /// Returns `false` when the task is unknown.
    pub async fn update_state(
        &self,
        id: &str,
        state: TaskState,
        message: Option<A2aMessage>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) => {
                task.status.state = state;
                if message.is_some() {
                    task.status.message = message;
                }
                task.status.timestamp = Utc::now().to_rfc3339();
                true
            }
            None => false,
        }
    }

    /// Drop every task in a terminal state; returns how many were removed.
    pub async fn cleanup_terminal(&self) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| !task.status.state.is_terminal());
        before - tasks.len()
    }

    /// Number of tracked tasks (terminal included, until reaped).
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Spawn the periodic reaper.  The handle can be aborted at shutdown.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately; skip it so a fresh service
            // is not swept before it has done anything.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = service.cleanup_terminal().await;
                if removed > 0 && log::log_enabled!(log::Level::Debug) {
                    log::debug!("task reaper removed {} terminal task(s)", removed);
                }
            }
        })
    }
}
