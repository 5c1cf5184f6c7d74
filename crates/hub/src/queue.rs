// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent FIFO work queue with a per-task state machine.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::component::AgentKind;
use crate::persist;

const QUEUE_FILE: &str = "queue.json";

/// Queue entry state machine.
///
/// `pending → dispatching → working → {completed, failed, cancelled}`;
/// a 409 from the agent returns a dispatching entry to `pending` at the
/// back of the queue. Terminal entries are removed and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Dispatching,
    Working,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Parse a worker-reported state string into a terminal [`TaskState`].
pub fn terminal_state(state: &str) -> Option<TaskState> {
    match state {
        "completed" => Some(TaskState::Completed),
        "failed" => Some(TaskState::Failed),
        "cancelled" => Some(TaskState::Cancelled),
        _ => None,
    }
}

/// Where a queued task came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    #[default]
    Web,
    Scheduler,
    Cli,
    Queue,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Scheduler => "scheduler",
            Self::Cli => "cli",
            Self::Queue => "queue",
        }
    }
}

/// A unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub queue_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Continuation hint on entry; replaced by the worker-assigned session
    /// ID once the task is dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub agent_kind: AgentKind,
    #[serde(default)]
    pub source: TaskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_job: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    pub state: TaskState,
}

/// Parameters for [`WorkQueue::add`].
#[derive(Debug, Clone, Default)]
pub struct QueueRequest {
    pub prompt: String,
    pub tier: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub session_id: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub agent_kind: Option<AgentKind>,
    pub source: Option<TaskSource>,
    pub source_job: Option<String>,
}

/// The queue refused a new task because it is at capacity.
#[derive(Debug)]
pub struct QueueFull {
    pub max_size: usize,
}

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full ({} tasks)", self.max_size)
    }
}

impl std::error::Error for QueueFull {}

/// Persistent, capacity-bounded FIFO queue.
///
/// Every mutation rewrites the queue file under the queue lock, so a
/// restart can never observe a torn write.
pub struct WorkQueue {
    inner: Mutex<IndexMap<String, QueuedTask>>,
    path: PathBuf,
    max_size: usize,
}

impl WorkQueue {
    /// Open the queue directory, loading any persisted tasks.
    ///
    /// Entries in terminal states are discarded; a `dispatching` entry is
    /// normalised back to `pending` so the dispatcher retries it.
    pub fn open(queue_dir: &Path, max_size: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(queue_dir)?;
        let path = queue_dir.join(QUEUE_FILE);

        let mut tasks = IndexMap::new();
        if path.exists() {
            let loaded: Vec<QueuedTask> = persist::load(&path)?;
            for mut task in loaded {
                if task.state.is_terminal() {
                    continue;
                }
                if task.state == TaskState::Dispatching {
                    task.state = TaskState::Pending;
                }
                tasks.insert(task.queue_id.clone(), task);
            }
        }

        Ok(Self { inner: Mutex::new(tasks), path, max_size })
    }

    /// Append a task. Returns the stored entry and its 1-based position
    /// among pending entries, or [`QueueFull`].
    pub async fn add(&self, req: QueueRequest) -> anyhow::Result<(QueuedTask, usize)> {
        let mut tasks = self.inner.lock().await;
        if tasks.len() >= self.max_size {
            return Err(QueueFull { max_size: self.max_size }.into());
        }

        let task = QueuedTask {
            queue_id: uuid::Uuid::new_v4().to_string(),
            prompt: req.prompt,
            tier: req.tier,
            timeout_seconds: req.timeout_seconds,
            session_id: req.session_id,
            env: req.env,
            agent_kind: req.agent_kind.unwrap_or_default(),
            source: req.source.unwrap_or_default(),
            source_job: req.source_job,
            created_at: Utc::now(),
            dispatched_at: None,
            agent_url: String::new(),
            task_id: String::new(),
            attempts: 0,
            last_error: String::new(),
            state: TaskState::Pending,
        };
        tasks.insert(task.queue_id.clone(), task.clone());
        self.persist_locked(&tasks)?;

        let position =
            tasks.values().filter(|t| t.state == TaskState::Pending).count();
        Ok((task, position))
    }

    /// The oldest pending entry, if any.
    pub async fn next_pending(&self) -> Option<QueuedTask> {
        let tasks = self.inner.lock().await;
        tasks.values().find(|t| t.state == TaskState::Pending).cloned()
    }

    pub async fn set_state(&self, queue_id: &str, state: TaskState) {
        let mut tasks = self.inner.lock().await;
        if let Some(task) = tasks.get_mut(queue_id) {
            task.state = state;
        }
        self.persist_best_effort(&tasks);
    }

    /// Record a successful handoff: `dispatching → working` plus the agent
    /// binding and dispatch timestamp.
    pub async fn set_dispatched(
        &self,
        queue_id: &str,
        agent_url: &str,
        task_id: &str,
        session_id: &str,
    ) {
        let mut tasks = self.inner.lock().await;
        if let Some(task) = tasks.get_mut(queue_id) {
            task.state = TaskState::Working;
            task.agent_url = agent_url.to_owned();
            task.task_id = task_id.to_owned();
            task.session_id = Some(session_id.to_owned());
            task.dispatched_at = Some(Utc::now());
        }
        self.persist_best_effort(&tasks);
    }

    /// Return a task to `pending` at the back of the queue. Used only when
    /// the agent answered 409: the attempt counter is untouched.
    pub async fn requeue_at_back(&self, queue_id: &str) {
        let mut tasks = self.inner.lock().await;
        if let Some(mut task) = tasks.shift_remove(queue_id) {
            task.state = TaskState::Pending;
            task.agent_url = String::new();
            task.task_id = String::new();
            task.dispatched_at = None;
            tasks.insert(task.queue_id.clone(), task);
        }
        self.persist_best_effort(&tasks);
    }

    /// Record a failed dispatch attempt and return the new attempt count.
    /// The task goes back to `pending`; the caller decides whether the
    /// attempt budget is exhausted.
    pub async fn record_attempt(&self, queue_id: &str, error: &str) -> u32 {
        let mut tasks = self.inner.lock().await;
        let attempts = match tasks.get_mut(queue_id) {
            Some(task) => {
                task.attempts += 1;
                task.last_error = error.to_owned();
                task.state = TaskState::Pending;
                task.attempts
            }
            None => 0,
        };
        self.persist_best_effort(&tasks);
        attempts
    }

    /// Mark a task cancelled and remove it.
    pub async fn cancel(&self, queue_id: &str) -> Option<QueuedTask> {
        let mut tasks = self.inner.lock().await;
        let mut task = tasks.shift_remove(queue_id)?;
        task.state = TaskState::Cancelled;
        self.persist_best_effort(&tasks);
        Some(task)
    }

    /// Unconditional removal.
    pub async fn remove(&self, queue_id: &str) -> Option<QueuedTask> {
        let mut tasks = self.inner.lock().await;
        let task = tasks.shift_remove(queue_id);
        self.persist_best_effort(&tasks);
        task
    }

    pub async fn get(&self, queue_id: &str) -> Option<QueuedTask> {
        self.inner.lock().await.get(queue_id).cloned()
    }

    /// 1-based position of a pending entry among pending entries.
    pub async fn position(&self, queue_id: &str) -> Option<usize> {
        let tasks = self.inner.lock().await;
        tasks
            .values()
            .filter(|t| t.state == TaskState::Pending)
            .position(|t| t.queue_id == queue_id)
            .map(|i| i + 1)
    }

    /// Number of pending entries.
    pub async fn depth(&self) -> usize {
        let tasks = self.inner.lock().await;
        tasks.values().filter(|t| t.state == TaskState::Pending).count()
    }

    /// Number of entries handed to an agent and not yet terminal.
    pub async fn dispatched_count(&self) -> usize {
        let tasks = self.inner.lock().await;
        tasks
            .values()
            .filter(|t| matches!(t.state, TaskState::Dispatching | TaskState::Working))
            .count()
    }

    /// Age of the oldest pending entry.
    pub async fn oldest_age(&self) -> Option<Duration> {
        let tasks = self.inner.lock().await;
        tasks
            .values()
            .find(|t| t.state == TaskState::Pending)
            .map(|t| (Utc::now() - t.created_at).to_std().unwrap_or_default())
    }

    /// Snapshot in insertion order.
    pub async fn get_all(&self) -> Vec<QueuedTask> {
        self.inner.lock().await.values().cloned().collect()
    }

    fn persist_locked(&self, tasks: &IndexMap<String, QueuedTask>) -> anyhow::Result<()> {
        let list: Vec<&QueuedTask> =
            tasks.values().filter(|t| !t.state.is_terminal()).collect();
        persist::save(&self.path, &list)
    }

    fn persist_best_effort(&self, tasks: &IndexMap<String, QueuedTask>) {
        if let Err(e) = self.persist_locked(tasks) {
            tracing::error!(path = %self.path.display(), err = %e, "failed to persist queue");
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
