use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of a registered task, unique within one scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input handed to every invocation of a task action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// True for the immediate invocation issued by `repeat` or `resume`.
    pub is_first_run: bool,
}

pub type ActionResult = anyhow::Result<()>;

/// A recurring unit of work.
///
/// Implemented for any `Fn(RunContext) -> impl Future<Output = ActionResult>`,
/// so plain async closures can be registered directly.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn run(&self, ctx: RunContext) -> ActionResult;
}

#[async_trait]
impl<F, Fut> TaskAction for F
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    async fn run(&self, ctx: RunContext) -> ActionResult {
        (self)(ctx).await
    }
}

/// Registration request passed to [`Scheduler::repeat`](crate::Scheduler::repeat).
#[derive(Clone)]
pub struct RepeatTask {
    /// Human-readable label, used in logs and the failure ledger.
    pub name: String,
    /// Delay between the end of one invocation and the start of the next.
    pub interval: Duration,
    pub action: Arc<dyn TaskAction>,
}

impl RepeatTask {
    pub fn new(name: impl Into<String>, interval: Duration, action: impl TaskAction + 'static) -> Self {
        Self {
            name: name.into(),
            interval,
            action: Arc::new(action),
        }
    }
}

impl fmt::Debug for RepeatTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Timer state of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// A timer loop is armed (or an invocation is in flight).
    Running,
    /// No timer is armed; the action is kept for `resume`.
    Stopped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of a registered task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub interval_ms: u64,
    pub status: TaskStatus,
}

/// One failed invocation, as kept in the scheduler's failure ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub task_name: String,
    pub is_first_run: bool,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}
