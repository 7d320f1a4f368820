use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    types::{RepeatTask, RunContext, TaskAction, TaskFailure, TaskId, TaskInfo, TaskStatus},
};

/// Number of failures kept in the ledger; older entries are dropped first.
const MAX_RECORDED_FAILURES: usize = 256;

/// Immutable part of a registered task, shared with its driver loop.
struct TaskShared {
    id: TaskId,
    name: String,
    interval: Duration,
    action: Arc<dyn TaskAction>,
    /// Held for the duration of every invocation so a task never runs
    /// concurrently with itself, even across stop/resume generations.
    run_guard: tokio::sync::Mutex<()>,
}

/// Registration slot. `timer` is `None` while the task is stopped.
struct TaskSlot {
    shared: Arc<TaskShared>,
    timer: Option<CancellationToken>,
}

impl TaskSlot {
    fn status(&self) -> TaskStatus {
        if self.timer.is_some() {
            TaskStatus::Running
        } else {
            TaskStatus::Stopped
        }
    }
}

#[derive(Clone, Default)]
struct FailureLedger(Arc<Mutex<VecDeque<TaskFailure>>>);

impl FailureLedger {
    fn record(&self, failure: TaskFailure) {
        let mut entries = self.0.lock().unwrap();
        if entries.len() == MAX_RECORDED_FAILURES {
            entries.pop_front();
        }
        entries.push_back(failure);
    }

    fn snapshot(&self) -> Vec<TaskFailure> {
        self.0.lock().unwrap().iter().cloned().collect()
    }
}

/// Runs independent recurring tasks, each on its own interval.
///
/// The handle is cheap to clone; all clones drive the same task set. Every
/// registered task starts with an immediate first-run invocation, then waits
/// `interval` after each invocation settles before starting the next one.
/// `stop` disarms every timer and `resume` restarts every task from scratch.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<Vec<TaskSlot>>>,
    failures: FailureLedger,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tasks` and start each of them immediately.
    ///
    /// The first-run invocation is spawned onto the runtime, not awaited: it
    /// starts as soon as the caller yields, without waiting for the interval.
    ///
    /// Registrations accumulate: tasks added by earlier calls keep running
    /// undisturbed. Nothing is registered if any task has a zero interval.
    pub fn repeat(&self, tasks: Vec<RepeatTask>) -> Result<Vec<TaskId>> {
        if let Some(bad) = tasks.iter().find(|t| t.interval.is_zero()) {
            return Err(SchedulerError::InvalidInterval {
                name: bad.name.clone(),
            });
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut slots = self.tasks.lock().unwrap();
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let shared = Arc::new(TaskShared {
                id: TaskId::new(),
                name: task.name,
                interval: task.interval,
                action: task.action,
                run_guard: tokio::sync::Mutex::new(()),
            });
            info!(
                task_id = %shared.id,
                task = %shared.name,
                interval_ms = shared.interval.as_millis() as u64,
                "task registered"
            );
            let timer = self.start(&runtime, &shared);
            ids.push(shared.id.clone());
            slots.push(TaskSlot {
                shared,
                timer: Some(timer),
            });
        }
        Ok(ids)
    }

    /// Disarm every pending timer. Actions stay registered for [`resume`](Self::resume).
    ///
    /// An invocation already in flight runs to completion but does not arm
    /// its successor.
    pub fn stop(&self) {
        let mut slots = self.tasks.lock().unwrap();
        let mut stopped = 0usize;
        for slot in slots.iter_mut() {
            if let Some(timer) = slot.timer.take() {
                timer.cancel();
                stopped += 1;
            }
        }
        info!(stopped, "scheduler stopped");
    }

    /// Restart every known task with an immediate first-run invocation.
    ///
    /// As with [`repeat`](Self::repeat), that invocation runs once the caller
    /// yields.
    ///
    /// A task that is still running is stopped first, so no task ever has
    /// more than one timer loop.
    pub fn resume(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let mut slots = self.tasks.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(previous) = slot.timer.take() {
                debug!(task = %slot.shared.name, "restarting running task");
                previous.cancel();
            }
            slot.timer = Some(self.start(&runtime, &slot.shared));
        }
        info!(resumed = slots.len(), "scheduler resumed");
        Ok(())
    }

    /// Snapshot of every registered task in registration order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|slot| TaskInfo {
                id: slot.shared.id.clone(),
                name: slot.shared.name.clone(),
                interval_ms: slot.shared.interval.as_millis() as u64,
                status: slot.status(),
            })
            .collect()
    }

    /// True when at least one task has an armed timer loop.
    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .any(|slot| slot.timer.is_some())
    }

    /// Failed invocations recorded so far, oldest first.
    pub fn failures(&self) -> Vec<TaskFailure> {
        self.failures.snapshot()
    }

    // --- private helpers ---------------------------------------------------

    fn start(&self, runtime: &Handle, shared: &Arc<TaskShared>) -> CancellationToken {
        let cancel = CancellationToken::new();
        runtime.spawn(drive(
            Arc::clone(shared),
            cancel.clone(),
            self.failures.clone(),
        ));
        cancel
    }
}

/// Timer loop of one task generation: RUNNING until `cancel` fires.
///
/// The next timer is armed only after the current invocation settles.
async fn drive(task: Arc<TaskShared>, cancel: CancellationToken, ledger: FailureLedger) {
    invoke(&task, true, &ledger).await;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(task.interval) => {}
        }
        invoke(&task, false, &ledger).await;
    }
    debug!(task = %task.name, "task loop stopped");
}

/// Run the action once. Errors and panics are recorded, never propagated.
async fn invoke(task: &TaskShared, is_first_run: bool, ledger: &FailureLedger) {
    let _guard = task.run_guard.lock().await;
    debug!(task = %task.name, is_first_run, "running task");

    let outcome = AssertUnwindSafe(task.action.run(RunContext { is_first_run }))
        .catch_unwind()
        .await;
    let message = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => panic_message(payload),
    };

    warn!(
        task_id = %task.id,
        task = %task.name,
        is_first_run,
        error = %message,
        "task run failed; will retry on next tick"
    );
    ledger.record(TaskFailure {
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        is_first_run,
        message,
        failed_at: Utc::now(),
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
