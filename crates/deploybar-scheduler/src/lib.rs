//! `deploybar-scheduler`: independent recurring tasks on a Tokio runtime.
//!
//! # Overview
//!
//! [`Scheduler::repeat`] registers tasks; each one is invoked immediately
//! with `is_first_run = true` and then again every `interval` after the
//! previous invocation settles. Failing or panicking invocations are recorded
//! in a bounded ledger and never stop the loop.
//!
//! # Task states
//!
//! | From      | Event        | To        | Effect                                   |
//! |-----------|--------------|-----------|------------------------------------------|
//! | `Running` | timer fires  | `Running` | invoke, then re-arm                      |
//! | `Running` | `stop()`     | `Stopped` | cancel the armed timer                   |
//! | `Stopped` | `resume()`   | `Running` | immediate first-run invoke, then re-arm  |

pub mod engine;
pub mod error;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use types::{
    ActionResult, RepeatTask, RunContext, TaskAction, TaskFailure, TaskId, TaskInfo, TaskStatus,
};
