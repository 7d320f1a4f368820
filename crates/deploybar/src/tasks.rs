use std::sync::Arc;
use std::time::Duration;

use deploybar_api::Transport;
use deploybar_core::config::INCIDENT_POLL_INTERVAL_MS;
use deploybar_scheduler::{ActionResult, RepeatTask, RunContext};

use crate::app::App;

pub const DEPLOYS_TASK: &str = "deploys";
pub const INCIDENTS_TASK: &str = "incidents";

/// Deploy polling: full setup on a first run, a deploy refresh afterwards.
///
/// Setup is retried on every tick until it has succeeded once.
pub fn deploys_task<T: Transport + 'static>(app: Arc<App<T>>, interval: Duration) -> RepeatTask {
    RepeatTask::new(DEPLOYS_TASK, interval, move |ctx: RunContext| {
        let app = Arc::clone(&app);
        async move {
            if ctx.is_first_run || !app.is_set_up().await {
                app.setup().await?;
            } else {
                app.update_deploys().await?;
            }
            ActionResult::Ok(())
        }
    })
}

/// Status feed polling on a fixed cadence.
pub fn incidents_task<T: Transport + 'static>(app: Arc<App<T>>) -> RepeatTask {
    RepeatTask::new(
        INCIDENTS_TASK,
        Duration::from_millis(INCIDENT_POLL_INTERVAL_MS),
        move |_: RunContext| {
            let app = Arc::clone(&app);
            async move {
                app.update_incidents().await?;
                ActionResult::Ok(())
            }
        },
    )
}
