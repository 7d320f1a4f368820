use std::sync::Arc;

use deploybar_api::Transport;
use deploybar_channels::ConnectivityMonitor;
use deploybar_scheduler::Scheduler;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;

/// Stop polling when connectivity drops and restart it when it returns.
pub fn bind_connectivity<T: Transport + 'static>(
    monitor: &ConnectivityMonitor,
    scheduler: Scheduler,
    app: Arc<App<T>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *rx.borrow_and_update();
                    if online {
                        info!("back online, resuming tasks");
                        if let Err(e) = scheduler.resume() {
                            warn!(error = %e, "cannot resume polling");
                        }
                    } else {
                        info!("offline, stopping tasks");
                        scheduler.stop();
                        app.tray.offline();
                    }
                }
            }
        }
    })
}
