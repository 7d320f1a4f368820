use std::sync::Arc;
use std::time::Duration;

use deploybar_core::config::ConnectivityConfig;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Online/offline state shared between the probe and its observers.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that is only marked changed on an actual transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Record the current state. Returns true when it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }

    /// Resolve once the monitor reports online.
    pub async fn wait_online(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|online| *online).await;
    }

    /// Probe `cfg.probe_addr` every `cfg.probe_interval_secs` until `cancel` fires.
    pub fn spawn_probe(
        self: Arc<Self>,
        cfg: &ConnectivityConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let addr = cfg.probe_addr.clone();
        let interval = Duration::from_secs(cfg.probe_interval_secs);
        let timeout = Duration::from_millis(cfg.probe_timeout_ms);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    online = probe(&addr, timeout) => { self.set_online(online); }
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(%addr, "connectivity probe stopped");
        })
    }
}

/// True when a TCP connection to `addr` opens within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
