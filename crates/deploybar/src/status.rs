use std::fmt;

use chrono::{DateTime, Utc};
use deploybar_core::types::{Deploy, DeployState};
use tokio::sync::watch;
use tracing::info;

/// What the tray icon shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayStatus {
    Loading,
    Offline,
    Deploy(DeployState),
}

impl fmt::Display for TrayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrayStatus::Loading => f.write_str("loading"),
            TrayStatus::Offline => f.write_str("offline"),
            TrayStatus::Deploy(state) => write!(f, "{state}"),
        }
    }
}

/// Tray icon plus the pending-builds badge next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayView {
    pub status: TrayStatus,
    pub badge: String,
}

impl TrayView {
    pub fn loading() -> Self {
        Self {
            status: TrayStatus::Loading,
            badge: String::new(),
        }
    }
}

impl fmt::Display for TrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.status, self.badge)
    }
}

/// Publishes [`TrayView`] updates and logs each change.
pub struct TrayPublisher {
    tx: watch::Sender<TrayView>,
}

impl TrayPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TrayView::loading());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrayView> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TrayView {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, view: TrayView) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view.clone();
                true
            }
        });
        if changed {
            info!(status = %view.status, badge = %view.badge, "tray updated");
        }
    }

    pub fn offline(&self) {
        self.publish(TrayView {
            status: TrayStatus::Offline,
            badge: String::new(),
        });
    }
}

/// Coarse relative time: "just now", "5m ago", "3h ago", "2d ago".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// One menu line for a deploy, e.g. `main (production) ready 5m ago in 31s`.
pub fn deploy_label(deploy: &Deploy, now: DateTime<Utc>) -> String {
    let mut label = format!(
        "{} ({}) {} {}",
        deploy.branch,
        deploy.context,
        deploy.state,
        time_ago(deploy.created_at, now)
    );
    if let Some(secs) = deploy.deploy_time {
        label.push_str(&format!(" in {secs}s"));
    }
    label
}
