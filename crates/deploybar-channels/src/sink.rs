use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deploybar_core::types::{Activation, NotificationIntent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where notification intents end up.
///
/// Delivery is fire-and-forget: `notify` never blocks on presentation and
/// callers never learn whether the user saw anything.
pub trait NotificationSink: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"log"`).
    fn name(&self) -> &str;

    fn notify(&self, intent: &NotificationIntent);
}

fn activation_url(intent: &NotificationIntent) -> Option<&str> {
    match &intent.activation {
        Some(Activation::OpenUrl { url }) => Some(url),
        None => None,
    }
}

/// Emits every intent as a structured tracing event.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, intent: &NotificationIntent) {
        info!(
            title = %intent.title,
            body = %intent.body,
            url = activation_url(intent).unwrap_or(""),
            "notification"
        );
    }
}

/// Forwards intents to an external presenter over a bounded channel.
pub struct ChannelSink {
    tx: mpsc::Sender<NotificationIntent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotificationIntent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn notify(&self, intent: &NotificationIntent) {
        if let Err(e) = self.tx.try_send(intent.clone()) {
            warn!(title = %intent.title, error = %e, "dropping notification");
        }
    }
}

/// Runs a desktop notifier command with the title and body appended, e.g.
/// `notify-send --app-name=deploybar <title> <body>`.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// `None` when `command` is empty.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl NotificationSink for CommandSink {
    fn name(&self) -> &str {
        "command"
    }

    fn notify(&self, intent: &NotificationIntent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(program = %self.program, "no runtime, notification command skipped");
            return;
        };

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).arg(&intent.title).arg(&intent.body);
        let program = self.program.clone();

        handle.spawn(async move {
            match cmd.status().await {
                Ok(status) if status.success() => debug!(%program, "notification shown"),
                Ok(status) => warn!(%program, %status, "notification command failed"),
                Err(e) => warn!(%program, error = %e, "cannot run notification command"),
            }
        });
    }
}

/// Drops intents while notifications are switched off.
pub struct GatedSink {
    inner: Arc<dyn NotificationSink>,
    enabled: AtomicBool,
}

impl GatedSink {
    pub fn new(inner: Arc<dyn NotificationSink>, enabled: bool) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl NotificationSink for GatedSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn notify(&self, intent: &NotificationIntent) {
        if self.is_enabled() {
            self.inner.notify(intent);
        } else {
            debug!(sink = %self.inner.name(), title = %intent.title, "notifications off");
        }
    }
}

/// Hands every intent to each registered sink in registration order.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn NotificationSink>) {
        info!(sink = %sink.name(), "registering notification sink");
        self.sinks.push(sink);
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

impl NotificationSink for SinkSet {
    fn name(&self) -> &str {
        "set"
    }

    fn notify(&self, intent: &NotificationIntent) {
        for sink in &self.sinks {
            sink.notify(intent);
        }
    }
}
