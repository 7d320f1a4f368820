//! Line-oriented stdin console for `deploybar watch`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deploybar_api::Transport;
use deploybar_channels::GatedSink;
use deploybar_core::types::Site;
use deploybar_reconcile::DeployBuckets;
use deploybar_scheduler::{Scheduler, TaskFailure};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::app::{App, StatusReport};
use crate::status::deploy_label;

const HELP: &str = "commands: status, sites, deploys, switch <site-id>, deploy, errors, notifications on|off, help, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Sites,
    Deploys,
    Switch(String),
    Deploy,
    Errors,
    Notifications(bool),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        let parsed = match (cmd, arg) {
            ("status", None) => Self::Status,
            ("sites", None) => Self::Sites,
            ("deploys", None) => Self::Deploys,
            ("switch", Some(id)) => Self::Switch(id.to_string()),
            ("switch", None) => return Err("usage: switch <site-id>".to_string()),
            ("deploy", None) => Self::Deploy,
            ("errors", None) => Self::Errors,
            ("notifications", Some("on")) => Self::Notifications(true),
            ("notifications", Some("off")) => Self::Notifications(false),
            ("notifications", _) => return Err("usage: notifications on|off".to_string()),
            ("help", _) => Self::Help,
            ("quit" | "exit", None) => Self::Quit,
            _ => return Err(format!("unknown command: {}", line.trim())),
        };
        if words.next().is_some() {
            return Err(format!("too many arguments: {}", line.trim()));
        }
        Ok(Some(parsed))
    }
}

/// Everything a console command may touch.
pub struct Console<T: Transport> {
    pub app: Arc<App<T>>,
    pub scheduler: Scheduler,
    pub desktop: Option<Arc<GatedSink>>,
}

impl<T: Transport> Console<T> {
    /// Read commands until `quit` or end of input.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");
        while let Some(line) = lines.next_line().await? {
            match ConsoleCommand::parse(&line) {
                Ok(None) => {}
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(cmd)) => println!("{}", self.execute(cmd).await),
                Err(msg) => println!("{msg}"),
            }
        }
        debug!("console closed");
        Ok(())
    }

    pub async fn execute(&self, cmd: ConsoleCommand) -> String {
        let now = Utc::now();
        match cmd {
            ConsoleCommand::Status => render_status(&self.app.status().await, now),
            ConsoleCommand::Sites => {
                let report = self.app.status().await;
                let current = report.site.as_ref().map(|s| s.id.as_str());
                render_sites(&self.app.sites().await, current)
            }
            ConsoleCommand::Deploys => render_deploys(&self.app.deploys().await, now),
            ConsoleCommand::Switch(id) => match self.app.switch_site(&id).await {
                Ok(()) => format!("watching {id}"),
                Err(e) => format!("switch failed: {e}"),
            },
            ConsoleCommand::Deploy => match self.app.trigger_deploy().await {
                Ok(()) => "build triggered".to_string(),
                Err(e) => format!("trigger failed: {e}"),
            },
            ConsoleCommand::Errors => render_failures(&self.scheduler.failures()),
            ConsoleCommand::Notifications(on) => match &self.desktop {
                Some(sink) => {
                    sink.set_enabled(on);
                    format!("notifications {}", if on { "on" } else { "off" })
                }
                None => "no notification command configured".to_string(),
            },
            ConsoleCommand::Help | ConsoleCommand::Quit => HELP.to_string(),
        }
    }
}

pub fn render_status(report: &StatusReport, now: DateTime<Utc>) -> String {
    let mut out = format!("status: {}", report.view);
    if let Some(email) = &report.email {
        out.push_str(&format!("\nuser:   {email}"));
    }
    match &report.site {
        Some(site) => out.push_str(&format!("\nsite:   {} ({})", site.name, site.display_url())),
        None => out.push_str("\nsite:   none"),
    }
    if let Some(deploy) = &report.current {
        out.push_str(&format!("\ndeploy: {}", deploy_label(deploy, now)));
    }
    if report.pending > 0 {
        out.push_str(&format!("\npending builds: {}", report.pending));
    }
    out
}

pub fn render_sites(sites: &[Site], current: Option<&str>) -> String {
    if sites.is_empty() {
        return "no sites loaded yet".to_string();
    }
    sites
        .iter()
        .map(|s| {
            let marker = if Some(s.id.as_str()) == current { '*' } else { ' ' };
            format!("{marker} {}  {}  {}", s.id, s.name, s.display_url())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_deploys(buckets: &DeployBuckets, now: DateTime<Utc>) -> String {
    if buckets.is_empty() {
        return "no deploys".to_string();
    }
    let mut lines = Vec::new();
    if !buckets.pending.is_empty() {
        lines.push("pending:".to_string());
        lines.extend(buckets.pending.iter().map(|d| format!("  {}", deploy_label(d, now))));
    }
    if !buckets.ready.is_empty() {
        lines.push("ready:".to_string());
        lines.extend(buckets.ready.iter().map(|d| format!("  {}", deploy_label(d, now))));
    }
    lines.join("\n")
}

pub fn render_failures(failures: &[TaskFailure]) -> String {
    if failures.is_empty() {
        return "no failures".to_string();
    }
    failures
        .iter()
        .map(|f| {
            format!(
                "{} {}{}: {}",
                f.failed_at.format("%H:%M:%S"),
                f.task_name,
                if f.is_first_run { " (first run)" } else { "" },
                f.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
