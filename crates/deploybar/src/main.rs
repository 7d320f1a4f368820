use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use deploybar_api::{
    authorize, AuthOptions, DeployApi, HttpTransport, IncidentSource, StatusFeedSource,
};
use deploybar_channels::{CommandSink, ConnectivityMonitor, GatedSink, LogSink, NotificationSink, SinkSet};
use deploybar_core::config::DeploybarConfig;
use deploybar_scheduler::Scheduler;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod connection;
mod console;
mod status;
mod tasks;
#[cfg(test)]
mod testing;

/// Watch the deploys of a hosted site from the terminal.
#[derive(Parser)]
#[command(
    name = "deploybar",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DEPLOYBAR_GIT_SHA"), ")"),
    about
)]
struct Cli {
    /// Path to the TOML config file (default: ~/.deploybar/deploybar.toml).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll deploys and incidents until quit (default).
    Watch {
        /// Site to watch instead of the configured one.
        #[arg(long)]
        site: Option<String>,
    },
    /// List the sites of the authorized account.
    Sites,
    /// Start a new build.
    Trigger {
        #[arg(long)]
        site: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "deploybar=info,deploybar_scheduler=info,deploybar_api=info,deploybar_channels=info",
            )
        }))
        .init();

    let cli = Cli::parse();

    // explicit path > DEPLOYBAR_CONFIG env > ~/.deploybar/deploybar.toml
    let config_path = cli.config.or_else(|| std::env::var("DEPLOYBAR_CONFIG").ok());
    let mut config =
        DeploybarConfig::load(config_path.as_deref()).context("cannot load configuration")?;

    match cli.command.unwrap_or(Command::Watch { site: None }) {
        Command::Watch { site } => {
            if site.is_some() {
                config.settings.current_site_id = site;
            }
            run_watch(config).await
        }
        Command::Sites => list_sites(&config).await,
        Command::Trigger { site } => trigger(&config, site).await,
    }
}

async fn authorized_api(config: &DeploybarConfig) -> anyhow::Result<DeployApi<HttpTransport>> {
    let api = DeployApi::new(HttpTransport::from_config(&config.api)?);
    authorize(
        &api,
        &AuthOptions::from_config(&config.api),
        auth::announce_authorize_url,
    )
    .await?;
    Ok(api)
}

async fn list_sites(config: &DeploybarConfig) -> anyhow::Result<()> {
    let api = authorized_api(config).await?;
    let sites = api.sites().await?;
    let current = config.settings.current_site_id.as_deref();
    println!("{}", console::render_sites(&sites, current));
    Ok(())
}

async fn trigger(config: &DeploybarConfig, site: Option<String>) -> anyhow::Result<()> {
    let api = authorized_api(config).await?;
    let site_id = match site.or_else(|| config.settings.current_site_id.clone()) {
        Some(id) => id,
        None => api
            .sites()
            .await?
            .into_iter()
            .next()
            .map(|s| s.id)
            .context("the account has no sites")?,
    };
    api.create_site_build(&site_id).await?;
    println!("build triggered for {site_id}");
    Ok(())
}

/// Log sink plus the desktop notifier, if configured. The desktop sink is
/// returned separately so the console can switch it on and off.
fn build_sinks(config: &DeploybarConfig) -> (Arc<dyn NotificationSink>, Option<Arc<GatedSink>>) {
    let mut sinks = SinkSet::new();
    sinks.register(Arc::new(LogSink));

    let desktop = CommandSink::new(&config.notifications.command).map(|cmd| {
        Arc::new(GatedSink::new(
            Arc::new(cmd),
            config.settings.show_notifications,
        ))
    });
    if let Some(desktop) = &desktop {
        sinks.register(desktop.clone());
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sinks);
    (sink, desktop)
}

async fn run_watch(config: DeploybarConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "deploybar starting");
    let cancel = CancellationToken::new();

    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let probe = Arc::clone(&monitor).spawn_probe(&config.connectivity, cancel.clone());
    if !monitor.is_online() {
        info!(probe = %config.connectivity.probe_addr, "waiting for connectivity");
    }
    tokio::select! {
        _ = monitor.wait_online() => {}
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Ok(());
        }
    }

    let auth_opts = AuthOptions::from_config(&config.api);
    let api = authorized_api(&config).await?;

    let (sink, desktop) = build_sinks(&config);
    let incidents: Option<Arc<dyn IncidentSource>> = if config.incidents.enabled {
        Some(Arc::new(StatusFeedSource::new(
            config.incidents.feed_url.clone(),
            Duration::from_secs(config.api.request_timeout_secs),
        )?))
    } else {
        None
    };

    let (reauth_tx, reauth_rx) = mpsc::channel(1);
    let app = Arc::new(app::App::new(
        api,
        sink,
        incidents,
        &config.settings,
        reauth_tx,
    ));

    let scheduler = Scheduler::new();
    let mut repeat = vec![tasks::deploys_task(
        app.clone(),
        Duration::from_millis(config.settings.poll_interval_ms),
    )];
    if config.incidents.enabled {
        repeat.push(tasks::incidents_task(app.clone()));
    }
    scheduler.repeat(repeat)?;

    let tray = spawn_tray_printer(&app.tray, cancel.clone());
    let bridge =
        connection::bind_connectivity(&monitor, scheduler.clone(), app.clone(), cancel.clone());
    let reauth = auth::spawn_reauth(
        app.clone(),
        scheduler.clone(),
        auth_opts,
        reauth_rx,
        cancel.clone(),
    );

    let console = console::Console {
        app,
        scheduler: scheduler.clone(),
        desktop,
    };
    tokio::select! {
        r = console.run() => r?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    info!("shutting down");
    scheduler.stop();
    cancel.cancel();
    let _ = tokio::join!(probe, tray, bridge, reauth);
    Ok(())
}

/// Terminal stand-in for the tray icon: one line per change.
fn spawn_tray_printer(
    tray: &status::TrayPublisher,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = tray.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("tray: {}", *rx.borrow_and_update());
                }
            }
        }
    })
}
