use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{DeploybarError, Result};

pub const DEFAULT_API_URL: &str = "https://api.netlify.com/api/v1";
pub const DEFAULT_UI_URL: &str = "https://app.netlify.com";
pub const DEFAULT_STATUS_FEED_URL: &str = "https://www.netlifystatus.com/api/v2/incidents.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
/// The incident feed is polled on a fixed cadence, independent of settings.
pub const INCIDENT_POLL_INTERVAL_MS: u64 = 60_000;
/// Delay between authorization ticket checks. Checks repeat without an upper bound.
pub const AUTH_RETRY_DELAY_MS: u64 = 1_000;
/// Deploy listings are paginated to keep upstream load low.
pub const DEPLOYS_PER_PAGE: u32 = 15;

/// Top-level config (deploybar.toml + DEPLOYBAR_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploybarConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: AppSettings,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub incidents: IncidentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default = "default_ui_url")]
    pub ui_url: String,
    /// Previously issued access token. When absent or rejected the ticket flow runs.
    pub access_token: Option<String>,
    /// OAuth application id used to create authorization tickets.
    pub oauth_client_id: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            ui_url: default_ui_url(),
            access_token: None,
            oauth_client_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// User-facing settings, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Interval of the deploy polling task.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub show_notifications: bool,
    #[serde(default = "bool_true")]
    pub show_pending_builds: bool,
    /// Site to watch. Falls back to the first listed site when unset.
    pub current_site_id: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            show_notifications: false,
            show_pending_builds: true,
            current_site_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Desktop notifier command, e.g. `["notify-send", "--app-name=deploybar"]`.
    /// Title and body are appended as the last two arguments.
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// `host:port` probed with a TCP connect to decide whether we are online.
    #[serde(default = "default_probe_addr")]
    pub probe_addr: String,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_addr: default_probe_addr(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentsConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
}

impl Default for IncidentsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_url: default_feed_url(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_ui_url() -> String {
    DEFAULT_UI_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_probe_addr() -> String {
    "api.netlify.com:443".to_string()
}
fn default_probe_interval_secs() -> u64 {
    5
}
fn default_probe_timeout_ms() -> u64 {
    3_000
}
fn default_feed_url() -> String {
    DEFAULT_STATUS_FEED_URL.to_string()
}

impl DeploybarConfig {
    /// Load config from a TOML file with DEPLOYBAR_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `DEPLOYBAR_SETTINGS__POLL_INTERVAL_MS=30000`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: DeploybarConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DEPLOYBAR_").split("__"))
            .extract()
            .map_err(|e| DeploybarError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.settings.poll_interval_ms == 0 {
            return Err(DeploybarError::Config(
                "settings.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.connectivity.probe_interval_secs == 0 {
            return Err(DeploybarError::Config(
                "connectivity.probe_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.deploybar/deploybar.toml", home)
}
