use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a deploy as reported by the hosting API.
///
/// Only the states the reconciler reasons about get their own variant; any
/// other upstream value is carried through verbatim in [`DeployState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeployState {
    New,
    Building,
    Ready,
    Error,
    /// Display-only state: an `error` deploy whose message is `"Skipped"`.
    Skipped,
    Other(String),
}

impl DeployState {
    pub fn as_str(&self) -> &str {
        match self {
            DeployState::New => "new",
            DeployState::Building => "building",
            DeployState::Ready => "ready",
            DeployState::Error => "error",
            DeployState::Skipped => "skipped",
            DeployState::Other(s) => s,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DeployState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "new" => DeployState::New,
            "building" => DeployState::Building,
            "ready" => DeployState::Ready,
            "error" => DeployState::Error,
            "skipped" => DeployState::Skipped,
            _ => DeployState::Other(s),
        }
    }
}

impl From<&str> for DeployState {
    fn from(s: &str) -> Self {
        DeployState::from(s.to_string())
    }
}

impl From<DeployState> for String {
    fn from(state: DeployState) -> Self {
        match state {
            DeployState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// A single deploy of a site, as returned by `GET /sites/{id}/deploys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub id: String,
    pub state: DeployState,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub context: String,
    pub created_at: DateTime<Utc>,
    /// Build duration in seconds, absent while the deploy is still running.
    #[serde(default)]
    pub deploy_time: Option<u64>,
}

impl Deploy {
    /// True for an `error` deploy the API marked as skipped.
    pub fn is_skipped_error(&self) -> bool {
        self.state == DeployState::Error && self.error_message.as_deref() == Some("Skipped")
    }
}

/// A site the authenticated user can watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub url: String,
    pub admin_url: String,
}

impl Site {
    /// URL without the scheme, as shown in menus and logs.
    pub fn display_url(&self) -> &str {
        self.url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))
            .unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

/// One entry of the incident status feed. `link` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub link: String,
    pub title: String,
    pub publication_date: DateTime<Utc>,
    pub content: String,
}

/// What happens when the user activates (clicks) a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activation {
    OpenUrl { url: String },
}

/// A notification the core wants shown. Presentation is up to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
}

impl NotificationIntent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            activation: None,
        }
    }

    /// Attach an "open this URL" action.
    pub fn opening(mut self, url: impl Into<String>) -> Self {
        self.activation = Some(Activation::OpenUrl { url: url.into() });
        self
    }
}
