use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use deploybar_core::config::ApiConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// JSON request/response plumbing against the hosting API.
///
/// `path` is relative to the API root and may carry a query string.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_json(&self, path: &str, method: Method) -> Result<Value>;

    /// Currently installed access token, if any.
    fn token(&self) -> Option<String>;

    /// Replace the access token used by subsequent requests.
    fn set_token(&self, token: Option<String>);
}

/// reqwest-backed [`Transport`] sending `Authorization: Bearer <token>`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deploybar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token),
        })
    }

    pub fn from_config(cfg: &ApiConfig) -> Result<Self> {
        Self::new(
            cfg.base_url.clone(),
            cfg.access_token.clone(),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_json(&self, path: &str, method: Method) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = method.as_str(), %url, "API request");

        let mut req = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(ApiError::from_send)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %path, body = %text, "API error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let text = resp.text().await.map_err(ApiError::from_send)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }
}
