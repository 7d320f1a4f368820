use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deploybar_core::types::FeedItem;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Somewhere incident items come from.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    async fn fetch_incidents(&self) -> Result<Vec<FeedItem>>;
}

/// Reads a Statuspage `incidents.json` document.
pub struct StatusFeedSource {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IncidentsDoc {
    #[serde(default)]
    incidents: Vec<Incident>,
}

#[derive(Debug, Deserialize)]
struct Incident {
    id: String,
    name: String,
    #[serde(default)]
    shortlink: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    incident_updates: Vec<IncidentUpdate>,
}

#[derive(Debug, Deserialize)]
struct IncidentUpdate {
    status: String,
    #[serde(default)]
    body: String,
    created_at: DateTime<Utc>,
}

impl Incident {
    fn into_item(self) -> FeedItem {
        let content = self
            .incident_updates
            .iter()
            .max_by_key(|u| u.created_at)
            .map(|u| format!("{}: {}", u.status, u.body))
            .unwrap_or_default();
        FeedItem {
            link: self.shortlink.unwrap_or(self.id),
            title: self.name,
            publication_date: self.created_at,
            content,
        }
    }
}

impl StatusFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IncidentSource for StatusFeedSource {
    async fn fetch_incidents(&self) -> Result<Vec<FeedItem>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ApiError::from_send)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), url = %self.url, "status feed error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let doc: IncidentsDoc = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        debug!(count = doc.incidents.len(), "fetched status feed");
        Ok(doc.incidents.into_iter().map(Incident::into_item).collect())
    }
}
