use deploybar_core::config::DEPLOYS_PER_PAGE;
use deploybar_core::types::{Deploy, Site, User};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::transport::{Method, Transport};

/// An OAuth authorization ticket.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    pub id: String,
    #[serde(default)]
    pub authorized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

/// Typed client over a [`Transport`].
pub struct DeployApi<T: Transport> {
    transport: T,
}

impl<T: Transport> DeployApi<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        decode(self.transport.fetch_json(path, Method::Get).await?)
    }

    async fn post<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        decode(self.transport.fetch_json(path, Method::Post).await?)
    }

    pub async fn current_user(&self) -> Result<User> {
        self.get("/user").await
    }

    pub async fn sites(&self) -> Result<Vec<Site>> {
        self.get("/sites").await
    }

    /// Most recent deploys of a site, newest first (first page only).
    pub async fn site_deploys(&self, site_id: &str) -> Result<Vec<Deploy>> {
        self.get(&format!(
            "/sites/{site_id}/deploys?page=1&per_page={DEPLOYS_PER_PAGE}"
        ))
        .await
    }

    /// Trigger a new build of the site.
    pub async fn create_site_build(&self, site_id: &str) -> Result<()> {
        self.transport
            .fetch_json(&format!("/sites/{site_id}/builds"), Method::Post)
            .await?;
        Ok(())
    }

    pub async fn create_ticket(&self, client_id: &str) -> Result<Ticket> {
        self.post(&format!("/oauth/tickets?client_id={client_id}"))
            .await
    }

    pub async fn show_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        self.get(&format!("/oauth/tickets/{ticket_id}")).await
    }

    pub async fn exchange_ticket(&self, ticket_id: &str) -> Result<AccessToken> {
        self.post(&format!("/oauth/tickets/{ticket_id}/exchange"))
            .await
    }
}

fn decode<R: DeserializeOwned>(value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))
}
