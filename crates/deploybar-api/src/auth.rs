//! OAuth ticket flow.
//!
//! 1. `POST /oauth/tickets?client_id=…` creates a ticket.
//! 2. The user approves it in the browser at `{ui_url}/authorize?…&ticket={id}`.
//! 3. `GET /oauth/tickets/{id}` is polled until `authorized` is true.
//! 4. `POST /oauth/tickets/{id}/exchange` yields the access token.

use std::time::Duration;

use deploybar_core::config::{ApiConfig, AUTH_RETRY_DELAY_MS};
use tracing::{debug, info};

use crate::client::DeployApi;
use crate::error::{ApiError, Result};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub client_id: Option<String>,
    pub ui_url: String,
    /// Pause between ticket checks.
    pub retry_delay: Duration,
}

impl AuthOptions {
    pub fn from_config(cfg: &ApiConfig) -> Self {
        Self {
            client_id: cfg.oauth_client_id.clone(),
            ui_url: cfg.ui_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_millis(AUTH_RETRY_DELAY_MS),
        }
    }

    pub fn authorize_url(&self, ticket_id: &str) -> String {
        format!(
            "{}/authorize?response_type=ticket&ticket={ticket_id}",
            self.ui_url
        )
    }
}

/// Make sure the transport carries a working access token and return it.
///
/// An installed token is kept when `GET /user` accepts it. A rejected or
/// missing token starts the ticket flow; `open_url` receives the browser URL
/// the user has to visit. Polling has no attempt limit, so this only returns
/// once the ticket is approved or a request fails.
pub async fn authorize<T, F>(api: &DeployApi<T>, opts: &AuthOptions, open_url: F) -> Result<String>
where
    T: Transport,
    F: FnOnce(&str),
{
    if let Some(token) = api.transport().token() {
        match api.current_user().await {
            Ok(user) => {
                debug!(email = %user.email, "access token accepted");
                return Ok(token);
            }
            Err(ApiError::Unauthorized) => {
                info!("access token rejected, starting authorization");
                api.transport().set_token(None);
            }
            Err(e) => return Err(e),
        }
    }

    let client_id = opts.client_id.as_deref().ok_or_else(|| {
        ApiError::AuthConfig("no access token and no api.oauth_client_id configured".to_string())
    })?;

    let ticket = api.create_ticket(client_id).await?;
    let url = opts.authorize_url(&ticket.id);
    info!(ticket_id = %ticket.id, %url, "waiting for ticket authorization");
    open_url(&url);

    let mut attempts: u64 = 0;
    loop {
        tokio::time::sleep(opts.retry_delay).await;
        attempts += 1;
        if api.show_ticket(&ticket.id).await?.authorized {
            break;
        }
        debug!(ticket_id = %ticket.id, attempts, "ticket not authorized yet");
    }

    let token = api.exchange_ticket(&ticket.id).await?.access_token;
    api.transport().set_token(Some(token.clone()));
    info!(attempts, "authorization complete");
    Ok(token)
}
