//! In-memory stand-ins for the HTTP collaborators.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deploybar_api::{ApiError, IncidentSource, Method, Transport};
use deploybar_core::types::FeedItem;
use serde_json::{json, Value};

/// Answers by exact path. Unknown paths get a 404.
///
/// The answer is picked when the request is made; a configured delay only
/// holds back its arrival.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Result<Value, u16>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(Method, String)>>,
    token: Mutex<Option<String>>,
}

impl FakeTransport {
    pub fn respond(&self, path: &str, value: Value) {
        self.routes.lock().unwrap().insert(path.to_string(), Ok(value));
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.routes.lock().unwrap().insert(path.to_string(), Err(status));
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|(_, p)| p == path).count()
    }

    /// One user, two sites and a building deploy on top of a ready one.
    pub fn with_account() -> Self {
        let t = Self::default();
        t.respond("/user", json!({"email": "me@example.com"}));
        t.respond(
            "/sites",
            json!([site_json("s1", "blog"), site_json("s2", "docs")]),
        );
        t.respond(
            &deploys_path("s1"),
            json!([deploy_json("d2", "building"), deploy_json("d1", "ready")]),
        );
        t.respond(&deploys_path("s2"), json!([deploy_json("x1", "ready")]));
        t
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_json(&self, path: &str, method: Method) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((method, path.to_string()));
        let answer = match self.routes.lock().unwrap().get(path) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(401)) => Err(ApiError::Unauthorized),
            Some(Err(status)) => Err(ApiError::Status {
                status: *status,
                message: String::new(),
            }),
            None => Err(ApiError::Status {
                status: 404,
                message: format!("no route for {path}"),
            }),
        };
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }
}

pub fn deploys_path(site_id: &str) -> String {
    format!("/sites/{site_id}/deploys?page=1&per_page=15")
}

pub fn site_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "url": format!("https://{name}.example.com"),
        "admin_url": format!("https://app.example.com/sites/{name}"),
    })
}

pub fn deploy_json(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "branch": "main",
        "context": "production",
        "created_at": "2024-03-01T10:00:00Z",
    })
}

/// Serves whatever items were last set.
#[derive(Default)]
pub struct FakeIncidents {
    items: Mutex<Vec<FeedItem>>,
}

impl FakeIncidents {
    pub fn set(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl IncidentSource for FakeIncidents {
    async fn fetch_incidents(&self) -> Result<Vec<FeedItem>, ApiError> {
        Ok(self.items.lock().unwrap().clone())
    }
}
