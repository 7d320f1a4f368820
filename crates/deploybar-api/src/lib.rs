//! `deploybar-api`: HTTP access to the hosting API and the status page.

pub mod auth;
pub mod client;
pub mod error;
pub mod incidents;
pub mod transport;

pub use auth::{authorize, AuthOptions};
pub use client::{AccessToken, DeployApi, Ticket};
pub use error::{ApiError, Result};
pub use incidents::{IncidentSource, StatusFeedSource};
pub use transport::{HttpTransport, Method, Transport};
