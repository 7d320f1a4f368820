//! `deploybar-core`: data model, configuration and error types shared by
//! every deploybar crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::DeploybarConfig;
pub use error::{DeploybarError, Result};
pub use types::{Activation, Deploy, DeployState, FeedItem, NotificationIntent, Site, User};
