use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploybarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No site available to watch")]
    NoSites,

    #[error("Site not found: {id}")]
    SiteNotFound { id: String },
}

impl DeploybarError {
    /// Short stable code, used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            DeploybarError::Config(_) => "CONFIG_ERROR",
            DeploybarError::Unauthorized => "NOT_AUTHORIZED",
            DeploybarError::Transport(_) => "TRANSPORT_ERROR",
            DeploybarError::NoSites => "NO_SITES",
            DeploybarError::SiteNotFound { .. } => "SITE_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, DeploybarError>;
