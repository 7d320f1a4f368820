use thiserror::Error;

/// Failures talking to the hosting API or the status page.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API rejected the access token (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Connection refused, DNS failure or timeout.
    #[error("API unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// The ticket flow cannot start without an OAuth client id.
    #[error("authorization impossible: {0}")]
    AuthConfig(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Http(_) => "HTTP_ERROR",
            ApiError::Status { .. } => "API_ERROR",
            ApiError::Parse(_) => "PARSE_ERROR",
            ApiError::AuthConfig(_) => "AUTH_CONFIG",
        }
    }

    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ApiError::Unavailable(e.to_string())
        } else {
            ApiError::Http(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
