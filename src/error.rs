use thiserror::Error;

/// Errors surfaced by every calday operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("calendar API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

pub fn auth_error(message: &str) -> Error {
    Error::Auth(message.to_string())
}

pub fn validation_error(message: &str) -> Error {
    Error::Validation(message.to_string())
}

impl Error {
    /// True for failures detected locally before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
