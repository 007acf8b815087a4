use std::io;

/// Errors produced while talking to the classification service or handling
/// its local state (session file, exports).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Session expired or was rejected by the server; log in again")]
    Unauthorized,
    #[error("Login failed: {0}")]
    InvalidCredentials(String),
    #[error("Admin access required")]
    Forbidden,
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unknown marketplace: {0}")]
    UnknownMarketplace(String),
}

impl ClientError {
    /// Whether the user has to log in again before anything else can succeed
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::Unauthorized)
    }
}
