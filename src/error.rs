use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("provider fetch for '{status}' failed after {attempts} attempts: {message}")]
    Fetch {
        status: String,
        attempts: u32,
        message: String,
    },

    #[error("provider returned HTTP {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("unexpected provider payload: {0}")]
    UpstreamPayload(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("sync batch for '{0}' timed out")]
    BatchTimeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
