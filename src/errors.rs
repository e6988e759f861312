use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

// --- Record Store Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    #[error("Record store backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Corrupt record in store: {0}")]
    Corrupt(String),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidScore(i32),
    #[error("Invalid ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("Invalid page")]
    InvalidPage,

    // Authentication
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Domain-level not-found
    #[error("Meme not found with ID: {0}")]
    MemeNotFound(Uuid),
    #[error("Template not found with ID: {0}")]
    TemplateNotFound(Uuid),
    #[error("No memes found")]
    NoMemes,

    // Store-level failures, split by recoverability
    #[error("Conflicting write rejected by the record store")]
    Conflict(#[source] RepoError),
    #[error("Record store temporarily unavailable")]
    StoreUnavailable(#[source] RepoError),
    #[error("Record store operation failed")]
    Repository(#[source] RepoError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            e @ RepoError::AlreadyExists(_) => AppError::Conflict(e),
            e @ RepoError::Unavailable(_) => AppError::StoreUnavailable(e),
            e => AppError::Repository(e),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidScore(score) => (
                StatusCode::BAD_REQUEST,
                format!("Rating must be between 1 and 5, got {}", score),
            ),
            AppError::InvalidUuid(e) => (StatusCode::BAD_REQUEST, format!("Invalid ID format: {}", e)),
            AppError::InvalidPage => (StatusCode::NOT_FOUND, "Invalid page".to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, format!("Unauthorized: {}", msg)),
            AppError::MemeNotFound(id) => (StatusCode::NOT_FOUND, format!("Meme not found with ID: {}", id)),
            AppError::TemplateNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Template not found with ID: {}", id))
            }
            AppError::NoMemes => (StatusCode::NOT_FOUND, "No memes found".to_string()),
            AppError::Conflict(e) => {
                tracing::error!(error.source = ?e, "Store uniqueness guard rejected a write");
                (StatusCode::CONFLICT, "Conflicting write rejected".to_string())
            }

            // 5xx Server Errors
            AppError::StoreUnavailable(e) => {
                tracing::error!(error.source = ?e, "Record store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Record store temporarily unavailable".to_string(),
                )
            }
            AppError::Repository(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string())
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        tracing::debug!(error.message = %error_message, error.detail = %self, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}
