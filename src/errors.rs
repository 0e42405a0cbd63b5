use std::future::Future;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::Rng;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Standard error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable description; generic for internal errors
    pub message: String,
    /// Correlation id for support and log lookup
    pub correlation_id: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Document too large: {size} bytes (limit {limit})")]
    DocumentTooLarge { size: u64, limit: u64 },

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a database error, translating unique-constraint violations
    /// into `Conflict` so callers see the taxonomy, not the driver.
    pub fn db_error(error: DbErr) -> Self {
        let text = error.to_string();
        if text.contains("UNIQUE constraint failed") || text.contains("duplicate key") {
            return ServiceError::Conflict(text);
        }
        ServiceError::DatabaseError(error)
    }

    /// True for errors that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::StorageUnavailable(_) | ServiceError::DeadlineExceeded(_)
        )
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::DocumentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a
    /// generic message so implementation details never leak.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::StorageUnavailable(_) => "Storage temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let correlation_id = Uuid::new_v4().to_string();

        if status.is_server_error() {
            warn!(correlation_id = %correlation_id, "request failed: {}", self);
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

/// Retries a transient failure at most twice with exponential backoff and
/// jitter. Validation and conflict errors pass through untouched.
pub async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    const MAX_RETRIES: u32 = 2;
    const BASE_DELAY_MS: u64 = 50;

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                let jitter = rand::thread_rng().gen_range(0..BASE_DELAY_MS);
                let delay = BASE_DELAY_MS * (1 << attempt) + jitter;
                warn!(attempt, "transient failure, retrying in {}ms: {}", delay, err);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
