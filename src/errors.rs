use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
///
/// Each variant is a distinct, stable signal so callers at the HTTP boundary
/// can tell "try again later" apart from "this input is permanently broken"
/// and from "the system itself is unhealthy".
#[derive(Debug)]
pub enum AppError {
    /// Claim or ledger store is unreachable or rejected an operation.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Another in-flight attempt holds the claim for this fingerprint.
    DuplicateInProgress {
        /// Suggested delay before the caller retries.
        retry_after_secs: u64,
    },
    /// The classification gateway failed: transport error, non-2xx response,
    /// or output that failed strict schema validation.
    EnrichmentFailed(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::DuplicateInProgress { retry_after_secs } => write!(
                f,
                "Duplicate request in progress. Retry after {} seconds",
                retry_after_secs
            ),
            AppError::EnrichmentFailed(msg) => write!(f, "Enrichment failed: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each variant to its status code and JSON body. The conflict
    /// variant also sets a `Retry-After` header so automated callers know
    /// when to resubmit.
    fn into_response(self) -> Response {
        match self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Storage error"})),
                )
                    .into_response()
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({"error": msg}))).into_response()
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
            }
            AppError::DuplicateInProgress { retry_after_secs } => {
                let mut response = (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "Duplicate request in progress. Retry after a few seconds.",
                        "retry_after": retry_after_secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, retry_after_secs.into());
                response
            }
            AppError::EnrichmentFailed(msg) => {
                tracing::error!("Enrichment failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": format!("Enrichment failed: {}", msg)})),
                )
                    .into_response()
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error"})),
                )
                    .into_response()
            }
            AppError::WithContext { source, context } => {
                // Log the full context chain, then delegate to the underlying
                // error's response.
                tracing::error!("Error with context: {} -> {}", context, source);
                source.into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::EnrichmentFailed(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::EnrichmentFailed("connection timeout".to_string());
        let display = format!("{}", error);
        assert!(display.contains("Enrichment failed"));
        assert!(display.contains("connection timeout"));

        let error = AppError::DuplicateInProgress { retry_after_secs: 5 };
        assert!(format!("{}", error).contains("Retry after 5 seconds"));
    }

    #[test]
    fn test_context_chains() {
        let result: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = result.context("recording run").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("recording run"));
        assert!(display.contains("Database error"));
    }
}
