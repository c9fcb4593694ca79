use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Acquisition/validation errors surface synchronously to the submitting
/// caller; errors raised after a job exists are flushed to the stores as
/// FAILED by the orchestrator before they reach this mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to acquire resume: {0}")]
    AcquisitionFailed(String),

    #[error("Document conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job has no JD: {0}")]
    JdMissing(String),

    #[error("Text is not a job description: {0}")]
    NotAJobDescription(String),

    #[error("JD extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Failed to parse score result: {0}")]
    ScoreParseFailed(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Status store error: {0}")]
    StatusStore(#[from] redis::RedisError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            AppError::UnsupportedFileType(msg) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_FILE_TYPE",
                msg.clone(),
            ),
            AppError::AcquisitionFailed(msg) => {
                tracing::error!("Resume acquisition failed: {msg}");
                (StatusCode::BAD_GATEWAY, "ACQUISITION_FAILED", msg.clone())
            }
            AppError::ConversionFailed(msg) => {
                tracing::error!("Document conversion failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONVERSION_FAILED",
                    msg.clone(),
                )
            }
            AppError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "SIGNATURE_INVALID",
                "Webhook signature verification failed".to_string(),
            ),
            AppError::JobNotFound(id) => (
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                format!("No match job found for {id}"),
            ),
            AppError::JdMissing(id) => (
                StatusCode::BAD_REQUEST,
                "JD_MISSING",
                format!("Job {id} has no JD attached"),
            ),
            AppError::NotAJobDescription(reason) => (
                StatusCode::BAD_REQUEST,
                "NOT_A_JOB_DESCRIPTION",
                reason.clone(),
            ),
            AppError::ExtractionFailed(msg) => {
                tracing::error!("JD extraction failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EXTRACTION_FAILED",
                    msg.clone(),
                )
            }
            AppError::ScoreParseFailed(msg) => {
                tracing::error!("Score parse failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SCORE_PARSE_FAILED",
                    msg.clone(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::StatusStore(e) => {
                tracing::error!("Status store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STATUS_STORE_ERROR",
                    "A status store error occurred".to_string(),
                )
            }
            AppError::Queue(msg) => {
                tracing::error!("Queue error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "QUEUE_ERROR",
                    "A queue error occurred".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
