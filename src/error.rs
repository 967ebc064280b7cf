use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ragchat_common::RagError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::Rag(err) => match err {
                RagError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
                RagError::EmbeddingUnavailable(msg) => {
                    warn!("Embedding service unavailable: {}", msg);
                    (StatusCode::BAD_GATEWAY, msg, "EMBEDDING_UNAVAILABLE")
                }
                RagError::UpstreamModel(msg) => {
                    warn!("Chat model unavailable: {}", msg);
                    (StatusCode::BAD_GATEWAY, msg, "UPSTREAM_MODEL_ERROR")
                }
                other => {
                    error!("Internal error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        "INTERNAL_ERROR",
                    )
                }
            },
        };

        let response_body = json!({
            "success": false,
            "error": error_message,
            "error_code": error_code,
            "timestamp": chrono::Utc::now()
        });

        (status, Json(response_body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
