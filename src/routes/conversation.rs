use super::{success, SharedState};
use crate::error::{ApiError, ApiResult};
use crate::upload::read_file_field;
use axum::{
    extract::{Multipart, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use ragchat_common::{ApiResponse, ChatMessage};
use ragchat_core::TurnOutcome;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemporaryResponse {
    pub session_id: String,
    pub filename: Option<String>,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/send", post(send_message))
        .route("/:session_id", delete(clear_session))
        .route("/:session_id/retry", post(retry_last))
        .route("/:session_id/history", get(history))
        .route(
            "/:session_id/temporary",
            post(attach_temporary).delete(clear_temporary),
        )
}

async fn send_message(
    State(state): State<SharedState>,
    Json(request): Json<SendRequest>,
) -> ApiResult<Json<ApiResponse<TurnOutcome>>> {
    debug!("Received message for session {:?}", request.session_id);
    let outcome = state
        .chat
        .send_message(&request.message, request.session_id.as_deref())
        .await?;
    Ok(success(outcome))
}

async fn retry_last(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ApiResponse<TurnOutcome>>> {
    if !state.chat.has_session(&session_id).await {
        return Err(ApiError::NotFound(format!("Unknown session '{}'", session_id)));
    }
    Ok(success(state.chat.retry_last(&session_id).await?))
}

async fn history(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<ApiResponse<Vec<ChatMessage>>> {
    success(state.chat.history(&session_id).await)
}

async fn attach_temporary(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<TemporaryResponse>>> {
    let upload = read_file_field(multipart).await?;
    state
        .chat
        .attach_temporary(&session_id, &upload.filename, &upload.text)
        .await?;

    Ok(success(TemporaryResponse {
        session_id,
        filename: Some(upload.filename),
    }))
}

async fn clear_temporary(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<ApiResponse<TemporaryResponse>> {
    state.chat.clear_temporary(&session_id).await;
    success(TemporaryResponse {
        session_id,
        filename: None,
    })
}

async fn clear_session(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<ApiResponse<bool>> {
    success(state.chat.clear_session(&session_id).await)
}
