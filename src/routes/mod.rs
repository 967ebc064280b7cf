pub mod conversation;
pub mod health;
pub mod knowledge;

use axum::{http::StatusCode, Json, Router};
use ragchat_common::ApiResponse;
use ragchat_core::ChatService;
use ragchat_knowledge::KnowledgeBase;
use std::sync::Arc;

pub struct AppState {
    pub knowledge: Arc<KnowledgeBase>,
    pub chat: Arc<ChatService>,
}

pub type SharedState = Arc<AppState>;

pub fn create_routes(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::routes())
        .nest("/api/v1/knowledge", knowledge::routes())
        .nest("/api/v1/conversation", conversation::routes())
        .fallback(not_found_handler)
        .with_state(state)
}

pub fn success<T: serde::Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
