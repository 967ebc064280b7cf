use super::{success, SharedState};
use crate::error::{ApiError, ApiResult};
use crate::upload::read_file_field;
use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use ragchat_common::{filename_metadata, ApiResponse, KnowledgeStats};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<String>,
    pub total_results: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub chunks_added: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub filename: String,
    pub chunks_removed: u64,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/upload", post(upload_document))
        .route("/search", get(search_documents))
        .route("/sources", get(list_sources))
        .route("/sources/:filename", delete(remove_source))
        .route("/stats", get(knowledge_stats))
}

async fn upload_document(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<UploadResponse>>> {
    let upload = read_file_field(multipart).await?;
    let chunks_added = state
        .knowledge
        .ingest(&[upload.text], Some(&[filename_metadata(upload.filename.clone())]))
        .await?;

    info!("Added '{}' to the knowledge base ({} chunks)", upload.filename, chunks_added);
    Ok(success(UploadResponse {
        filename: upload.filename,
        chunks_added,
    }))
}

async fn search_documents(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<ApiResponse<SearchResponse>>> {
    if params.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }

    let limit = params.limit.unwrap_or(state.knowledge.config().top_k);
    let results = state.knowledge.query(&params.query, limit).await?;

    Ok(success(SearchResponse {
        total_results: results.len(),
        results,
        query: params.query,
    }))
}

async fn list_sources(State(state): State<SharedState>) -> ApiResult<Json<ApiResponse<SourcesResponse>>> {
    let sources = state.knowledge.list_sources().await?;
    Ok(success(SourcesResponse {
        sources: sources.into_iter().collect(),
    }))
}

async fn remove_source(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<ApiResponse<RemoveResponse>>> {
    let chunks_removed = state.knowledge.remove_source(&filename).await?;
    Ok(success(RemoveResponse {
        filename,
        chunks_removed,
    }))
}

async fn knowledge_stats(State(state): State<SharedState>) -> ApiResult<Json<ApiResponse<KnowledgeStats>>> {
    Ok(success(state.knowledge.stats().await?))
}
