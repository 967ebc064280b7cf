use anyhow::Result;
use axum::{http::Method, Router};
use ragchat_core::{ChatService, OllamaChatClient};
use ragchat_knowledge::{AugmentationComposer, KnowledgeBase};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod routes;
mod settings;
mod upload;

use routes::{create_routes, AppState, SharedState};
use settings::Settings;

fn build_app(state: SharedState) -> Router {
    create_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ragchat=debug,ragchat_knowledge=debug,ragchat_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RagChat API...");

    let settings = Settings::load()?;
    info!(
        "Knowledge base at {} (embedding model {}), chat model {}",
        settings.knowledge.store_path.display(),
        settings.knowledge.embedding.model,
        settings.chat.model
    );

    let knowledge = Arc::new(KnowledgeBase::with_ollama(settings.knowledge.clone())?);
    let model = Arc::new(OllamaChatClient::new(&settings.chat)?);
    let chat = Arc::new(ChatService::new(
        knowledge.clone(),
        AugmentationComposer::new(settings.composer.clone()),
        model,
        settings.chat.clone(),
    ));

    let app = build_app(Arc::new(AppState { knowledge, chat }));

    let addr = settings.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use ragchat_core::{testing::ScriptedChatModel, ChatConfig};
    use ragchat_knowledge::{testing::BagOfWordsEmbeddings, KnowledgeBaseConfig};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ragchat-test-boundary";

    fn test_app(dir: &TempDir, model: ScriptedChatModel) -> Router {
        let config = KnowledgeBaseConfig {
            store_path: dir.path().join("kb"),
            ..KnowledgeBaseConfig::default()
        };
        let knowledge =
            Arc::new(KnowledgeBase::new(config, Arc::new(BagOfWordsEmbeddings::default())).unwrap());
        let chat = Arc::new(ChatService::new(
            knowledge.clone(),
            AugmentationComposer::default(),
            Arc::new(model),
            ChatConfig::default(),
        ));
        build_app(Arc::new(AppState { knowledge, chat }))
    }

    fn multipart_upload(uri: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["ok"]));

        let (status, body) = call(&app, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_knowledge_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["ok"]));

        let (status, body) = call(&app, empty_request("GET", "/api/v1/knowledge/sources")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sources"], json!([]));

        let (status, body) = call(
            &app,
            multipart_upload("/api/v1/knowledge/upload", "colors.txt", "The sky is blue. Grass is green."),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["filename"], "colors.txt");
        assert_eq!(body["data"]["chunks_added"], 1);

        let (status, body) = call(
            &app,
            empty_request("GET", "/api/v1/knowledge/search?query=sky%20color&limit=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_results"], 1);
        assert_eq!(body["data"]["results"][0], "The sky is blue. Grass is green.");

        let (_, body) = call(&app, empty_request("GET", "/api/v1/knowledge/stats")).await;
        assert_eq!(body["data"]["exists"], true);
        assert_eq!(body["data"]["chunk_count"], 1);

        let (status, body) = call(&app, empty_request("DELETE", "/api/v1/knowledge/sources/colors.txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["chunks_removed"], 1);

        let (_, body) = call(&app, empty_request("GET", "/api/v1/knowledge/sources")).await;
        assert_eq!(body["data"]["sources"], json!([]));
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["ok"]));

        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--{b}--\r\n",
            b = BOUNDARY
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/knowledge/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();

        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_conversation_turns() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["The sky ", "is blue."]));

        call(
            &app,
            multipart_upload("/api/v1/knowledge/upload", "colors.txt", "The sky is blue."),
        )
        .await;

        let (status, body) = call(
            &app,
            json_request("POST", "/api/v1/conversation/send", json!({"message": "What color is the sky?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response"], "The sky is blue.");
        assert_eq!(body["data"]["retrieved"], 1);
        let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

        let (_, body) = call(
            &app,
            empty_request("GET", &format!("/api/v1/conversation/{}/history", session_id)),
        )
        .await;
        let history = body["data"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["display"], "What color is the sky?");
        assert_eq!(history[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_temporary_upload_and_upstream_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::failing_then_replying(&["Summary."]));

        let (status, _) = call(
            &app,
            multipart_upload("/api/v1/conversation/s1/temporary", "draft.txt", "Quarterly draft"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            json_request("POST", "/api/v1/conversation/send", json!({"message": "Summarize", "session_id": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response"], ChatConfig::default().fallback_response);
        assert!(body["data"]["upstream_error"].is_string());

        let (status, body) = call(&app, empty_request("POST", "/api/v1/conversation/s1/retry")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response"], "Summary.");

        let (status, _) = call(&app, empty_request("DELETE", "/api/v1/conversation/s1/temporary")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_retry_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["ok"]));

        let (status, body) = call(&app, empty_request("POST", "/api/v1/conversation/missing/retry")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");

        call(
            &app,
            json_request("POST", "/api/v1/conversation/send", json!({"message": "hi", "session_id": "known"})),
        )
        .await;
        let (status, body) = call(&app, empty_request("POST", "/api/v1/conversation/known/retry")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, ScriptedChatModel::replying(&["ok"]));

        let (status, body) = call(
            &app,
            json_request("POST", "/api/v1/conversation/send", json!({"message": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
    }
}
