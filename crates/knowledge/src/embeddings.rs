use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use ragchat_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Converts text into fixed-length vectors.
///
/// Implementations never cache; every call reaches the backing model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds each text in order. Equivalent to calling `embed` once per text.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an Ollama-compatible `/api/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RagError::Configuration(format!("Failed to build embedding client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embeddings for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Embedding {} chars with {}", text.chars().count(), self.model);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request to {} failed: {}", self.api_url, e);
                RagError::EmbeddingUnavailable(format!("request to {} failed: {}", self.api_url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Embedding endpoint returned {}: {}", status, body);
            return Err(RagError::EmbeddingUnavailable(format!(
                "embedding endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("malformed embedding response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(RagError::EmbeddingUnavailable(
                "embedding endpoint returned an empty vector".to_string(),
            ));
        }

        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_endpoint(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/embeddings", addr)
    }

    fn provider_for(api_url: String) -> OllamaEmbeddings {
        OllamaEmbeddings::new(&EmbeddingConfig {
            api_url,
            model: "bge-m3:latest".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    async fn length_embedding(Json(body): Json<Value>) -> impl IntoResponse {
        assert_eq!(body["model"], "bge-m3:latest");
        let prompt = body["prompt"].as_str().unwrap_or_default();
        Json(json!({ "embedding": [prompt.len() as f32, 1.0, 0.5] }))
    }

    #[tokio::test]
    async fn test_embed_posts_model_and_prompt() {
        let url = spawn_endpoint(Router::new().route("/api/embeddings", post(length_embedding))).await;
        let provider = provider_for(url);

        let vector = provider.embed("hello").await.unwrap();
        assert_eq!(vector, vec![5.0, 1.0, 0.5]);
    }

    #[tokio::test]
    async fn test_embed_many_preserves_order() {
        let url = spawn_endpoint(Router::new().route("/api/embeddings", post(length_embedding))).await;
        let provider = provider_for(url);

        let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];
        let vectors = provider.embed_many(&texts).await.unwrap();
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_unavailable() {
        let app = Router::new().route(
            "/api/embeddings",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let provider = provider_for(spawn_endpoint(app).await);

        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_malformed_response_is_unavailable() {
        let app = Router::new().route(
            "/api/embeddings",
            post(|| async { Json(json!({ "vectors": [1.0] })) }),
        );
        let provider = provider_for(spawn_endpoint(app).await);

        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Bind then drop so the port is closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = provider_for(format!("http://{}/api/embeddings", addr));
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }
}
