use crate::config::ChatConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use ragchat_common::{ChatMessage, RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Stream of reply fragments in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A chat-completion backend that streams its reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an Ollama-compatible `/api/chat` endpoint in streaming mode.
///
/// The endpoint answers with newline-delimited JSON objects, each carrying
/// one content fragment.
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl OllamaChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RagError::Configuration(format!("Failed to build chat client: {}", e)))?;

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
impl ChatModel for OllamaChatClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        debug!("Sending {} messages to {}", messages.len(), self.model);

        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: true,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat request to {} failed: {}", self.api_url, e);
                RagError::UpstreamModel(format!("request to {} failed: {}", self.api_url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Chat endpoint returned {}: {}", status, body);
            return Err(RagError::UpstreamModel(format!(
                "chat endpoint returned {}: {}",
                status, body
            )));
        }

        let state = LineReader {
            body: response.bytes_stream().boxed(),
            buffer: Vec::new(),
            exhausted: false,
            failed: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            state.next_fragment().await.map(|item| (item, state))
        })
        .boxed())
    }
}

/// Reassembles newline-delimited JSON lines from arbitrary network chunks.
struct LineReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    exhausted: bool,
    failed: bool,
}

impl LineReader {
    async fn next_fragment(&mut self) -> Option<Result<String>> {
        if self.failed {
            return None;
        }

        loop {
            while let Some(line) = self.take_line() {
                match parse_chat_line(&line) {
                    Ok(Some(fragment)) => return Some(Ok(fragment)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }

            if self.exhausted {
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(RagError::UpstreamModel(format!("reply stream interrupted: {}", e))));
                }
                None => {
                    self.exhausted = true;
                    // Terminate a trailing line that arrived without a newline.
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

/// `Ok(None)` for blank lines and chunks without content.
fn parse_chat_line(line: &[u8]) -> Result<Option<String>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_slice(line)
        .map_err(|e| RagError::UpstreamModel(format!("malformed reply chunk: {}", e)))?;

    if let Some(message) = chunk.error {
        return Err(RagError::UpstreamModel(message));
    }

    Ok(chunk
        .message
        .and_then(|m| m.content)
        .filter(|content| !content.is_empty()))
}
