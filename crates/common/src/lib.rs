use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key that names the upload a chunk came from.
pub const FILENAME_KEY: &str = "filename";

/// Key/value tags attached to every stored chunk.
pub type Metadata = BTreeMap<String, String>;

/// Build a metadata record carrying only a filename.
pub fn filename_metadata(filename: impl Into<String>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(FILENAME_KEY.to_string(), filename.into());
    metadata
}

// Knowledge base types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get(FILENAME_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub exists: bool,
    pub chunk_count: usize,
    pub source_count: usize,
    pub dimension: Option<usize>,
}

// Conversation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Text sent to the model for this turn.
    pub content: String,
    /// What the user actually typed, when it differs from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            display: Some(display.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            display: None,
            timestamp: Utc::now(),
        }
    }

    /// Text to show in a transcript.
    pub fn display_text(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.content)
    }
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Upstream model error: {0}")]
    UpstreamModel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

// API response types
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
