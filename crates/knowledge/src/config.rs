use ragchat_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Directory holding the persisted vector store.
    pub store_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// fsync on every commit instead of relying on the WAL checkpoint.
    pub synchronous_full: bool,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub reference_preamble: String,
    pub temporary_heading: String,
    pub question_label: String,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("vector_knowledge_base"),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            synchronous_full: true,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/embeddings".to_string(),
            model: "bge-m3:latest".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            reference_preamble: "Please refer to the following content:".to_string(),
            temporary_heading: "[Temporary file content]".to_string(),
            question_label: "The user's question/instruction is: ".to_string(),
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration("top_k must be greater than zero".to_string()));
        }
        self.embedding.validate()
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RagError::Configuration("embedding model name is empty".to_string()));
        }
        if self.api_url.trim().is_empty() {
            return Err(RagError::Configuration("embedding api_url is empty".to_string()));
        }
        Ok(())
    }
}
