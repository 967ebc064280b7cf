//! Knowledge base for retrieval-augmented chat: chunking, embedding,
//! a persisted vector store and prompt augmentation.

pub mod chunker;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod manager;
pub mod vector_store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chunker::Chunker;
pub use composer::AugmentationComposer;
pub use config::{ComposerConfig, EmbeddingConfig, KnowledgeBaseConfig};
pub use embeddings::{Embeddings, OllamaEmbeddings};
pub use manager::KnowledgeBase;
pub use vector_store::{ChunkRecord, MetadataFilter, ScoredChunk, StoreOptions, VectorStore};
