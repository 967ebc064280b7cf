use crate::chunker::Chunker;
use crate::config::KnowledgeBaseConfig;
use crate::embeddings::{Embeddings, OllamaEmbeddings};
use crate::vector_store::{ChunkRecord, MetadataFilter, ScoredChunk, StoreOptions, VectorStore};
use ragchat_common::{KnowledgeStats, Metadata, RagError, Result, FILENAME_KEY};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Ingest, query, delete and list operations over the persisted store.
///
/// Holds no store handle between calls; every operation opens the store at
/// the configured path and closes it before returning.
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    chunker: Chunker,
    embeddings: Arc<dyn Embeddings>,
    store_options: StoreOptions,
}

impl KnowledgeBase {
    pub fn new(config: KnowledgeBaseConfig, embeddings: Arc<dyn Embeddings>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::from_config(&config)?;
        let store_options = StoreOptions::from(&config);

        Ok(Self {
            config,
            chunker,
            embeddings,
            store_options,
        })
    }

    /// Knowledge base embedding through the configured Ollama endpoint.
    pub fn with_ollama(config: KnowledgeBaseConfig) -> Result<Self> {
        let embeddings = OllamaEmbeddings::new(&config.embedding)?;
        Self::new(config, Arc::new(embeddings))
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub fn store_path(&self) -> &Path {
        &self.config.store_path
    }

    /// Chunk, embed and store `texts`. Creates the store on first write.
    ///
    /// Every chunk must end up with a `filename`. All chunks are embedded
    /// before the store is touched, so an embedding failure writes nothing.
    #[instrument(skip(self, texts, metadatas), fields(texts = texts.len()))]
    pub async fn ingest(&self, texts: &[String], metadatas: Option<&[Metadata]>) -> Result<usize> {
        if metadatas.is_none() && !texts.is_empty() {
            return Err(RagError::Validation(
                "ingest requires metadata carrying a filename".to_string(),
            ));
        }

        let chunks = self.chunker.split(texts, metadatas)?;
        if chunks.is_empty() {
            debug!("Nothing to ingest");
            return Ok(0);
        }
        if chunks.iter().any(|c| c.filename().map_or(true, str::is_empty)) {
            return Err(RagError::Validation(format!(
                "every metadata record needs a non-empty '{}'",
                FILENAME_KEY
            )));
        }

        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed_many(&chunk_texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        let store = VectorStore::open_or_create(&self.config.store_path, &self.store_options).await?;
        let result = store.add(records).await;
        store.close().await;

        let stored = result?;
        info!("Ingested {} texts as {} chunks", texts.len(), stored);
        Ok(stored)
    }

    /// Texts of the `top_k` chunks most similar to `text`.
    /// Empty when nothing has been ingested yet.
    #[instrument(skip(self, text))]
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<String>> {
        let hits = self.search(text, top_k).await?;
        Ok(hits.into_iter().map(|hit| hit.text).collect())
    }

    /// Like `query` but keeps scores and metadata.
    pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(store) = VectorStore::open(&self.config.store_path, &self.store_options).await? else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            store.close().await;
            return Ok(Vec::new());
        }

        let query_vector = match self.embeddings.embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        };

        let result = store.search(&query_vector, top_k).await;
        store.close().await;

        let hits = result?;
        debug!("Query matched {} chunks", hits.len());
        Ok(hits)
    }

    /// Delete every chunk tagged with `filename`. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn remove_source(&self, filename: &str) -> Result<u64> {
        let Some(store) = VectorStore::open(&self.config.store_path, &self.store_options).await? else {
            return Ok(0);
        };

        let result = store.delete(&MetadataFilter::filename(filename)).await;
        store.close().await;

        let removed = result?;
        if removed == 0 {
            warn!("No chunks found for source '{}'", filename);
        } else {
            info!("Removed source '{}' ({} chunks)", filename, removed);
        }
        Ok(removed)
    }

    /// Distinct filenames currently stored.
    pub async fn list_sources(&self) -> Result<BTreeSet<String>> {
        let Some(store) = VectorStore::open(&self.config.store_path, &self.store_options).await? else {
            return Ok(BTreeSet::new());
        };

        let result = store.list_distinct(FILENAME_KEY).await;
        store.close().await;
        result
    }

    pub async fn stats(&self) -> Result<KnowledgeStats> {
        let Some(store) = VectorStore::open(&self.config.store_path, &self.store_options).await? else {
            return Ok(KnowledgeStats::default());
        };

        let result = read_stats(&store).await;
        store.close().await;
        result
    }
}

async fn read_stats(store: &VectorStore) -> Result<KnowledgeStats> {
    Ok(KnowledgeStats {
        exists: true,
        chunk_count: store.count().await?,
        source_count: store.list_distinct(FILENAME_KEY).await?.len(),
        dimension: store.dimension().await?,
    })
}
