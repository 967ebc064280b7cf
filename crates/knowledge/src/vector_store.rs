use crate::config::KnowledgeBaseConfig;
use ragchat_common::{Metadata, RagError, Result, FILENAME_KEY};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, SqlitePool,
};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// File name of the SQLite database inside the store directory.
pub const DATABASE_FILE: &str = "knowledge.sqlite3";

/// A chunk ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A search hit. `score` is the cosine similarity to the query, higher is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Equality predicate on one metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn filename(value: impl Into<String>) -> Self {
        Self::eq(FILENAME_KEY, value)
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub synchronous_full: bool,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            synchronous_full: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&KnowledgeBaseConfig> for StoreOptions {
    fn from(config: &KnowledgeBaseConfig) -> Self {
        Self {
            synchronous_full: config.synchronous_full,
            ..Self::default()
        }
    }
}

/// Persistent collection of (vector, text, metadata) records.
///
/// Records live in a single SQLite file. Similarity search is a linear
/// cosine scan over every stored vector.
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn database_path(dir: &Path) -> PathBuf {
        dir.join(DATABASE_FILE)
    }

    pub fn exists(dir: &Path) -> bool {
        Self::database_path(dir).is_file()
    }

    /// Open an existing store. Returns `Ok(None)` when nothing has been
    /// persisted at `dir` yet; never creates files.
    pub async fn open(dir: &Path, options: &StoreOptions) -> Result<Option<Self>> {
        if !Self::exists(dir) {
            debug!("No vector store at {}", dir.display());
            return Ok(None);
        }
        Self::connect(dir, options, false).await.map(Some)
    }

    /// Open the store at `dir`, creating an empty one if absent.
    pub async fn open_or_create(dir: &Path, options: &StoreOptions) -> Result<Self> {
        if !Self::exists(dir) {
            info!("Creating vector store at {}", dir.display());
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RagError::Store(format!("Failed to create store directory: {}", e)))?;
        }
        Self::connect(dir, options, true).await
    }

    async fn connect(dir: &Path, options: &StoreOptions, create: bool) -> Result<Self> {
        let database_path = Self::database_path(dir);

        let synchronous = if options.synchronous_full {
            SqliteSynchronous::Full
        } else {
            SqliteSynchronous::Normal
        };

        let connect_options = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(synchronous)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| RagError::Store(format!("Failed to open {}: {}", database_path.display(), e)))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::Store(format!("Failed to create chunks table: {}", e)))?;

        Ok(())
    }

    /// Append records in one transaction. Either all are stored or none.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn add(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let dimension = match self.dimension().await? {
            Some(existing) => existing,
            None => records[0].vector.len(),
        };
        for record in &records {
            validate_vector(&record.vector, dimension)?;
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RagError::Store(format!("Failed to begin transaction: {}", e)))?;

        for record in &records {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| RagError::Store(format!("Metadata serialization failed: {}", e)))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, content, metadata, embedding, dimension, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.text)
            .bind(metadata)
            .bind(encode_vector(&record.vector))
            .bind(dimension as i64)
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert chunk: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| RagError::Store(format!("Failed to commit chunks: {}", e)))?;

        info!("Stored {} chunks", records.len());
        Ok(records.len())
    }

    /// Up to `k` records ordered by descending cosine similarity.
    /// Equal scores keep insertion order.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dimension) = self.dimension().await? {
            validate_vector(query, dimension)?;
        }

        let rows = sqlx::query("SELECT content, metadata, embedding FROM chunks ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Store(format!("Failed to scan chunks: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row
                .try_get("content")
                .map_err(|e| RagError::Store(format!("Corrupt chunk row: {}", e)))?;
            let metadata: String = row
                .try_get("metadata")
                .map_err(|e| RagError::Store(format!("Corrupt chunk row: {}", e)))?;
            let embedding: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| RagError::Store(format!("Corrupt chunk row: {}", e)))?;

            let vector = decode_vector(&embedding)?;
            hits.push(ScoredChunk {
                text,
                metadata: parse_metadata(&metadata)?,
                score: cosine_similarity(query, &vector),
            });
        }

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);

        debug!("Search returned {} of k={} hits", hits.len(), k);
        Ok(hits)
    }

    /// Remove every record matching `filter`. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, filter: &MetadataFilter) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM chunks
            WHERE EXISTS (
                SELECT 1 FROM json_each(chunks.metadata) AS entry
                WHERE entry.key = ? AND entry.value = ?
            )
            "#,
        )
        .bind(&filter.key)
        .bind(&filter.value)
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::Store(format!("Failed to delete chunks: {}", e)))?;

        let removed = result.rows_affected();
        info!("Deleted {} chunks where {} = {}", removed, filter.key, filter.value);
        Ok(removed)
    }

    /// Distinct values of `key` across all records. Full scan.
    pub async fn list_distinct(&self, key: &str) -> Result<BTreeSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT entry.value AS value
            FROM chunks, json_each(chunks.metadata) AS entry
            WHERE entry.key = ? AND entry.type = 'text'
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Store(format!("Failed to list metadata values: {}", e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("value")
                    .map_err(|e| RagError::Store(format!("Non-text metadata value: {}", e)))
            })
            .collect()
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    /// Vector length shared by all records, or `None` while the store is empty.
    pub async fn dimension(&self) -> Result<Option<usize>> {
        let dimension: Option<i64> = sqlx::query_scalar("SELECT dimension FROM chunks LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RagError::Store(format!("Failed to read dimension: {}", e)))?;
        Ok(dimension.map(|d| d as usize))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::Validation("empty embedding vector".to_string()));
    }
    if vector.len() != dimension {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RagError::Validation(
            "embedding contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    serde_json::from_str(raw).map_err(|e| RagError::Store(format!("Corrupt chunk metadata: {}", e)))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(RagError::Store(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
