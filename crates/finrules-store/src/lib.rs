//! Finrules Storage Layer
//!
//! Implements the `VectorStore` trait using SQLite + an HNSW vector index.
//!
//! # Architecture
//!
//! - SQLite holds every chunk (text, offsets, metadata, optional embedding)
//! - HNSW answers unscoped similarity queries; it is rebuilt from SQLite on
//!   open and whenever stale nodes dominate
//! - Queries run a strategy chain: vector similarity, then keyword scoring.
//!   Keyword scoring needs no embedding backend, so a store opened without
//!   one still answers every query.
//!
//! # Examples
//!
//! ```
//! use finrules_store::{SqliteVectorStore, StoreConfig};
//! use finrules_domain::traits::VectorStore;
//! use finrules_domain::Chunk;
//!
//! let mut store = SqliteVectorStore::open(StoreConfig::in_memory(), None).unwrap();
//! store.upsert(&[Chunk::new("doc_1", 0, "يجب إرفاق الفاتورة الأصلية.", 0, 27)]).unwrap();
//!
//! let hits = store.query("الفاتورة", 5).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![warn(missing_docs)]

pub mod embedding;
pub mod search;
pub mod vector_index;

use finrules_domain::traits::{EmbeddingError, EmbeddingModel, IndexReport, VectorStore};
use finrules_domain::{unix_timestamp, Chunk, RetrievedChunk};
use rusqlite::{params, Connection, OptionalExtension, Row};
use search::{SearchContext, SearchStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};
use vector_index::{VectorIndex, VectorIndexError};

pub use embedding::HashEmbeddingModel;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Embedding backend error
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index error
    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Invalid store configuration
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,

    /// Embedding dimension; must match the embedding backend
    pub dimension: usize,

    /// Keyword hits scoring below this are dropped
    pub min_score: f64,

    /// HNSW search candidate list size
    pub ef_search: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("finrules.db"),
            dimension: embedding::DEFAULT_DIMENSION,
            min_score: 0.1,
            ef_search: 64,
        }
    }
}

impl StoreConfig {
    /// In-memory store with default settings
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    /// Store at `path` with default settings
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the embedding dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.dimension == 0 {
            return Err(StoreError::InvalidConfig("dimension must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(StoreError::InvalidConfig(format!(
                "min_score must be in [0, 1], got {}",
                self.min_score
            )));
        }
        if self.ef_search == 0 {
            return Err(StoreError::InvalidConfig("ef_search must be > 0".to_string()));
        }
        Ok(())
    }
}

const CHUNK_COLUMNS: &str =
    "id, document_id, chunk_index, text, start_offset, end_offset, metadata";

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let metadata_json: String = row.get(6)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        index: row.get::<_, i64>(2)? as usize,
        text: row.get(3)?,
        start_offset: row.get::<_, i64>(4)? as usize,
        end_offset: row.get::<_, i64>(5)? as usize,
        metadata,
    })
}

/// Load one chunk by id
pub(crate) fn load_chunk(conn: &Connection, id: &str) -> Result<Option<Chunk>, StoreError> {
    let sql = format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_chunk).optional()?)
}

/// Load every chunk, or one document's, in document then chunk order
pub(crate) fn load_chunks(
    conn: &Connection,
    document_id: Option<&str>,
) -> Result<Vec<Chunk>, StoreError> {
    let chunks = match document_id {
        Some(doc) => {
            let sql = format!(
                "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
                CHUNK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![doc], row_to_chunk)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM chunks ORDER BY document_id, chunk_index",
                CHUNK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_chunk)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(chunks)
}

/// Chunks stored without an embedding, optionally within one document
pub(crate) fn load_unembedded_chunks(
    conn: &Connection,
    document_id: Option<&str>,
) -> Result<Vec<Chunk>, StoreError> {
    let sql = format!(
        "SELECT {} FROM chunks WHERE embedding IS NULL AND (?1 IS NULL OR document_id = ?1)
         ORDER BY document_id, chunk_index",
        CHUNK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id], row_to_chunk)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Stale HNSW nodes tolerated before the index is rebuilt
pub const COMPACT_MIN_STALE: usize = 64;

/// SQLite-backed chunk store with HNSW similarity search
///
/// # Thread Safety
///
/// SQLite connections are not `Sync`; share the store behind a mutex.
pub struct SqliteVectorStore {
    conn: Connection,
    config: StoreConfig,
    embedder: Option<Box<dyn EmbeddingModel>>,
    index: VectorIndex,
    strategies: Vec<Box<dyn SearchStrategy>>,
}

impl SqliteVectorStore {
    /// Open (or create) the store described by `config`
    ///
    /// `embedder` is optional; without it, queries use keyword scoring.
    pub fn open(
        config: StoreConfig,
        embedder: Option<Box<dyn EmbeddingModel>>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        if let Some(model) = &embedder {
            if model.dimension() != config.dimension {
                return Err(StoreError::InvalidConfig(format!(
                    "embedder dimension {} does not match store dimension {}",
                    model.dimension(),
                    config.dimension
                )));
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(include_str!("schema.sql"))?;

        let mut store = Self {
            index: VectorIndex::new(config.dimension),
            conn,
            config,
            embedder,
            strategies: search::default_chain(),
        };
        store.rebuild_index()?;

        info!(
            "Opened chunk store at {} ({} chunks, {} embedded)",
            store.config.path.display(),
            store.count()?,
            store.index.len()
        );
        Ok(store)
    }

    /// Replace the search strategy chain
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn SearchStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Store settings
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether queries can use vector similarity
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Number of chunks with a live vector
    pub fn embedded_count(&self) -> usize {
        self.index.len()
    }

    /// Fetch a chunk by id
    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        load_chunk(&self.conn, id)
    }

    /// All chunks of a document, in order
    pub fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>, StoreError> {
        load_chunks(&self.conn, Some(document_id))
    }

    /// Replaced or removed vectors still held by the HNSW graph
    pub fn stale_vectors(&self) -> usize {
        self.index.stale_count()
    }

    /// Rebuild the HNSW index once stale nodes outnumber live ones
    fn compact_index(&mut self) -> Result<(), StoreError> {
        let stale = self.index.stale_count();
        if stale >= COMPACT_MIN_STALE && stale > self.index.len() {
            debug!("Compacting vector index: {} stale, {} live", stale, self.index.len());
            self.rebuild_index()?;
        }
        Ok(())
    }

    /// Reload the HNSW index from stored embeddings
    fn rebuild_index(&mut self) -> Result<(), StoreError> {
        self.index.clear();

        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM chunks WHERE embedding IS NOT NULL")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut skipped = 0usize;
        for row in rows {
            let (id, blob) = row?;
            match embedding::from_blob(&blob) {
                Some(vector) if vector.len() == self.config.dimension => {
                    self.index.add(&id, &vector)?;
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} stored embedding(s) not matching dimension {}",
                skipped, self.config.dimension
            );
        }
        Ok(())
    }

    /// Embed every chunk, stopping at the first backend failure
    fn embed_all(&self, chunks: &[Chunk]) -> Vec<Option<Vec<f32>>> {
        let Some(model) = &self.embedder else {
            return vec![None; chunks.len()];
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut failed = false;
        for chunk in chunks {
            if failed {
                vectors.push(None);
                continue;
            }
            match model.embed(&chunk.text) {
                Ok(vector) => vectors.push(Some(vector)),
                Err(EmbeddingError::InvalidInput(_)) => vectors.push(None),
                Err(e) => {
                    warn!(
                        "Embedding failed for chunk {}, storing remaining chunks without vectors: {}",
                        chunk.id, e
                    );
                    failed = true;
                    vectors.push(None);
                }
            }
        }
        vectors
    }

    /// Write `chunks` in one transaction, first dropping every chunk of
    /// `replacing` when set
    fn write(&mut self, replacing: Option<&str>, chunks: &[Chunk]) -> Result<IndexReport, StoreError> {
        if chunks.is_empty() && replacing.is_none() {
            return Ok(IndexReport::default());
        }

        let vectors = self.embed_all(chunks);
        let now = unix_timestamp() as i64;

        // A failure rolls back the whole batch, removal included, and leaves
        // previously indexed chunks untouched
        let tx = self.conn.transaction()?;
        let replaced: Vec<String> = match replacing {
            Some(document_id) => {
                let ids = {
                    let mut stmt = tx.prepare("SELECT id FROM chunks WHERE document_id = ?1")?;
                    let rows = stmt.query_map(params![document_id], |row| row.get(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])?;
                ids
            }
            None => Vec::new(),
        };
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, chunk_index, text, start_offset, end_offset, metadata, embedding, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at",
            )?;

            for (chunk, vector) in chunks.iter().zip(&vectors) {
                let metadata = serde_json::to_string(&chunk.metadata)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                stmt.execute(params![
                    &chunk.id,
                    &chunk.document_id,
                    chunk.index as i64,
                    &chunk.text,
                    chunk.start_offset as i64,
                    chunk.end_offset as i64,
                    metadata,
                    vector.as_deref().map(embedding::to_blob),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        for id in &replaced {
            self.index.remove(id);
        }
        let mut embedded = 0;
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            match vector {
                Some(v) => {
                    self.index.add(&chunk.id, v)?;
                    embedded += 1;
                }
                None => {
                    self.index.remove(&chunk.id);
                }
            }
        }
        self.compact_index()?;

        debug!(
            "Wrote {} chunk(s), {} with embeddings, {} replaced",
            chunks.len(),
            embedded,
            replaced.len()
        );
        Ok(IndexReport {
            indexed: chunks.len(),
            embedded,
        })
    }
}

impl VectorStore for SqliteVectorStore {
    type Error = StoreError;

    fn upsert(&mut self, chunks: &[Chunk]) -> Result<IndexReport, Self::Error> {
        self.write(None, chunks)
    }

    fn replace_document(&mut self, document_id: &str, chunks: &[Chunk]) -> Result<IndexReport, Self::Error> {
        self.write(Some(document_id), chunks)
    }

    fn query_scoped(
        &self,
        text: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, Self::Error> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let ctx = SearchContext {
            conn: &self.conn,
            index: &self.index,
            embedder: self.embedder.as_deref(),
            config: &self.config,
        };
        search::run_chain(&self.strategies, &ctx, text, top_k, document_id)
    }

    fn remove_document(&mut self, document_id: &str) -> Result<usize, Self::Error> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT id FROM chunks WHERE document_id = ?1")?;
            let rows = stmt.query_map(params![document_id], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let removed = self
            .conn
            .execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])?;
        for id in &ids {
            self.index.remove(id);
        }
        self.compact_index()?;

        debug!("Removed {} chunk(s) of document {}", removed, document_id);
        Ok(removed)
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, index: usize, text: &str) -> Chunk {
        Chunk::new(doc, index, text, 0, text.chars().count()).with_metadata("document_name", doc)
    }

    #[test]
    fn test_store_initialization() {
        let store = SqliteVectorStore::open(StoreConfig::in_memory(), None).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.has_embedder());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = SqliteVectorStore::open(
            StoreConfig::in_memory().with_dimension(64),
            Some(Box::new(HashEmbeddingModel::new(32))),
        );
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_validation() {
        let mut config = StoreConfig::in_memory();
        config.min_score = 1.5;
        assert!(config.validate().is_err());
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_upsert_roundtrip_preserves_metadata() {
        let mut store = SqliteVectorStore::open(StoreConfig::in_memory(), None).unwrap();
        let report = store.upsert(&[chunk("doc_a", 0, "نص أول")]).unwrap();
        assert_eq!(report, IndexReport { indexed: 1, embedded: 0 });

        let stored = store.get_chunk("doc_a_0").unwrap().unwrap();
        assert_eq!(stored.text, "نص أول");
        assert_eq!(stored.metadata.get("document_name").map(String::as_str), Some("doc_a"));
    }

    #[test]
    fn test_vector_query_with_hash_embeddings() {
        let mut store = SqliteVectorStore::open(
            StoreConfig::in_memory(),
            Some(Box::new(HashEmbeddingModel::default())),
        )
        .unwrap();

        store
            .upsert(&[
                chunk("doc_a", 0, "يجب ألا تتجاوز الحسميات ثلث الراتب"),
                chunk("doc_a", 1, "فواتير الكهرباء والمياه تصرف شهريا"),
            ])
            .unwrap();
        assert_eq!(store.embedded_count(), 2);

        let hits = store.query("الحسميات ثلث الراتب", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "doc_a_0");
        assert_eq!(hits[0].retrieval_method, finrules_domain::RetrievalMethod::Vector);
        assert!(hits[0].relevance_score > 0.5);
    }

    #[test]
    fn test_remove_document() {
        let mut store = SqliteVectorStore::open(StoreConfig::in_memory(), None).unwrap();
        store
            .upsert(&[chunk("doc_a", 0, "a"), chunk("doc_a", 1, "b"), chunk("doc_b", 0, "c")])
            .unwrap();

        assert_eq!(store.remove_document("doc_a").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.document_chunks("doc_a").unwrap().is_empty());
    }
}
