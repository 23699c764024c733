//! Search strategies
//!
//! A query runs through an ordered chain of strategies. The first one that
//! returns a non-empty result wins; errors and empty results hand over to the
//! next. The default chain is vector similarity, then keyword scoring, and
//! keyword scoring needs nothing but the stored text.

use crate::embedding::{cosine_similarity, from_blob};
use crate::{load_chunk, load_chunks, load_unembedded_chunks, StoreConfig, StoreError};
use crate::vector_index::VectorIndex;
use finrules_domain::traits::{EmbeddingError, EmbeddingModel};
use finrules_domain::{Chunk, RetrievalMethod, RetrievedChunk};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Weight of each term occurrence in the keyword score
pub const KEYWORD_OCCURRENCE_BONUS: f64 = 0.1;

/// Everything a strategy may read
pub struct SearchContext<'a> {
    /// Chunk table
    pub conn: &'a Connection,
    /// Vector index over embedded chunks
    pub index: &'a VectorIndex,
    /// Embedding backend, if configured
    pub embedder: Option<&'a dyn EmbeddingModel>,
    /// Store settings
    pub config: &'a StoreConfig,
}

/// One search channel
pub trait SearchStrategy: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Best `top_k` chunks for `query`, optionally within one document
    fn search(
        &self,
        ctx: &SearchContext<'_>,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;
}

/// Run `strategies` in order until one returns hits
pub fn run_chain(
    strategies: &[Box<dyn SearchStrategy>],
    ctx: &SearchContext<'_>,
    query: &str,
    top_k: usize,
    document_id: Option<&str>,
) -> Result<Vec<RetrievedChunk>, StoreError> {
    let mut last_error = None;
    let mut any_answered = false;

    for strategy in strategies {
        match strategy.search(ctx, query, top_k, document_id) {
            Ok(hits) if !hits.is_empty() => {
                debug!("{} search returned {} hit(s)", strategy.name(), hits.len());
                return Ok(hits);
            }
            Ok(_) => {
                debug!("{} search returned nothing", strategy.name());
                any_answered = true;
            }
            Err(e) => {
                warn!("{} search failed, trying next strategy: {}", strategy.name(), e);
                last_error = Some(e);
            }
        }
    }

    // Only an all-failing chain is an error; otherwise there were no hits
    match last_error {
        Some(e) if !any_answered => Err(e),
        _ => Ok(Vec::new()),
    }
}

/// Nearest neighbours by embedding distance
///
/// Score is `max(0, 1 - distance / 2)` with cosine distance in [0, 2].
/// Unscoped queries go through the HNSW index; a query scoped to one
/// document compares against that document's stored embeddings directly.
/// Chunks stored without a vector join the results by keyword score.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorSearch;

/// `(chunk_id, cosine_distance)` for the `top_k` embedded chunks of one
/// document closest to `query`
fn scan_document(
    conn: &Connection,
    document_id: &str,
    query: &[f32],
    top_k: usize,
) -> Result<Vec<(String, f32)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, embedding FROM chunks WHERE document_id = ?1 AND embedding IS NOT NULL")?;
    let rows = stmt.query_map(params![document_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut scored = Vec::new();
    for row in rows {
        let (id, blob) = row?;
        if let Some(vector) = from_blob(&blob).filter(|v| v.len() == query.len()) {
            scored.push((id, 1.0 - cosine_similarity(query, &vector)));
        }
    }
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(top_k);
    Ok(scored)
}

impl SearchStrategy for VectorSearch {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn search(
        &self,
        ctx: &SearchContext<'_>,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let embedder = ctx.embedder.ok_or(StoreError::Embedding(EmbeddingError::Unavailable))?;
        if ctx.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = embedder.embed(query)?;
        let neighbours = match document_id {
            Some(doc) => scan_document(ctx.conn, doc, &query_vector, top_k)?,
            None => ctx.index.search(&query_vector, top_k, ctx.config.ef_search)?,
        };

        let mut hits = Vec::with_capacity(neighbours.len());
        for (chunk_id, distance) in neighbours {
            let Some(chunk) = load_chunk(ctx.conn, &chunk_id)? else {
                continue;
            };
            let score = (1.0 - f64::from(distance) / 2.0).max(0.0);
            hits.push(RetrievedChunk::new(chunk, score, RetrievalMethod::Vector));
        }

        let unembedded = load_unembedded_chunks(ctx.conn, document_id)?;
        if !unembedded.is_empty() {
            let terms = query_terms(query);
            hits.extend(
                unembedded
                    .into_iter()
                    .filter_map(|chunk| keyword_hit(&terms, chunk, ctx.config.min_score)),
            );
            hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
            hits.truncate(top_k);
        }
        Ok(hits)
    }
}

/// Term-overlap scoring over stored text
///
/// `score = min(1, matched_terms / query_terms + 0.1 * occurrences)`;
/// chunks under `min_score` are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSearch;

/// Unique lowercase query terms, punctuation trimmed
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Keyword relevance of `text` for `terms`
pub fn keyword_score(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let mut matched = 0usize;
    let mut occurrences = 0usize;
    for term in terms {
        let count = text.matches(term.as_str()).count();
        if count > 0 {
            matched += 1;
            occurrences += count;
        }
    }
    let fraction = matched as f64 / terms.len() as f64;
    (fraction + KEYWORD_OCCURRENCE_BONUS * occurrences as f64).min(1.0)
}

/// Keyword hit for `chunk`, if it scores at least `min_score`
fn keyword_hit(terms: &[String], chunk: Chunk, min_score: f64) -> Option<RetrievedChunk> {
    let score = keyword_score(terms, &chunk.text);
    (score > 0.0 && score >= min_score).then(|| RetrievedChunk::new(chunk, score, RetrievalMethod::Keyword))
}

impl SearchStrategy for KeywordSearch {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn search(
        &self,
        ctx: &SearchContext<'_>,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<RetrievedChunk> = load_chunks(ctx.conn, document_id)?
            .into_iter()
            .filter_map(|chunk| keyword_hit(&terms, chunk, ctx.config.min_score))
            .collect();

        hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Vector search first, keyword scoring second
pub fn default_chain() -> Vec<Box<dyn SearchStrategy>> {
    vec![Box::new(VectorSearch), Box::new(KeywordSearch)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_terms_unique_and_trimmed() {
        let terms = query_terms("الرواتب والحسميات؟ الرواتب Salary,");
        assert_eq!(terms, vec!["الرواتب", "والحسميات", "salary"]);
    }

    #[test]
    fn test_keyword_score_formula() {
        let terms = vec!["راتب".to_string(), "بدل".to_string()];

        // one of two terms, one occurrence: 0.5 + 0.1
        assert!((keyword_score(&terms, "الراتب الأساسي") - 0.6).abs() < 1e-9);

        // both terms, three occurrences: capped at 1.0
        assert_eq!(keyword_score(&terms, "راتب بدل راتب"), 1.0);

        assert_eq!(keyword_score(&terms, "فاتورة"), 0.0);
        assert_eq!(keyword_score(&[], "anything"), 0.0);
    }
}
