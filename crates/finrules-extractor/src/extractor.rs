//! Core Extractor implementation

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::parser::{parse_extraction_response, RawRule};
use crate::patterns::PatternExtractor;
use crate::prompt::PromptBuilder;
use finrules_domain::traits::LlmProvider;
use finrules_domain::{CandidateRule, Chunk, Document, ExtractionMethod, RetrievedChunk, SourceReference, TrackCatalog};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Weight of the model's own confidence in retrieval mode
pub const MODEL_CONFIDENCE_WEIGHT: f64 = 0.7;

/// Weight of the batch's average retrieval score in retrieval mode
pub const RETRIEVAL_SCORE_WEIGHT: f64 = 0.3;

/// Pattern-rule confidence as a fraction of the chunk's retrieval score
pub const PATTERN_SCORE_FACTOR: f64 = 0.5;

/// Pattern-rule confidence when no retrieval score is known
pub const PATTERN_BASE_CONFIDENCE: f64 = 0.3;

/// A text unit handed to the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Source chunk id
    pub chunk_id: String,
    /// Chunk text
    pub text: String,
    /// Relevance score when the chunk came from retrieval
    pub retrieval_score: Option<f64>,
}

impl From<RetrievedChunk> for Segment {
    fn from(hit: RetrievedChunk) -> Self {
        Self {
            chunk_id: hit.chunk.id,
            text: hit.chunk.text,
            retrieval_score: Some(hit.relevance_score),
        }
    }
}

impl From<Chunk> for Segment {
    fn from(chunk: Chunk) -> Self {
        Self {
            chunk_id: chunk.id,
            text: chunk.text,
            retrieval_score: None,
        }
    }
}

/// Rules found in a document plus per-run counters
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Unique candidate rules, in order of discovery
    pub rules: Vec<CandidateRule>,
    /// Batches answered by the model
    pub llm_batches: usize,
    /// Batches handled by pattern extraction
    pub fallback_batches: usize,
    /// Batches cut to the context limit
    pub truncated_batches: usize,
    /// Rules dropped as duplicates
    pub duplicates_removed: usize,
}

/// Main extractor that turns text batches into candidate rules
pub struct Extractor<L> {
    llm: Arc<L>,
    catalog: Arc<TrackCatalog>,
    config: ExtractorConfig,
    patterns: PatternExtractor,
}

impl<L> Extractor<L>
where
    L: LlmProvider + Send + Sync + 'static,
{
    /// Create a new extractor
    pub fn new(llm: Arc<L>, catalog: Arc<TrackCatalog>, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        Ok(Self {
            llm,
            catalog,
            config,
            patterns: PatternExtractor::new()?,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract rules from `segments` of `document`
    ///
    /// Segments are sent to the model `batch_size` at a time. A batch whose
    /// call fails or whose answer cannot be parsed falls back to pattern
    /// extraction; nothing here fails the whole run.
    pub async fn extract(&self, document: &Document, segments: &[Segment]) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        let batch_count = segments.len().div_ceil(self.config.batch_size);

        info!(
            "Extracting rules from {} segment(s) of '{}' in {} batch(es)",
            segments.len(),
            document.name,
            batch_count
        );

        let mut candidates = Vec::new();
        for (batch_index, batch) in segments.chunks(self.config.batch_size).enumerate() {
            let offset = batch_index * self.config.batch_size;
            let rules = self.extract_batch(document, batch_index, offset, batch, &mut outcome).await;
            debug!("Batch {} produced {} rule(s)", batch_index, rules.len());
            candidates.extend(rules);
        }

        let mut seen = HashSet::new();
        for rule in candidates {
            let key = rule.normalized_text();
            if key.is_empty() || !seen.insert(key) {
                outcome.duplicates_removed += 1;
                continue;
            }
            outcome.rules.push(rule);
        }

        info!(
            "Extracted {} unique rule(s): {} model batch(es), {} fallback batch(es), {} duplicate(s) removed",
            outcome.rules.len(),
            outcome.llm_batches,
            outcome.fallback_batches,
            outcome.duplicates_removed
        );
        outcome
    }

    async fn extract_batch(
        &self,
        document: &Document,
        batch_index: usize,
        offset: usize,
        batch: &[Segment],
        outcome: &mut ExtractionOutcome,
    ) -> Vec<CandidateRule> {
        if !self.llm.is_available() {
            debug!("No model available, using patterns for batch {}", batch_index);
            outcome.fallback_batches += 1;
            return self.extract_patterns(document, batch_index, batch);
        }

        let (text, dropped) = self.batch_text(offset, batch);
        if dropped > 0 {
            warn!(
                "Batch {} exceeds the {}-character context limit; {} character(s) dropped",
                batch_index, self.config.max_context_chars, dropped
            );
            outcome.truncated_batches += 1;
        }

        let prompt = PromptBuilder::new(&self.catalog).extraction(&text);
        let parsed = call_llm(
            &self.llm,
            prompt,
            self.config.extraction_max_tokens,
            self.config.llm_timeout(),
        )
        .await
        .and_then(|response| parse_extraction_response(&response));

        match parsed {
            Ok(raw_rules) => {
                outcome.llm_batches += 1;
                let source = source_reference(document, batch_index, batch);
                let average_score = average_retrieval_score(batch);
                raw_rules
                    .into_iter()
                    .map(|raw| self.candidate_from_raw(raw, source.clone(), average_score))
                    .collect()
            }
            Err(e) => {
                warn!("Model extraction failed for batch {}, using patterns: {}", batch_index, e);
                outcome.fallback_batches += 1;
                self.extract_patterns(document, batch_index, batch)
            }
        }
    }

    /// Pattern-based rules for each segment of a batch
    pub fn extract_patterns(&self, document: &Document, batch_index: usize, batch: &[Segment]) -> Vec<CandidateRule> {
        batch
            .iter()
            .flat_map(|segment| {
                let confidence = segment
                    .retrieval_score
                    .map_or(PATTERN_BASE_CONFIDENCE, |score| score * PATTERN_SCORE_FACTOR);
                let source = SourceReference {
                    document_id: document.id.to_string(),
                    document_name: document.name.clone(),
                    chunk_ids: vec![segment.chunk_id.clone()],
                    batch_index,
                };
                self.patterns
                    .extract(&segment.text)
                    .into_iter()
                    .map(move |text| CandidateRule::new(text, confidence, ExtractionMethod::Pattern, source.clone()))
            })
            .collect()
    }

    fn candidate_from_raw(&self, raw: RawRule, source: SourceReference, average_score: Option<f64>) -> CandidateRule {
        let model_confidence = raw.confidence.clamp(0.0, 1.0);
        let confidence = match average_score {
            Some(score) => MODEL_CONFIDENCE_WEIGHT * model_confidence + RETRIEVAL_SCORE_WEIGHT * score,
            None => model_confidence,
        };
        let track_hint = raw.track.filter(|t| self.catalog.contains(t));
        let notes = raw.notes.filter(|n| !n.trim().is_empty());

        CandidateRule::new(raw.text.trim(), confidence, ExtractionMethod::Llm, source)
            .with_track_hint(track_hint)
            .with_notes(notes)
    }

    /// Labelled batch text, cut to the context limit, and the number of
    /// characters cut
    fn batch_text(&self, offset: usize, batch: &[Segment]) -> (String, usize) {
        let text = batch
            .iter()
            .enumerate()
            .map(|(i, segment)| format!("[segment {}]\n{}", offset + i + 1, segment.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let length = text.chars().count();
        if length <= self.config.max_context_chars {
            return (text, 0);
        }
        let truncated = text.chars().take(self.config.max_context_chars).collect();
        (truncated, length - self.config.max_context_chars)
    }
}

fn source_reference(document: &Document, batch_index: usize, batch: &[Segment]) -> SourceReference {
    SourceReference {
        document_id: document.id.to_string(),
        document_name: document.name.clone(),
        chunk_ids: batch.iter().map(|s| s.chunk_id.clone()).collect(),
        batch_index,
    }
}

/// Mean retrieval score of the scored segments, if any
fn average_retrieval_score(batch: &[Segment]) -> Option<f64> {
    let scores: Vec<f64> = batch.iter().filter_map(|s| s.retrieval_score).collect();
    (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Call the LLM provider off the async runtime
///
/// `per_attempt` bounds one request; the wait covers the provider's whole
/// retry schedule so a retry that succeeds is not cut off.
pub(crate) async fn call_llm<L>(
    llm: &Arc<L>,
    prompt: String,
    max_tokens: usize,
    per_attempt: Duration,
) -> Result<String, ExtractorError>
where
    L: LlmProvider + Send + Sync + 'static,
{
    let llm = Arc::clone(llm);
    let budget = llm.call_budget(per_attempt);

    // Providers are blocking
    let task = tokio::task::spawn_blocking(move || {
        llm.generate(&prompt, max_tokens)
            .map_err(|e| ExtractorError::Llm(e.to_string()))
    });

    match timeout(budget, task).await {
        Ok(joined) => joined.map_err(|e| ExtractorError::Task(e.to_string()))?,
        Err(_) => Err(ExtractorError::Timeout(budget.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrules_domain::{DocumentDescriptor, RetrievalMethod};
    use finrules_llm::{LlmError, MockProvider, RetryPolicy, UnavailableProvider};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Retrying provider whose first request stalls and times out
    struct StallingProvider {
        attempts: AtomicU32,
        stall: Duration,
        retry: RetryPolicy,
    }

    impl LlmProvider for StallingProvider {
        type Error = LlmError;

        fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String, LlmError> {
            self.retry.run("stalling generate", |_| {
                if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::thread::sleep(self.stall);
                    Err(LlmError::Timeout("no answer".to_string()))
                } else {
                    Ok(r#"{"rules": [{"text": "يجب إرفاق العقد الموقع", "confidence": 0.9}]}"#.to_string())
                }
            })
        }

        fn call_budget(&self, per_attempt: Duration) -> Duration {
            self.retry.budget(per_attempt)
        }
    }

    fn document() -> Document {
        Document::from_descriptor(&DocumentDescriptor::inline("لائحة", "").with_id("doc_1"))
    }

    fn segment(id: &str, text: &str, score: Option<f64>) -> Segment {
        Segment {
            chunk_id: id.to_string(),
            text: text.to_string(),
            retrieval_score: score,
        }
    }

    fn extractor<L: LlmProvider + Send + Sync + 'static>(llm: L, config: ExtractorConfig) -> Extractor<L> {
        Extractor::new(Arc::new(llm), Arc::new(TrackCatalog::reference()), config).unwrap()
    }

    const RULE: &str = "يجب التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي.";

    #[tokio::test]
    async fn test_batches_bound_model_calls() {
        let llm = MockProvider::new(r#"{"rules": []}"#);
        let extractor = extractor(llm.clone(), ExtractorConfig::default());
        let segments: Vec<Segment> = (0..12).map(|i| segment(&format!("doc_1_{}", i), "نص", None)).collect();

        let outcome = extractor.extract(&document(), &segments).await;

        // ceil(12 / 5)
        assert_eq!(llm.call_count(), 3);
        assert_eq!(outcome.llm_batches, 3);
        assert_eq!(outcome.fallback_batches, 0);
    }

    #[tokio::test]
    async fn test_segments_labelled_in_prompt() {
        let llm = MockProvider::new(r#"{"rules": []}"#);
        let extractor = extractor(llm.clone(), ExtractorConfig::default());
        let segments = vec![segment("a", "الأول", None), segment("b", "الثاني", None)];

        extractor.extract(&document(), &segments).await;

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("[segment 1]\nالأول"));
        assert!(prompt.contains("[segment 2]\nالثاني"));
    }

    #[tokio::test]
    async fn test_model_rules_blend_retrieval_score() {
        let llm = MockProvider::new(
            r#"{"rules": [{"text": "يجب إرفاق العقد الموقع", "track": "contracts", "confidence": 0.9}]}"#,
        );
        let extractor = extractor(llm, ExtractorConfig::default());
        let segments = vec![segment("a", "x", Some(0.6)), segment("b", "y", Some(0.4))];

        let outcome = extractor.extract(&document(), &segments).await;

        let rule = &outcome.rules[0];
        // 0.7 * 0.9 + 0.3 * 0.5
        assert!((rule.extraction_confidence - 0.78).abs() < 1e-9);
        assert_eq!(rule.track_hint.as_deref(), Some("contracts"));
        assert_eq!(rule.extraction_method, ExtractionMethod::Llm);
        assert_eq!(rule.source_reference.chunk_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_legacy_mode_keeps_model_confidence() {
        let llm = MockProvider::new(r#"{"rules": [{"text": "قاعدة", "track": "unknown", "confidence": 0.8}]}"#);
        let outcome = extractor(llm, ExtractorConfig::default())
            .extract(&document(), &[segment("doc_1_full", "x", None)])
            .await;

        assert_eq!(outcome.rules[0].extraction_confidence, 0.8);
        assert_eq!(outcome.rules[0].track_hint, None, "unknown tracks are not hints");
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back_to_patterns() {
        let llm = MockProvider::new("لا أستطيع المساعدة");
        let outcome = extractor(llm, ExtractorConfig::default())
            .extract(&document(), &[segment("doc_1_0", RULE, Some(0.8))])
            .await;

        assert_eq!(outcome.fallback_batches, 1);
        assert_eq!(outcome.rules.len(), 1);
        let rule = &outcome.rules[0];
        assert_eq!(rule.text, RULE);
        assert_eq!(rule.extraction_method, ExtractionMethod::Pattern);
        assert!((rule.extraction_confidence - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unavailable_model_uses_patterns_without_calls() {
        let outcome = extractor(UnavailableProvider, ExtractorConfig::default())
            .extract(&document(), &[segment("doc_1_full", RULE, None)])
            .await;

        assert_eq!(outcome.rules.len(), 1);
        assert_eq!(outcome.rules[0].extraction_confidence, PATTERN_BASE_CONFIDENCE);
        assert_eq!(outcome.llm_batches, 0);
    }

    #[tokio::test]
    async fn test_failing_model_falls_back_per_batch() {
        let llm = MockProvider::new(r#"{"rules": []}"#);
        llm.push_error();
        let mut config = ExtractorConfig::default();
        config.batch_size = 1;
        let segments = vec![segment("a", RULE, None), segment("b", "لا قواعد هنا", None)];

        let outcome = extractor(llm, config).extract(&document(), &segments).await;

        assert_eq!(outcome.fallback_batches, 1);
        assert_eq!(outcome.llm_batches, 1);
        assert_eq!(outcome.rules.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_collapsed_across_batches() {
        let llm = MockProvider::new(r#"{"rules": [{"text": "يجب إرفاق العقد.", "confidence": 0.9}]}"#);
        let mut config = ExtractorConfig::default();
        config.batch_size = 1;
        let segments = vec![segment("a", "x", None), segment("b", "y", None)];

        let outcome = extractor(llm, config).extract(&document(), &segments).await;

        assert_eq!(outcome.rules.len(), 1);
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(outcome.rules[0].source_reference.batch_index, 0);
    }

    #[tokio::test]
    async fn test_truncation_is_counted() {
        let llm = MockProvider::new(r#"{"rules": []}"#);
        let mut config = ExtractorConfig::default();
        config.max_context_chars = 50;
        let long = "ن".repeat(200);

        let outcome = extractor(llm.clone(), config).extract(&document(), &[segment("a", &long, None)]).await;

        assert_eq!(outcome.truncated_batches, 1);
        assert!(!llm.prompts()[0].contains(&long));
    }

    #[tokio::test]
    async fn test_retry_after_timed_out_attempt_is_kept() {
        let llm = Arc::new(StallingProvider {
            attempts: AtomicU32::new(0),
            stall: Duration::from_secs(1),
            retry: RetryPolicy::default().with_base_delay(Duration::from_millis(10)),
        });
        let mut config = ExtractorConfig::default();
        config.llm_timeout_secs = 1;
        let extractor = Extractor::new(Arc::clone(&llm), Arc::new(TrackCatalog::reference()), config).unwrap();

        let outcome = extractor.extract(&document(), &[segment("doc_1_0", "نص", None)]).await;

        assert_eq!(llm.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.llm_batches, 1);
        assert_eq!(outcome.fallback_batches, 0);
        assert_eq!(outcome.rules.len(), 1);
        assert_eq!(outcome.rules[0].text, "يجب إرفاق العقد الموقع");
    }

    #[test]
    fn test_segment_from_retrieved_chunk() {
        let hit = RetrievedChunk::new(Chunk::new("d", 3, "نص", 0, 2), 0.7, RetrievalMethod::Keyword);
        let segment = Segment::from(hit);
        assert_eq!(segment.chunk_id, "d_3");
        assert_eq!(segment.retrieval_score, Some(0.7));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ExtractorConfig::default();
        config.batch_size = 0;
        let result = Extractor::new(
            Arc::new(MockProvider::new("")),
            Arc::new(TrackCatalog::reference()),
            config,
        );
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }
}
