//! The document pipeline
//!
//! `parse → chunk → index → retrieve → extract → map → analyze`, one
//! document at a time. Only a parse failure ends a run early; every later
//! stage degrades instead of failing (no index means whole-document
//! extraction, no model means pattern extraction and keyword mapping).

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::parser::TextParser;
use crate::report::{BatchFailure, BatchReport, ComprehensiveReport};
use finrules_analyzer::{CoverageAnalyzer, GapAnalyzer};
use finrules_domain::traits::{DocumentParser, LlmProvider, VectorStore};
use finrules_domain::{
    Chunk, Document, DocumentDescriptor, DocumentStatus, ExtractionResult, ExtractionStatistics, PipelineStage,
    TrackCatalog,
};
use finrules_extractor::{Chunker, Extractor, Retriever, Segment, TrackMapper};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Document-to-gaps orchestrator
///
/// The store is shared across documents and guarded by a mutex; every store
/// call runs on the blocking pool.
pub struct Pipeline<L, S> {
    store: Arc<Mutex<S>>,
    parser: Arc<dyn DocumentParser + Send + Sync>,
    catalog: Arc<TrackCatalog>,
    config: PipelineConfig,
    chunker: Chunker,
    retriever: Retriever,
    extractor: Extractor<L>,
    mapper: TrackMapper<L>,
    gap_analyzer: GapAnalyzer,
    coverage_analyzer: CoverageAnalyzer,
}

impl<L, S> Pipeline<L, S>
where
    L: LlmProvider + Send + Sync + 'static,
    S: VectorStore + Send + 'static,
{
    /// Build a pipeline; invalid configuration is rejected here
    pub fn new(llm: L, store: S, catalog: TrackCatalog, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let llm = Arc::new(llm);
        let catalog = Arc::new(catalog);
        let extraction = config.extraction.clone();

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            parser: Arc::new(TextParser::new()?),
            chunker: Chunker::new(extraction.chunk_size, extraction.chunk_overlap),
            retriever: Retriever::new(extraction.retrieval_top_k),
            extractor: Extractor::new(Arc::clone(&llm), Arc::clone(&catalog), extraction.clone())?,
            mapper: TrackMapper::new(llm, Arc::clone(&catalog), extraction),
            gap_analyzer: GapAnalyzer::new(Arc::clone(&catalog)),
            coverage_analyzer: CoverageAnalyzer::new(Arc::clone(&catalog)),
            catalog,
            config,
        })
    }

    /// Replace the document parser
    pub fn with_parser(mut self, parser: impl DocumentParser + Send + Sync + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Track catalog
    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    /// Shared handle to the store
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Run `f` against the locked store on the blocking pool
    async fn with_store<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<T, PipelineError> {
            let mut guard = store.lock().map_err(|_| PipelineError::LockPoisoned)?;
            Ok(f(&mut *guard))
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// Process one document
    ///
    /// A parse failure yields an empty result with `error` set. `Err` is
    /// returned only for systemic faults.
    pub async fn process_document(&self, descriptor: &DocumentDescriptor) -> Result<ExtractionResult, PipelineError> {
        let started = Instant::now();
        let mut document = Document::from_descriptor(descriptor);
        info!("Processing document '{}' ({})", document.name, document.id);

        enter(&document, PipelineStage::Parsing);
        document.status = DocumentStatus::Processing;
        let parser = Arc::clone(&self.parser);
        let to_parse = document.clone();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&to_parse))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;

        match parsed {
            Ok(text) => {
                document.raw_content = text;
                document.status = DocumentStatus::Indexed;
            }
            Err(e) => {
                document.status = DocumentStatus::Failed;
                warn!("Failed to parse '{}': {}", document.name, e);
                return Ok(ExtractionResult::failed(
                    document.id.as_str(),
                    &document.name,
                    e.to_string(),
                    started.elapsed().as_secs_f64(),
                ));
            }
        }

        enter(&document, PipelineStage::Indexing);
        let chunks: Vec<Chunk> = self
            .chunker
            .chunk_document(document.id.as_str(), &document.raw_content)
            .into_iter()
            .map(|chunk| {
                chunk
                    .with_metadata("document_name", &document.name)
                    .with_metadata("document_type", document.document_type.to_string())
            })
            .collect();
        debug!("Split '{}' into {} chunk(s)", document.name, chunks.len());

        let num_chunks_indexed = if self.config.use_rag { self.index(&document, &chunks).await? } else { 0 };

        let mut chunks_retrieved = 0;
        let mut segments: Vec<Segment> = Vec::new();
        if num_chunks_indexed > 0 {
            let retriever = self.retriever;
            let queries = self.catalog.all_queries();
            let document_id = document.id.to_string();
            let retrieval = self
                .with_store(move |store| retriever.retrieve_for_tracks(&*store, &queries, Some(document_id.as_str())))
                .await?;

            if retrieval.is_empty() {
                warn!("Retrieval found nothing in '{}', extracting from the whole document", document.name);
            } else {
                chunks_retrieved = retrieval.chunks.len();
                segments = retrieval.chunks.into_iter().map(Segment::from).collect();
            }
        }

        let rag_enabled = chunks_retrieved > 0;
        if !rag_enabled {
            segments = chunks.into_iter().map(Segment::from).collect();
        }

        enter(&document, PipelineStage::Extracting);
        let outcome = self.extractor.extract(&document, &segments).await;

        enter(&document, PipelineStage::Mapping);
        let rules = self.mapper.map(outcome.rules).await;

        enter(&document, PipelineStage::Analyzing);
        let gaps = self.gap_analyzer.analyze(&rules);

        let statistics = ExtractionStatistics {
            rag_enabled,
            num_chunks_indexed,
            chunks_retrieved,
            llm_batches: outcome.llm_batches,
            fallback_batches: outcome.fallback_batches,
            truncated_batches: outcome.truncated_batches,
            stage: PipelineStage::Done,
            ..ExtractionStatistics::tally(&rules, &gaps)
        };
        let processing_time_seconds = started.elapsed().as_secs_f64();

        info!(
            "Finished '{}' in {:.2}s: {} rule(s), {} gap(s), retrieval {}",
            document.name,
            processing_time_seconds,
            rules.len(),
            gaps.len(),
            if rag_enabled { "on" } else { "off" }
        );

        Ok(ExtractionResult {
            document_id: document.id.to_string(),
            document_name: document.name,
            extracted_rules: rules,
            gaps,
            statistics,
            processing_time_seconds,
            error: None,
            created_at: finrules_domain::unix_timestamp(),
        })
    }

    /// Best-effort indexing; returns how many chunks were written
    ///
    /// The document's previous chunks are replaced, not merged.
    async fn index(&self, document: &Document, chunks: &[Chunk]) -> Result<usize, PipelineError> {
        let to_index = chunks.to_vec();
        let document_id = document.id.to_string();
        let outcome = self
            .with_store(move |store| {
                store
                    .replace_document(&document_id, &to_index)
                    .map_err(|e| e.to_string())
            })
            .await?;

        match outcome {
            Ok(report) => {
                info!(
                    "Indexed {} chunk(s) of '{}' ({} embedded)",
                    report.indexed, document.name, report.embedded
                );
                Ok(report.indexed)
            }
            Err(e) => {
                warn!("Indexing '{}' failed, continuing without retrieval: {}", document.name, e);
                Ok(0)
            }
        }
    }

    /// Process documents one after another
    ///
    /// A failing document is recorded and the batch moves on.
    pub async fn process_batch(&self, descriptors: &[DocumentDescriptor]) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, descriptor) in descriptors.iter().enumerate() {
            info!("Batch document {}/{}: '{}'", i + 1, descriptors.len(), descriptor.name);
            match self.process_document(descriptor).await {
                Ok(result) => match &result.error {
                    Some(e) => report.failures.push(BatchFailure {
                        name: descriptor.name.clone(),
                        error: e.clone(),
                    }),
                    None => report.results.push(result),
                },
                Err(e) => {
                    error!("Document '{}' aborted: {}", descriptor.name, e);
                    report.failures.push(BatchFailure {
                        name: descriptor.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.results.len(),
            report.failures.len()
        );
        report
    }

    /// Aggregate report over `results`
    pub fn generate_comprehensive_report(&self, results: &[ExtractionResult]) -> ComprehensiveReport {
        ComprehensiveReport::build(results, &self.gap_analyzer, &self.coverage_analyzer)
    }
}

fn enter(document: &Document, stage: PipelineStage) {
    debug!("'{}' entering {}", document.name, stage);
}
