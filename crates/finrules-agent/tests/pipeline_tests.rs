//! End-to-end pipeline tests

use finrules_agent::{Pipeline, PipelineConfig, PipelineError};
use finrules_domain::traits::{IndexReport, VectorStore};
use finrules_domain::{
    Chunk, DocumentDescriptor, ExtractionMethod, GapType, PipelineStage, RetrievalMethod, RetrievedChunk,
    RuleStatus, Severity, TrackCatalog,
};
use finrules_llm::{MockProvider, UnavailableProvider};
use finrules_store::{HashEmbeddingModel, SqliteVectorStore, StoreConfig};

const SALARY_RULE: &str = "يجب التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي.";
const INVOICE_RULE: &str = "يجب سداد فاتورة الكهرباء خلال ثلاثين يوما من تاريخ إصدارها.";

/// Accepts writes, never finds anything
#[derive(Default)]
struct BlindStore {
    chunks: Vec<Chunk>,
}

impl VectorStore for BlindStore {
    type Error = String;

    fn upsert(&mut self, chunks: &[Chunk]) -> Result<IndexReport, Self::Error> {
        self.chunks.extend_from_slice(chunks);
        Ok(IndexReport {
            indexed: chunks.len(),
            embedded: 0,
        })
    }

    fn query_scoped(&self, _: &str, _: usize, _: Option<&str>) -> Result<Vec<RetrievedChunk>, Self::Error> {
        Ok(Vec::new())
    }

    fn remove_document(&mut self, _: &str) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn count(&self) -> Result<usize, Self::Error> {
        Ok(self.chunks.len())
    }
}

/// Fails every call
struct BrokenStore;

impl VectorStore for BrokenStore {
    type Error = String;

    fn upsert(&mut self, _: &[Chunk]) -> Result<IndexReport, Self::Error> {
        Err("disk full".to_string())
    }

    fn query_scoped(&self, _: &str, _: usize, _: Option<&str>) -> Result<Vec<RetrievedChunk>, Self::Error> {
        Err("disk full".to_string())
    }

    fn remove_document(&mut self, _: &str) -> Result<usize, Self::Error> {
        Err("disk full".to_string())
    }

    fn count(&self) -> Result<usize, Self::Error> {
        Err("disk full".to_string())
    }
}

/// Returns the document's stored chunks for any query, scored 0.8
#[derive(Default)]
struct EchoStore {
    chunks: Vec<Chunk>,
}

impl VectorStore for EchoStore {
    type Error = String;

    fn upsert(&mut self, chunks: &[Chunk]) -> Result<IndexReport, Self::Error> {
        for chunk in chunks {
            self.chunks.retain(|c| c.id != chunk.id);
            self.chunks.push(chunk.clone());
        }
        Ok(IndexReport {
            indexed: chunks.len(),
            embedded: 0,
        })
    }

    fn query_scoped(
        &self,
        _: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, Self::Error> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| document_id.is_none_or(|d| c.document_id == d))
            .take(top_k)
            .map(|c| RetrievedChunk::new(c.clone(), 0.8, RetrievalMethod::Keyword))
            .collect())
    }

    fn remove_document(&mut self, document_id: &str) -> Result<usize, Self::Error> {
        let before = self.chunks.len();
        self.chunks.retain(|c| c.document_id != document_id);
        Ok(before - self.chunks.len())
    }

    fn count(&self) -> Result<usize, Self::Error> {
        Ok(self.chunks.len())
    }
}

fn sqlite_store(config: StoreConfig) -> SqliteVectorStore {
    SqliteVectorStore::open(config, Some(Box::new(HashEmbeddingModel::default()))).unwrap()
}

fn offline_pipeline<S: VectorStore + Send + 'static>(store: S) -> Pipeline<UnavailableProvider, S> {
    Pipeline::new(UnavailableProvider, store, TrackCatalog::reference(), PipelineConfig::default()).unwrap()
}

fn small_chunks() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.extraction.chunk_size = 120;
    config.extraction.chunk_overlap = 20;
    config
}

fn long_regulation() -> String {
    [
        "الباب الأول: أحكام عامة تسري على جميع الجهات الحكومية.",
        SALARY_RULE,
        "لا يجوز صرف الفاتورة قبل التحقق من مطابقة المبالغ مع العقد.",
        "يشترط وجود محضر تسليم الموقع قبل صرف المستخلص الأول للمقاول.",
        INVOICE_RULE,
        "الباب الثاني: أحكام ختامية يعمل بها من تاريخ نشرها.",
    ]
    .join(" ")
}

#[tokio::test]
async fn test_salary_rule_without_model() {
    let pipeline = offline_pipeline(sqlite_store(StoreConfig::in_memory()));

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("لائحة الرواتب", SALARY_RULE))
        .await
        .unwrap();

    assert!(!result.is_failed());
    assert_eq!(result.extracted_rules.len(), 1);
    let rule = &result.extracted_rules[0];
    assert_eq!(rule.text(), SALARY_RULE);
    assert_eq!(rule.candidate.extraction_method, ExtractionMethod::Pattern);
    assert_eq!(rule.status, RuleStatus::RequiresReview);
    assert_eq!(rule.track_id.as_deref(), Some("salaries"));
    assert!(rule.mapping_confidence <= 0.6);

    // Near-identical to SAL-001
    assert!(result.gaps.is_empty());

    let stats = &result.statistics;
    assert_eq!(stats.stage, PipelineStage::Done);
    assert_eq!(stats.num_chunks_indexed, 1);
    assert_eq!(stats.llm_batches, 0);
    assert_eq!(stats.fallback_batches, 1);
    assert_eq!(stats.rules_by_status.requires_review, 1);
    assert_eq!(stats.rules_by_track["salaries"], 1);
}

#[tokio::test]
async fn test_missing_invoice_rule_is_a_gap() {
    let pipeline = offline_pipeline(sqlite_store(StoreConfig::in_memory()));

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("فواتير", INVOICE_RULE))
        .await
        .unwrap();

    assert_eq!(result.extracted_rules[0].track_id.as_deref(), Some("invoices"));
    assert_eq!(result.gaps.len(), 1);
    let gap = &result.gaps[0];
    assert_eq!(gap.track_id, "invoices");
    assert_eq!(gap.gap_type, GapType::Missing);
    assert_eq!(gap.severity, Severity::High);
    assert_eq!(gap.recommendation, format!("تنفيذ قاعدة جديدة: {}", INVOICE_RULE));
    assert_eq!(result.statistics.gaps_by_type.missing, 1);
}

#[tokio::test]
async fn test_retrieval_mode_with_model() {
    let llm = MockProvider::new(
        r#"{"rules": [{"text": "يجب إرفاق شهادة تأمين سارية المفعول مع كل مستخلص يقدمه المقاول", "track": "contracts", "confidence": 0.9}]}"#,
    );
    let pipeline = Pipeline::new(
        llm.clone(),
        EchoStore::default(),
        TrackCatalog::reference(),
        PipelineConfig::default(),
    )
    .unwrap();

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("عقود", "نص اللائحة.").with_id("doc_con"))
        .await
        .unwrap();

    let stats = &result.statistics;
    assert!(stats.rag_enabled);
    assert_eq!(stats.chunks_retrieved, 1);
    assert_eq!(stats.llm_batches, 1);
    // 0.7 * 0.9 + 0.3 * 0.8 keeps the hint, so no mapping call
    assert_eq!(llm.call_count(), 1);

    let rule = &result.extracted_rules[0];
    assert_eq!(rule.track_id.as_deref(), Some("contracts"));
    assert_eq!(rule.status, RuleStatus::Mapped);
    assert!((rule.mapping_confidence - 0.87).abs() < 1e-9);
    assert_eq!(rule.candidate.source_reference.chunk_ids, vec!["doc_con_full"]);

    assert_eq!(result.gaps.len(), 1);
    assert_eq!(result.gaps[0].gap_type, GapType::Missing);
    assert!(result.gaps[0].similar_rule_ids.contains(&"CON-001".to_string()));
}

#[tokio::test]
async fn test_empty_retrieval_downgrades_to_whole_document() {
    let pipeline = offline_pipeline(BlindStore::default());

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("لائحة الرواتب", SALARY_RULE))
        .await
        .unwrap();

    assert!(!result.statistics.rag_enabled);
    assert_eq!(result.statistics.num_chunks_indexed, 1);
    assert_eq!(result.statistics.chunks_retrieved, 0);
    assert_eq!(result.extracted_rules.len(), 1);
    assert_eq!(result.extracted_rules[0].candidate.extraction_confidence, 0.3);
}

#[tokio::test]
async fn test_indexing_failure_is_not_fatal() {
    let pipeline = offline_pipeline(BrokenStore);

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("لائحة الرواتب", SALARY_RULE))
        .await
        .unwrap();

    assert!(!result.is_failed());
    assert!(!result.statistics.rag_enabled);
    assert_eq!(result.statistics.num_chunks_indexed, 0);
    assert_eq!(result.extracted_rules.len(), 1);
}

#[tokio::test]
async fn test_rag_disabled_skips_store() {
    let config = PipelineConfig {
        use_rag: false,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(UnavailableProvider, BlindStore::default(), TrackCatalog::reference(), config)
        .unwrap();

    let result = pipeline
        .process_document(&DocumentDescriptor::inline("لائحة الرواتب", SALARY_RULE))
        .await
        .unwrap();

    assert_eq!(result.extracted_rules.len(), 1);
    assert_eq!(result.statistics.num_chunks_indexed, 0);
    assert_eq!(pipeline.store().lock().unwrap().count().unwrap(), 0);
}

#[tokio::test]
async fn test_reindexing_does_not_grow_store() {
    let pipeline = Pipeline::new(
        UnavailableProvider,
        sqlite_store(StoreConfig::in_memory()),
        TrackCatalog::reference(),
        small_chunks(),
    )
    .unwrap();
    let descriptor = DocumentDescriptor::inline("لائحة الصرف", long_regulation()).with_id("doc_reg");

    let first = pipeline.process_document(&descriptor).await.unwrap();
    let stored = pipeline.store().lock().unwrap().count().unwrap();
    assert!(first.statistics.num_chunks_indexed > 1);
    assert_eq!(stored, first.statistics.num_chunks_indexed);

    pipeline.process_document(&descriptor).await.unwrap();
    assert_eq!(pipeline.store().lock().unwrap().count().unwrap(), stored);
}

#[tokio::test]
async fn test_reindexing_drops_chunks_of_old_content() {
    let pipeline = Pipeline::new(
        UnavailableProvider,
        sqlite_store(StoreConfig::in_memory()),
        TrackCatalog::reference(),
        small_chunks(),
    )
    .unwrap();

    let long = DocumentDescriptor::inline("لائحة الصرف", long_regulation()).with_id("doc_reg");
    let first = pipeline.process_document(&long).await.unwrap();
    assert!(first.statistics.num_chunks_indexed > 1);

    let short = DocumentDescriptor::inline("لائحة الصرف", SALARY_RULE).with_id("doc_reg");
    let second = pipeline.process_document(&short).await.unwrap();

    let store = pipeline.store();
    let store = store.lock().unwrap();
    assert_eq!(second.statistics.num_chunks_indexed, 1);
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.document_chunks("doc_reg").unwrap()[0].id, "doc_reg_full");

    assert_eq!(second.extracted_rules.len(), 1);
    assert!(second.extracted_rules.iter().all(|r| SALARY_RULE.contains(r.text())));
}

#[tokio::test]
async fn test_chunks_persist_across_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finrules.db");
    let descriptor = DocumentDescriptor::inline("لائحة الصرف", long_regulation()).with_id("doc_reg");

    let indexed = {
        let pipeline = Pipeline::new(
            UnavailableProvider,
            sqlite_store(StoreConfig::at(&path)),
            TrackCatalog::reference(),
            small_chunks(),
        )
        .unwrap();
        pipeline.process_document(&descriptor).await.unwrap().statistics.num_chunks_indexed
    };

    let reopened = sqlite_store(StoreConfig::at(&path));
    assert_eq!(reopened.count().unwrap(), indexed);
    assert!(!reopened.query_scoped("الحسميات", 3, Some("doc_reg")).unwrap().is_empty());
}

#[tokio::test]
async fn test_parse_failure_yields_empty_result() {
    let pipeline = offline_pipeline(BlindStore::default());

    let result = pipeline
        .process_document(&DocumentDescriptor::file("مفقود", "/nonexistent/finrules/policy.txt"))
        .await
        .unwrap();

    assert!(result.is_failed());
    assert!(result.extracted_rules.is_empty());
    assert!(result.gaps.is_empty());
    assert_eq!(result.statistics.stage, PipelineStage::Failed);
    assert_eq!(result.document_name, "مفقود");
    assert_eq!(pipeline.store().lock().unwrap().count().unwrap(), 0);
}

#[tokio::test]
async fn test_batch_continues_past_bad_document() {
    let pipeline = offline_pipeline(sqlite_store(StoreConfig::in_memory()));
    let descriptors = vec![
        DocumentDescriptor::inline("رواتب", SALARY_RULE),
        DocumentDescriptor {
            name: "بعيد".to_string(),
            url: Some("https://example.gov/regulation.pdf".to_string()),
            ..DocumentDescriptor::default()
        },
        DocumentDescriptor::inline("فواتير", INVOICE_RULE),
    ];

    let batch = pipeline.process_batch(&descriptors).await;

    assert_eq!(batch.attempted(), 3);
    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.results[0].document_name, "رواتب");
    assert_eq!(batch.results[1].document_name, "فواتير");
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].name, "بعيد");
    assert!(batch.failures[0].error.contains("Unsupported"));
}

#[tokio::test]
async fn test_comprehensive_report_over_union() {
    let pipeline = offline_pipeline(sqlite_store(StoreConfig::in_memory()));
    let batch = pipeline
        .process_batch(&[
            DocumentDescriptor::inline("رواتب", SALARY_RULE),
            DocumentDescriptor::inline("فواتير", INVOICE_RULE),
        ])
        .await;

    let report = pipeline.generate_comprehensive_report(&batch.results);

    assert_eq!(report.metadata.num_documents_processed, 2);
    assert_eq!(report.summary.total_rules_extracted, 2);
    assert_eq!(report.summary.total_gaps_identified, 1);
    assert_eq!(report.summary.rules_by_track["salaries"], 1);
    assert_eq!(report.summary.rules_by_track["invoices"], 1);
    assert_eq!(report.summary.gaps_by_severity.high, 1);
    assert_eq!(report.gap_analysis.gaps_by_track["invoices"].len(), 1);

    let coverage = &report.coverage_analysis;
    assert_eq!(coverage.track("invoices").unwrap().coverage_percentage, 80.0);
    assert_eq!(coverage.track("salaries").unwrap().coverage_percentage, 100.0);
    assert_eq!(coverage.overall.average_coverage, 93.33);

    assert_eq!(report.document_results.len(), 2);
    assert_eq!(report.document_results[1].num_gaps, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["metadata"]["generated_at"].as_u64().unwrap() > 0);
    assert_eq!(json["summary"]["gaps_by_severity"]["high"], 1);
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = PipelineConfig::default();
    config.extraction.chunk_overlap = config.extraction.chunk_size;

    let result = Pipeline::new(UnavailableProvider, BlindStore::default(), TrackCatalog::reference(), config);
    assert!(matches!(result, Err(PipelineError::Config(_))));
}
