//! Batch and multi-document reports

use finrules_analyzer::{CoverageAnalyzer, CoverageReport, GapAnalyzer, GapReport, SeverityCounts};
use finrules_domain::{ExtractedRule, ExtractionResult, Gap};
use serde::Serialize;
use std::collections::BTreeMap;

/// A document the batch could not process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Document name
    pub name: String,
    /// Why it failed
    pub error: String,
}

/// Outcome of [`Pipeline::process_batch`](crate::Pipeline::process_batch)
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Successfully processed documents, in input order
    pub results: Vec<ExtractionResult>,
    /// Documents that failed, in input order
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// Number of documents attempted
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    /// Unix timestamp of generation
    pub generated_at: u64,
    /// Documents included
    pub num_documents_processed: usize,
    /// Sum of per-document processing times, two decimals
    pub total_processing_time_seconds: f64,
}

/// Totals across documents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Rules over all documents
    pub total_rules_extracted: usize,
    /// Gaps over all documents
    pub total_gaps_identified: usize,
    /// Rules per track id, `unmapped` for rules without a track
    pub rules_by_track: BTreeMap<String, usize>,
    /// Gaps per severity
    pub gaps_by_severity: SeverityCounts,
}

/// One line per document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    /// Document id
    pub document_id: String,
    /// Document name
    pub document_name: String,
    /// Rules extracted
    pub num_rules: usize,
    /// Gaps found
    pub num_gaps: usize,
    /// Seconds spent on the document
    pub processing_time: f64,
    /// Error, for documents that failed to parse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate report over several extraction results
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveReport {
    /// Run metadata
    pub metadata: ReportMetadata,
    /// Totals
    pub summary: ReportSummary,
    /// Gap report over all gaps
    pub gap_analysis: GapReport,
    /// Coverage over the union of rules and gaps
    pub coverage_analysis: CoverageReport,
    /// Per-document summaries
    pub document_results: Vec<DocumentSummary>,
}

impl ComprehensiveReport {
    /// Concatenate rules and gaps of `results` and analyze the union
    pub fn build(results: &[ExtractionResult], gaps: &GapAnalyzer, coverage: &CoverageAnalyzer) -> Self {
        let all_rules: Vec<ExtractedRule> = results.iter().flat_map(|r| r.extracted_rules.iter().cloned()).collect();
        let all_gaps: Vec<Gap> = results.iter().flat_map(|r| r.gaps.iter().cloned()).collect();

        let mut rules_by_track = BTreeMap::new();
        for rule in &all_rules {
            let key = rule.track_id.clone().unwrap_or_else(|| "unmapped".to_string());
            *rules_by_track.entry(key).or_insert(0) += 1;
        }

        let mut gaps_by_severity = SeverityCounts::default();
        for gap in &all_gaps {
            gaps_by_severity.record(gap.severity);
        }

        let total_time: f64 = results.iter().map(|r| r.processing_time_seconds).sum();

        Self {
            metadata: ReportMetadata {
                generated_at: finrules_domain::unix_timestamp(),
                num_documents_processed: results.len(),
                total_processing_time_seconds: (total_time * 100.0).round() / 100.0,
            },
            summary: ReportSummary {
                total_rules_extracted: all_rules.len(),
                total_gaps_identified: all_gaps.len(),
                rules_by_track,
                gaps_by_severity,
            },
            gap_analysis: gaps.generate_gap_report(&all_gaps),
            coverage_analysis: coverage.analyze(&all_rules, &all_gaps),
            document_results: results
                .iter()
                .map(|r| DocumentSummary {
                    document_id: r.document_id.clone(),
                    document_name: r.document_name.clone(),
                    num_rules: r.extracted_rules.len(),
                    num_gaps: r.gaps.len(),
                    processing_time: r.processing_time_seconds,
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}
