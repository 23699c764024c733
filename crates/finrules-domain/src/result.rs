//! The per-document aggregate produced by a pipeline run

use crate::gap::{Gap, GapType};
use crate::rule::{ExtractedRule, RuleStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline state machine
///
/// `Pending → Parsing → (Indexing) → Extracting → Mapping → Analyzing → Done`,
/// with `Failed` reachable from `Parsing` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Not started
    Pending,
    /// Parser running
    Parsing,
    /// Chunking and indexing
    Indexing,
    /// Rule extraction
    Extracting,
    /// Track mapping
    Mapping,
    /// Gap analysis
    Analyzing,
    /// Finished
    Done,
    /// Parse failure
    Failed,
}

impl PipelineStage {
    /// Whether the stage is absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Parsing => "parsing",
            PipelineStage::Indexing => "indexing",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Mapping => "mapping",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Rule counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Not mapped
    pub extracted: usize,
    /// Confidently mapped
    pub mapped: usize,
    /// Needs review
    pub requires_review: usize,
}

/// Gap counts per type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapTypeCounts {
    /// Missing gaps
    pub missing: usize,
    /// Partial gaps
    pub partial: usize,
    /// Conflicting gaps
    pub conflicting: usize,
}

/// Summary statistics of one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStatistics {
    /// Number of extracted rules
    pub total_rules: usize,
    /// Rules per status
    pub rules_by_status: StatusCounts,
    /// Rules per track id, plus `unmapped`
    pub rules_by_track: BTreeMap<String, usize>,
    /// Rules with no track
    pub unmapped_rules: usize,
    /// Mean mapping confidence over all rules (0 when there are none)
    pub average_mapping_confidence: f64,
    /// Number of gaps
    pub total_gaps: usize,
    /// Gaps per type
    pub gaps_by_type: GapTypeCounts,
    /// Whether retrieval drove extraction
    pub rag_enabled: bool,
    /// Chunks written to the store
    pub num_chunks_indexed: usize,
    /// Unique chunks returned by retrieval
    pub chunks_retrieved: usize,
    /// Batches answered by the model
    pub llm_batches: usize,
    /// Batches handled by the pattern fallback
    pub fallback_batches: usize,
    /// Batches cut to the context limit
    pub truncated_batches: usize,
    /// Last stage reached
    pub stage: PipelineStage,
}

impl Default for ExtractionStatistics {
    fn default() -> Self {
        Self {
            total_rules: 0,
            rules_by_status: StatusCounts::default(),
            rules_by_track: BTreeMap::new(),
            unmapped_rules: 0,
            average_mapping_confidence: 0.0,
            total_gaps: 0,
            gaps_by_type: GapTypeCounts::default(),
            rag_enabled: false,
            num_chunks_indexed: 0,
            chunks_retrieved: 0,
            llm_batches: 0,
            fallback_batches: 0,
            truncated_batches: 0,
            stage: PipelineStage::Pending,
        }
    }
}

impl ExtractionStatistics {
    /// Count rules and gaps; run counters are left at zero
    pub fn tally(rules: &[ExtractedRule], gaps: &[Gap]) -> Self {
        let mut stats = Self {
            total_rules: rules.len(),
            total_gaps: gaps.len(),
            ..Self::default()
        };

        for rule in rules {
            match rule.status {
                RuleStatus::Extracted => stats.rules_by_status.extracted += 1,
                RuleStatus::Mapped => stats.rules_by_status.mapped += 1,
                RuleStatus::RequiresReview => stats.rules_by_status.requires_review += 1,
            }
            let key = match &rule.track_id {
                Some(track) => track.clone(),
                None => {
                    stats.unmapped_rules += 1;
                    "unmapped".to_string()
                }
            };
            *stats.rules_by_track.entry(key).or_insert(0) += 1;
        }

        if !rules.is_empty() {
            let sum: f64 = rules.iter().map(|r| r.mapping_confidence).sum();
            stats.average_mapping_confidence = sum / rules.len() as f64;
        }

        for gap in gaps {
            match gap.gap_type {
                GapType::Missing => stats.gaps_by_type.missing += 1,
                GapType::Partial => stats.gaps_by_type.partial += 1,
                GapType::Conflicting => stats.gaps_by_type.conflicting += 1,
            }
        }

        stats
    }
}

/// One document's rules, gaps and statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Processed document
    pub document_id: String,

    /// Processed document's name
    pub document_name: String,

    /// Mapped rules
    pub extracted_rules: Vec<ExtractedRule>,

    /// Gaps found
    pub gaps: Vec<Gap>,

    /// Summary statistics
    pub statistics: ExtractionStatistics,

    /// Wall-clock duration of the run
    pub processing_time_seconds: f64,

    /// Parse error, when the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Unix timestamp of creation
    pub created_at: u64,
}

impl ExtractionResult {
    /// Empty result for a document whose parsing failed
    pub fn failed(
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        error: impl Into<String>,
        processing_time_seconds: f64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_name: document_name.into(),
            extracted_rules: Vec::new(),
            gaps: Vec::new(),
            statistics: ExtractionStatistics {
                stage: PipelineStage::Failed,
                ..ExtractionStatistics::default()
            },
            processing_time_seconds,
            error: Some(error.into()),
            created_at: crate::unix_timestamp(),
        }
    }

    /// Whether the run ended in failure
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::Severity;
    use crate::rule::{CandidateRule, ExtractionMethod, SourceReference};

    fn rule(track: Option<&str>, confidence: f64) -> ExtractedRule {
        let candidate = CandidateRule::new("نص", 0.9, ExtractionMethod::Llm, SourceReference::default());
        ExtractedRule::mapped(candidate, track.map(String::from), confidence)
    }

    #[test]
    fn test_tally() {
        let rules = vec![
            rule(Some("salaries"), 0.9),
            rule(Some("salaries"), 0.3),
            rule(None, 0.0),
        ];
        let gaps = vec![Gap::new("salaries", rules[0].clone(), GapType::Missing, Severity::High, "r")];

        let stats = ExtractionStatistics::tally(&rules, &gaps);

        assert_eq!(stats.total_rules, 3);
        assert_eq!(stats.rules_by_status.mapped, 1);
        assert_eq!(stats.rules_by_status.requires_review, 2);
        assert_eq!(stats.rules_by_track.get("salaries"), Some(&2));
        assert_eq!(stats.rules_by_track.get("unmapped"), Some(&1));
        assert_eq!(stats.unmapped_rules, 1);
        assert!((stats.average_mapping_confidence - 0.4).abs() < 1e-9);
        assert_eq!(stats.gaps_by_type.missing, 1);
    }

    #[test]
    fn test_tally_empty() {
        let stats = ExtractionStatistics::tally(&[], &[]);
        assert_eq!(stats.total_rules, 0);
        assert_eq!(stats.average_mapping_confidence, 0.0);
    }

    #[test]
    fn test_failed_result() {
        let result = ExtractionResult::failed("doc_1", "circular", "unsupported source", 0.01);
        assert!(result.is_failed());
        assert!(result.extracted_rules.is_empty());
        assert_eq!(result.statistics.stage, PipelineStage::Failed);
        assert!(result.statistics.stage.is_terminal());
    }
}
