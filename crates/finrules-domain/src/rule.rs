//! Rules proposed by the extractor and their track assignment

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which channel produced a candidate rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Parsed from a model response
    Llm,
    /// Matched by the obligation-pattern fallback
    Pattern,
}

/// Where a rule was found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    /// Source document id
    pub document_id: String,

    /// Source document name
    pub document_name: String,

    /// Chunks that made up the batch the rule came from
    #[serde(default)]
    pub chunk_ids: Vec<String>,

    /// Zero-based batch number within the extraction run
    pub batch_index: usize,
}

/// A rule proposed by the extractor, before track mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRule {
    /// Unique identifier
    pub id: String,

    /// Rule text
    pub text: String,

    /// Track suggested during extraction, if any
    pub track_hint: Option<String>,

    /// Confidence in [0, 1]
    pub extraction_confidence: f64,

    /// Origin of the rule
    pub source_reference: SourceReference,

    /// LLM or pattern
    pub extraction_method: ExtractionMethod,

    /// Free-form notes returned by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CandidateRule {
    /// Create a candidate with a fresh UUIDv7-based id
    pub fn new(
        text: impl Into<String>,
        extraction_confidence: f64,
        extraction_method: ExtractionMethod,
        source_reference: SourceReference,
    ) -> Self {
        Self {
            id: format!("rule_{}", uuid::Uuid::now_v7().simple()),
            text: text.into(),
            track_hint: None,
            extraction_confidence: extraction_confidence.clamp(0.0, 1.0),
            source_reference,
            extraction_method,
            notes: None,
        }
    }

    /// Set the suggested track
    pub fn with_track_hint(mut self, track: Option<String>) -> Self {
        self.track_hint = track;
        self
    }

    /// Set model notes
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Text normalized for duplicate detection: whitespace collapsed, trailing
    /// punctuation removed, lowercased
    pub fn normalized_text(&self) -> String {
        normalize_rule_text(&self.text)
    }
}

/// Normalize rule text for duplicate detection
pub fn normalize_rule_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '۔', '،', ',', ';', '؛'])
        .trim()
        .to_lowercase()
}

/// Mapping status of an extracted rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Not yet mapped
    Extracted,
    /// Mapped with confidence >= 0.5
    Mapped,
    /// Needs human review
    RequiresReview,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleStatus::Extracted => "extracted",
            RuleStatus::Mapped => "mapped",
            RuleStatus::RequiresReview => "requires_review",
        };
        f.write_str(s)
    }
}

/// A candidate rule after track mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRule {
    /// The underlying candidate
    #[serde(flatten)]
    pub candidate: CandidateRule,

    /// Assigned track, `None` when unmapped
    pub track_id: Option<String>,

    /// Mapping confidence in [0, 1]
    pub mapping_confidence: f64,

    /// Mapping status
    pub status: RuleStatus,

    /// Classifier explanation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_reasoning: Option<String>,
}

impl ExtractedRule {
    /// Confidence below which a mapped rule needs review
    pub const REVIEW_THRESHOLD: f64 = 0.5;

    /// A rule that has not been through mapping
    pub fn unmapped(candidate: CandidateRule) -> Self {
        Self {
            candidate,
            track_id: None,
            mapping_confidence: 0.0,
            status: RuleStatus::Extracted,
            mapping_reasoning: None,
        }
    }

    /// Assign a track and derive the status from the confidence
    ///
    /// Pattern-fallback rules stay in review regardless of confidence.
    pub fn mapped(candidate: CandidateRule, track_id: Option<String>, confidence: f64) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let status = if confidence < Self::REVIEW_THRESHOLD
            || candidate.extraction_method == ExtractionMethod::Pattern
        {
            RuleStatus::RequiresReview
        } else {
            RuleStatus::Mapped
        };

        Self {
            candidate,
            track_id,
            mapping_confidence: confidence,
            status,
            mapping_reasoning: None,
        }
    }

    /// Attach the classifier's explanation
    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.mapping_reasoning = reasoning;
        self
    }

    /// Rule id shortcut
    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    /// Rule text shortcut
    pub fn text(&self) -> &str {
        &self.candidate.text
    }
}
