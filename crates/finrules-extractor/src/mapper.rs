//! Track mapping
//!
//! Rules without a trusted track hint are classified by the model; when the
//! model is unavailable or answers with something unusable, a keyword score
//! against each track's fixed keyword list decides instead.

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::extractor::call_llm;
use crate::parser::parse_mapping_response;
use crate::prompt::PromptBuilder;
use finrules_domain::traits::LlmProvider;
use finrules_domain::{CandidateRule, ExtractedRule, TrackCatalog};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hints below this extraction confidence are re-classified
pub const REMAP_THRESHOLD: f64 = 0.7;

/// Upper bound of keyword-only mapping confidence
pub const KEYWORD_CONFIDENCE_CAP: f64 = 0.6;

/// Model answer meaning "no track"
const NO_TRACK: &str = "none";

/// A classification decision
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAssignment {
    /// Chosen track, `None` when unmapped
    pub track_id: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Explanation, when the model gave one
    pub reasoning: Option<String>,
}

impl TrackAssignment {
    fn unmapped() -> Self {
        Self {
            track_id: None,
            confidence: 0.0,
            reasoning: None,
        }
    }
}

/// Assigns candidate rules to tracks
pub struct TrackMapper<L> {
    llm: Arc<L>,
    catalog: Arc<TrackCatalog>,
    config: ExtractorConfig,
}

impl<L> TrackMapper<L>
where
    L: LlmProvider + Send + Sync + 'static,
{
    /// Create a mapper over `catalog`
    pub fn new(llm: Arc<L>, catalog: Arc<TrackCatalog>, config: ExtractorConfig) -> Self {
        Self { llm, catalog, config }
    }

    /// Map every rule; none is dropped
    pub async fn map(&self, rules: Vec<CandidateRule>) -> Vec<ExtractedRule> {
        let mut mapped = Vec::with_capacity(rules.len());
        let mut classified = 0usize;

        for rule in rules {
            let trusted_hint = rule
                .track_hint
                .as_deref()
                .filter(|t| self.catalog.contains(t) && rule.extraction_confidence >= REMAP_THRESHOLD)
                .map(str::to_string);

            let extracted = match trusted_hint {
                Some(track) => {
                    let confidence = rule.extraction_confidence;
                    ExtractedRule::mapped(rule, Some(track), confidence)
                }
                None => {
                    classified += 1;
                    let assignment = self.classify(&rule.text).await;
                    ExtractedRule::mapped(rule, assignment.track_id, assignment.confidence)
                        .with_reasoning(assignment.reasoning)
                }
            };
            mapped.push(extracted);
        }

        let unmapped = mapped.iter().filter(|r| r.track_id.is_none()).count();
        info!(
            "Mapped {} rule(s): {} classified, {} left unmapped",
            mapped.len(),
            classified,
            unmapped
        );
        mapped
    }

    /// Classify one rule text, falling back to keywords
    pub async fn classify(&self, rule_text: &str) -> TrackAssignment {
        if self.llm.is_available() {
            match self.classify_with_model(rule_text).await {
                Ok(assignment) => return assignment,
                Err(e) => warn!("Model classification failed, using keywords: {}", e),
            }
        }

        match keyword_match(&self.catalog, rule_text) {
            Some((track_id, confidence)) => {
                debug!("Keyword mapping chose {} ({:.2})", track_id, confidence);
                TrackAssignment {
                    track_id: Some(track_id),
                    confidence,
                    reasoning: None,
                }
            }
            None => TrackAssignment::unmapped(),
        }
    }

    async fn classify_with_model(&self, rule_text: &str) -> Result<TrackAssignment, ExtractorError> {
        let prompt = PromptBuilder::new(&self.catalog).mapping(rule_text);
        let response = call_llm(&self.llm, prompt, self.config.mapping_max_tokens, self.config.llm_timeout()).await?;
        let answer = parse_mapping_response(&response)?;

        let track_id = match answer.track_id.as_deref().map(str::trim) {
            None | Some("") => return Ok(TrackAssignment::unmapped()),
            Some(id) if id.eq_ignore_ascii_case(NO_TRACK) => return Ok(TrackAssignment::unmapped()),
            Some(id) if self.catalog.contains(id) => id.to_string(),
            Some(id) => return Err(ExtractorError::InvalidFormat(format!("unknown track '{}'", id))),
        };

        Ok(TrackAssignment {
            track_id: Some(track_id),
            confidence: answer.confidence.clamp(0.0, 1.0),
            reasoning: answer.reasoning,
        })
    }
}

/// Best keyword-scoring track for `text`
///
/// The score is the number of the track's keywords found in the text over
/// the size of its keyword list, capped at [`KEYWORD_CONFIDENCE_CAP`]. The
/// track with most matches wins; ties go to the earlier track. `None` when
/// no keyword matches.
pub fn keyword_match(catalog: &TrackCatalog, text: &str) -> Option<(String, f64)> {
    let mut best: Option<(&str, usize, usize)> = None;

    for track in catalog.iter() {
        let matches = track.keywords.iter().filter(|k| text.contains(k.as_str())).count();
        if matches > best.map_or(0, |(_, m, _)| m) {
            best = Some((&track.track_id, matches, track.keywords.len()));
        }
    }

    best.map(|(track_id, matches, total)| {
        let score = matches as f64 / total as f64;
        (track_id.to_string(), score.min(KEYWORD_CONFIDENCE_CAP))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrules_domain::{ExtractionMethod, RuleStatus, SourceReference};
    use finrules_llm::{MockProvider, UnavailableProvider};

    const SALARY_RULE: &str = "يجب التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي.";

    fn mapper<L: LlmProvider + Send + Sync + 'static>(llm: L) -> TrackMapper<L> {
        TrackMapper::new(
            Arc::new(llm),
            Arc::new(TrackCatalog::reference()),
            ExtractorConfig::default(),
        )
    }

    fn candidate(text: &str, confidence: f64, hint: Option<&str>, method: ExtractionMethod) -> CandidateRule {
        CandidateRule::new(text, confidence, method, SourceReference::default())
            .with_track_hint(hint.map(str::to_string))
    }

    #[test]
    fn test_keyword_match_salaries() {
        let (track, confidence) = keyword_match(&TrackCatalog::reference(), SALARY_RULE).unwrap();
        assert_eq!(track, "salaries");
        // راتب and حسميات out of six keywords
        assert!((confidence - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_match_capped() {
        let text = "عقد مستخلص ترسية منافسات مشتريات إنشاءات مقاول";
        let (track, confidence) = keyword_match(&TrackCatalog::reference(), text).unwrap();
        assert_eq!(track, "contracts");
        assert_eq!(confidence, KEYWORD_CONFIDENCE_CAP);
    }

    #[test]
    fn test_keyword_match_none() {
        assert!(keyword_match(&TrackCatalog::reference(), "نص عام").is_none());
    }

    #[tokio::test]
    async fn test_confident_hint_kept_without_model_call() {
        let llm = MockProvider::new("{}");
        let rules = mapper(llm.clone())
            .map(vec![candidate("قاعدة", 0.9, Some("invoices"), ExtractionMethod::Llm)])
            .await;

        assert_eq!(llm.call_count(), 0);
        assert_eq!(rules[0].track_id.as_deref(), Some("invoices"));
        assert_eq!(rules[0].status, RuleStatus::Mapped);
    }

    #[tokio::test]
    async fn test_weak_hint_reclassified_by_model() {
        let llm = MockProvider::new(r#"{"track_id": "salaries", "confidence": 0.8, "reasoning": "رواتب"}"#);
        let rules = mapper(llm.clone())
            .map(vec![candidate("قاعدة", 0.5, Some("invoices"), ExtractionMethod::Llm)])
            .await;

        assert_eq!(llm.call_count(), 1);
        assert_eq!(rules[0].track_id.as_deref(), Some("salaries"));
        assert_eq!(rules[0].mapping_confidence, 0.8);
        assert_eq!(rules[0].mapping_reasoning.as_deref(), Some("رواتب"));
        assert_eq!(rules[0].status, RuleStatus::Mapped);
    }

    #[tokio::test]
    async fn test_model_none_means_unmapped() {
        let llm = MockProvider::new(r#"{"track_id": "none", "confidence": 0.9}"#);
        let rules = mapper(llm).map(vec![candidate(SALARY_RULE, 0.9, None, ExtractionMethod::Llm)]).await;

        assert_eq!(rules[0].track_id, None);
        assert_eq!(rules[0].mapping_confidence, 0.0);
        assert_eq!(rules[0].status, RuleStatus::RequiresReview);
    }

    #[tokio::test]
    async fn test_unknown_track_falls_back_to_keywords() {
        let llm = MockProvider::new(r#"{"track_id": "pensions", "confidence": 0.9}"#);
        let rules = mapper(llm).map(vec![candidate(SALARY_RULE, 0.9, None, ExtractionMethod::Llm)]).await;

        assert_eq!(rules[0].track_id.as_deref(), Some("salaries"));
        assert!(rules[0].mapping_confidence <= KEYWORD_CONFIDENCE_CAP);
    }

    #[tokio::test]
    async fn test_low_model_confidence_requires_review() {
        let llm = MockProvider::new(r#"{"track_id": "contracts", "confidence": 0.3}"#);
        let rules = mapper(llm).map(vec![candidate("قاعدة", 0.9, None, ExtractionMethod::Llm)]).await;

        assert_eq!(rules[0].track_id.as_deref(), Some("contracts"));
        assert_eq!(rules[0].status, RuleStatus::RequiresReview);
    }

    #[tokio::test]
    async fn test_unavailable_model_uses_keywords() {
        let rules = mapper(UnavailableProvider)
            .map(vec![
                candidate(SALARY_RULE, 0.3, None, ExtractionMethod::Pattern),
                candidate("نص بلا كلمات مفتاحية", 0.3, None, ExtractionMethod::Pattern),
            ])
            .await;

        assert_eq!(rules.len(), 2, "rules are never dropped");
        assert_eq!(rules[0].track_id.as_deref(), Some("salaries"));
        assert_eq!(rules[0].status, RuleStatus::RequiresReview);
        assert_eq!(rules[1].track_id, None);
        assert_eq!(rules[1].mapping_confidence, 0.0);
    }
}
