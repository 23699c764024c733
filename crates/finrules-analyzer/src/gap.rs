//! Gap analysis against each track's existing rules

use crate::similarity::jaccard_similarity;
use finrules_domain::{ExtractedRule, Gap, GapType, GapTypeCounts, Severity, Track, TrackCatalog};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Similarity below which a rule is missing from its track
pub const MISSING_THRESHOLD: f64 = 0.3;

/// Similarity from which a rule counts as already covered
pub const COVERED_THRESHOLD: f64 = 0.7;

/// Most similar existing rules listed on a gap
pub const MAX_SIMILAR_RULES: usize = 3;

/// Compares mapped rules with the track catalog
pub struct GapAnalyzer {
    catalog: Arc<TrackCatalog>,
}

impl GapAnalyzer {
    /// Create an analyzer over `catalog`
    pub fn new(catalog: Arc<TrackCatalog>) -> Self {
        Self { catalog }
    }

    /// At most one gap per mapped rule; unmapped rules are skipped
    pub fn analyze(&self, rules: &[ExtractedRule]) -> Vec<Gap> {
        let mut gaps = Vec::new();

        for rule in rules {
            let Some(track_id) = rule.track_id.as_deref() else {
                continue;
            };
            let Some(track) = self.catalog.get(track_id) else {
                warn!("Rule {} references unknown track {}, skipping", rule.id(), track_id);
                continue;
            };
            if let Some(gap) = check_rule(rule, track) {
                gaps.push(gap);
            }
        }

        info!("Identified {} gap(s) in {} rule(s)", gaps.len(), rules.len());
        gaps
    }

    /// Summaries of `gaps` by severity, type and track
    pub fn generate_gap_report(&self, gaps: &[Gap]) -> GapReport {
        let mut report = GapReport {
            summary: GapSummary {
                total_gaps: gaps.len(),
                ..GapSummary::default()
            },
            ..GapReport::default()
        };

        for gap in gaps {
            report.summary.by_severity.record(gap.severity);
            match gap.gap_type {
                GapType::Missing => report.summary.by_type.missing += 1,
                GapType::Partial => report.summary.by_type.partial += 1,
                GapType::Conflicting => report.summary.by_type.conflicting += 1,
            }
            *report.summary.by_track.entry(gap.track_id.clone()).or_insert(0) += 1;

            report
                .gaps_by_track
                .entry(gap.track_id.clone())
                .or_default()
                .push(GapEntry {
                    gap_id: gap.id.clone(),
                    extracted_rule: gap.rule.text().to_string(),
                    gap_type: gap.gap_type,
                    severity: gap.severity,
                    recommendation: gap.recommendation.clone(),
                    similar_rule_ids: gap.similar_rule_ids.clone(),
                });

            if gap.severity == Severity::Critical {
                report.critical_gaps.push(CriticalGap {
                    gap_id: gap.id.clone(),
                    track: gap.track_id.clone(),
                    rule: gap.rule.text().to_string(),
                    recommendation: gap.recommendation.clone(),
                });
            }
        }

        report
    }
}

/// Classify one rule against its track
fn check_rule(rule: &ExtractedRule, track: &Track) -> Option<Gap> {
    let scored: Vec<(&str, f64)> = track
        .existing_rules
        .iter()
        .map(|existing| (existing.id.as_str(), jaccard_similarity(rule.text(), &existing.description)))
        .collect();
    let max_similarity = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);

    if max_similarity >= COVERED_THRESHOLD {
        debug!("Rule {} covered by track {} ({:.2})", rule.id(), track.track_id, max_similarity);
        return None;
    }

    // Stable sort keeps catalog order among equal similarities
    let mut ranked: Vec<(&str, f64)> = scored.into_iter().filter(|(_, s)| *s > 0.0).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let similar: Vec<String> = ranked
        .iter()
        .take(MAX_SIMILAR_RULES)
        .map(|(id, _)| id.to_string())
        .collect();

    let (gap_type, severity, recommendation) = match ranked.first() {
        Some((closest, _)) if max_similarity >= MISSING_THRESHOLD => (
            GapType::Partial,
            Severity::Medium,
            format!("تحديث القاعدة {} لتشمل: {}", closest, rule.text()),
        ),
        _ => (
            GapType::Missing,
            Severity::High,
            format!("تنفيذ قاعدة جديدة: {}", rule.text()),
        ),
    };

    Some(
        Gap::new(&track.track_id, rule.clone(), gap_type, severity, recommendation)
            .with_similar(similar, max_similarity),
    )
}

/// Gap counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    /// Critical gaps
    pub critical: usize,
    /// High gaps
    pub high: usize,
    /// Medium gaps
    pub medium: usize,
    /// Low gaps
    pub low: usize,
}

impl SeverityCounts {
    /// Count one gap of `severity`
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

/// Totals of a gap report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapSummary {
    /// Number of gaps
    pub total_gaps: usize,
    /// Gaps per severity
    pub by_severity: SeverityCounts,
    /// Gaps per type
    pub by_type: GapTypeCounts,
    /// Gaps per track id
    pub by_track: BTreeMap<String, usize>,
}

/// A gap as listed under its track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapEntry {
    /// Gap id
    pub gap_id: String,
    /// Rule text
    pub extracted_rule: String,
    /// Gap type
    pub gap_type: GapType,
    /// Severity
    pub severity: Severity,
    /// Recommendation
    pub recommendation: String,
    /// Most similar existing rules
    pub similar_rule_ids: Vec<String>,
}

/// A critical gap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalGap {
    /// Gap id
    pub gap_id: String,
    /// Track id
    pub track: String,
    /// Rule text
    pub rule: String,
    /// Recommendation
    pub recommendation: String,
}

/// Gap report over one or more documents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapReport {
    /// Totals
    pub summary: GapSummary,
    /// Gaps grouped by track id
    pub gaps_by_track: BTreeMap<String, Vec<GapEntry>>,
    /// Critical gaps only
    pub critical_gaps: Vec<CriticalGap>,
}
