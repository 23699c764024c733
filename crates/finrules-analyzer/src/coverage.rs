//! Per-track coverage
//!
//! `coverage = existing / (existing + gaps) * 100`, and 100 when a track has
//! neither existing rules nor gaps.

use finrules_domain::{ExtractedRule, Gap, TrackCatalog};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Coverage of one track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCoverage {
    /// Track id
    pub track_id: String,
    /// Track display name
    pub track_name: String,
    /// Rules already in the catalog
    pub existing_rules: usize,
    /// Extracted rules mapped to this track
    pub extracted_rules: usize,
    /// Gaps found for this track
    pub identified_gaps: usize,
    /// Coverage in percent, two decimals
    pub coverage_percentage: f64,
}

/// Totals across tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallCoverage {
    /// Rules in the catalog
    pub total_existing_rules: usize,
    /// Extracted rules, mapped or not
    pub total_extracted_rules: usize,
    /// Gaps
    pub total_gaps: usize,
    /// Unweighted mean of track coverage, two decimals
    pub average_coverage: f64,
}

/// Coverage report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    /// Totals
    pub overall: OverallCoverage,
    /// One entry per track, in catalog order
    pub by_track: Vec<TrackCoverage>,
}

impl CoverageReport {
    /// Coverage of one track
    pub fn track(&self, track_id: &str) -> Option<&TrackCoverage> {
        self.by_track.iter().find(|t| t.track_id == track_id)
    }
}

/// Aggregates rules and gaps into coverage figures
pub struct CoverageAnalyzer {
    catalog: Arc<TrackCatalog>,
}

impl CoverageAnalyzer {
    /// Create an analyzer over `catalog`
    pub fn new(catalog: Arc<TrackCatalog>) -> Self {
        Self { catalog }
    }

    /// Coverage of every catalog track
    pub fn analyze(&self, rules: &[ExtractedRule], gaps: &[Gap]) -> CoverageReport {
        let by_track: Vec<TrackCoverage> = self
            .catalog
            .iter()
            .map(|track| {
                let existing = track.existing_rules.len();
                let extracted = rules
                    .iter()
                    .filter(|r| r.track_id.as_deref() == Some(track.track_id.as_str()))
                    .count();
                let identified = gaps.iter().filter(|g| g.track_id == track.track_id).count();

                TrackCoverage {
                    track_id: track.track_id.clone(),
                    track_name: track.name.clone(),
                    existing_rules: existing,
                    extracted_rules: extracted,
                    identified_gaps: identified,
                    coverage_percentage: round2(coverage_percentage(existing, identified)),
                }
            })
            .collect();

        let average_coverage = if by_track.is_empty() {
            0.0
        } else {
            round2(by_track.iter().map(|t| t.coverage_percentage).sum::<f64>() / by_track.len() as f64)
        };

        let overall = OverallCoverage {
            total_existing_rules: self.catalog.iter().map(|t| t.existing_rules.len()).sum(),
            total_extracted_rules: rules.len(),
            total_gaps: gaps.len(),
            average_coverage,
        };

        info!("Average coverage {:.2}% over {} track(s)", overall.average_coverage, by_track.len());
        CoverageReport { overall, by_track }
    }
}

/// `existing / (existing + gaps) * 100`, 100 when both are zero
pub fn coverage_percentage(existing: usize, gaps: usize) -> f64 {
    let needed = existing + gaps;
    if needed == 0 {
        return 100.0;
    }
    existing as f64 / needed as f64 * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacuous_track_fully_covered() {
        assert_eq!(coverage_percentage(0, 0), 100.0);
    }

    #[test]
    fn test_coverage_formula() {
        assert_eq!(coverage_percentage(4, 0), 100.0);
        assert_eq!(coverage_percentage(4, 4), 50.0);
        assert_eq!(coverage_percentage(0, 3), 0.0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round2(4.0 / 6.0 * 100.0), 66.67);
    }

    #[test]
    fn test_reference_catalog_without_findings() {
        let analyzer = CoverageAnalyzer::new(Arc::new(TrackCatalog::reference()));
        let report = analyzer.analyze(&[], &[]);

        assert_eq!(report.by_track.len(), 3);
        assert!(report.by_track.iter().all(|t| t.coverage_percentage == 100.0));
        assert_eq!(report.overall.average_coverage, 100.0);
        assert_eq!(report.overall.total_existing_rules, 12);
        assert_eq!(report.track("salaries").unwrap().existing_rules, 4);
    }
}
