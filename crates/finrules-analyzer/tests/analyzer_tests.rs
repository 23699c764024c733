//! Gap and coverage analysis over the reference catalog

use finrules_analyzer::{CoverageAnalyzer, GapAnalyzer};
use finrules_domain::{CandidateRule, ExtractedRule, ExtractionMethod, GapType, SourceReference, TrackCatalog};
use std::sync::Arc;

fn mapped(text: &str, track: &str) -> ExtractedRule {
    let candidate = CandidateRule::new(text, 0.9, ExtractionMethod::Llm, SourceReference::default());
    ExtractedRule::mapped(candidate, Some(track.to_string()), 0.9)
}

#[test]
fn test_reference_catalog_gap_and_coverage() {
    let catalog = Arc::new(TrackCatalog::reference());
    let gaps_analyzer = GapAnalyzer::new(Arc::clone(&catalog));
    let coverage_analyzer = CoverageAnalyzer::new(Arc::clone(&catalog));

    let rules = vec![
        // near copy of SAL-001
        mapped("التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي", "salaries"),
        // new obligation for invoices
        mapped("يجب حفظ نسخة إلكترونية من كل فاتورة لمدة خمس سنوات", "invoices"),
    ];

    let gaps = gaps_analyzer.analyze(&rules);
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].track_id, "invoices");
    assert_eq!(gaps[0].gap_type, GapType::Missing);

    let coverage = coverage_analyzer.analyze(&rules, &gaps);
    let invoices = coverage.track("invoices").unwrap();
    assert_eq!(invoices.identified_gaps, 1);
    assert_eq!(invoices.extracted_rules, 1);
    assert_eq!(invoices.coverage_percentage, 80.0);
    assert_eq!(coverage.track("salaries").unwrap().coverage_percentage, 100.0);
    assert_eq!(coverage.overall.average_coverage, 93.33);

    let report = gaps_analyzer.generate_gap_report(&gaps);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["summary"]["by_severity"]["high"], 1);
    assert_eq!(json["summary"]["by_type"]["missing"], 1);
}
