//! Finrules Analyzer
//!
//! Compares mapped rules against each track's existing rule catalog.
//!
//! - [`GapAnalyzer`] classifies each mapped rule as covered, partial or
//!   missing using Jaccard token-set similarity, and summarises the gaps
//! - [`CoverageAnalyzer`] turns rules and gaps into per-track coverage
//!
//! Both are pure computations over the catalog; nothing here calls out.

#![warn(missing_docs)]

pub mod coverage;
pub mod gap;
pub mod similarity;

pub use coverage::{CoverageAnalyzer, CoverageReport, OverallCoverage, TrackCoverage};
pub use gap::{
    CriticalGap, GapAnalyzer, GapEntry, GapReport, GapSummary, SeverityCounts, COVERED_THRESHOLD,
    MAX_SIMILAR_RULES, MISSING_THRESHOLD,
};
pub use similarity::jaccard_similarity;
