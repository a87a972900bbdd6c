//! Document-to-document match reports.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use docmatch_normalize::Timeline;

/// Comparison of one source document against one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    /// Document the comparison was made from.
    pub source_id: String,

    /// Document compared against.
    pub target_id: String,

    /// Cosine similarity as a percentage, rounded to two decimals.
    pub score_percent: f32,

    /// Target key terms covered by the source.
    pub matched_terms: Vec<String>,

    /// Target key terms the source lacks.
    pub missing_terms: Vec<String>,

    /// Education and experience periods of the source document.
    pub source_timeline: Timeline,
}

/// Report ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Highest score first.
    #[default]
    ScoreDesc,
    /// Lowest score first.
    ScoreAsc,
    /// By target id.
    Name,
}

/// Filters and ordering for [`crate::DocumentPipeline::compare`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Drop reports scoring below this percentage.
    pub min_score_percent: f32,

    /// Drop reports with fewer matched terms.
    pub min_matched_terms: usize,

    /// Report ordering.
    pub sort_by: SortBy,
}

impl MatchOptions {
    /// Set the minimum score.
    pub fn with_min_score_percent(mut self, min: f32) -> Self {
        self.min_score_percent = min;
        self
    }

    /// Set the minimum number of matched terms.
    pub fn with_min_matched_terms(mut self, min: usize) -> Self {
        self.min_matched_terms = min;
        self
    }

    /// Set the ordering.
    pub fn with_sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Check a report against the filters.
    pub fn accepts(&self, report: &MatchReport) -> bool {
        report.score_percent >= self.min_score_percent
            && report.matched_terms.len() >= self.min_matched_terms
    }
}

/// Cosine similarity as a percentage with two decimals.
pub fn score_percent(cosine: f32) -> f32 {
    (cosine * 10_000.0).round() / 100.0
}

/// Split `target_terms` into those the source covers and those it lacks.
///
/// A target term is covered when some source term contains it or is
/// contained in it, so `rust` matches `rustc` and `postgresql` matches
/// `postgres`. Both inputs are expected sorted; so are both outputs.
pub fn match_terms(source_terms: &[String], target_terms: &[String]) -> (Vec<String>, Vec<String>) {
    target_terms.iter().cloned().partition(|target| {
        source_terms
            .iter()
            .any(|source| source.contains(target.as_str()) || target.contains(source.as_str()))
    })
}

/// Order reports in place. Ties keep their current order.
pub fn sort_reports(reports: &mut [MatchReport], sort_by: SortBy) {
    match sort_by {
        SortBy::ScoreDesc => reports.sort_by(|a, b| by_score(b, a)),
        SortBy::ScoreAsc => reports.sort_by(by_score),
        SortBy::Name => reports.sort_by(|a, b| a.target_id.cmp(&b.target_id)),
    }
}

fn by_score(a: &MatchReport, b: &MatchReport) -> Ordering {
    a.score_percent.total_cmp(&b.score_percent)
}
