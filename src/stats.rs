use crate::checks::CheckSummary;
use crate::classifier::StructuralCounts;
use crate::models::{Reference, TemplateFlags};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per raw reference, named ones included, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSummary {
    #[serde(flatten)]
    pub flags: TemplateFlags,
    pub wikitext: String,
    pub reference_name: Option<String>,
    /// Hash of the reference itself, or of the definition a named reference points at
    pub md5hash: Option<String>,
    pub template_url: Option<String>,
}

/// Read-side view of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArticleStatistics {
    pub title: Option<String>,
    pub has_references: bool,
    pub number_of_references: usize,
    pub number_of_raw_references: usize,
    pub number_of_sections_found: usize,
    pub number_of_unterminated_ref_tags: usize,
    #[serde(flatten)]
    pub counts: StructuralCounts,
    pub number_of_hashed_content_references: usize,
    pub percent_of_content_references_with_a_hash: u32,
    pub number_of_references_with_a_first_level_domain: usize,
    pub template_counts: Vec<(String, usize)>,
    pub first_level_domain_counts: Vec<(String, usize)>,
    pub urls: Vec<String>,
    pub dois: Vec<String>,
    pub reference_summaries: Vec<ReferenceSummary>,
    pub references: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<CheckSummary>,
}

impl ArticleStatistics {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_checks(mut self, checks: CheckSummary) -> Self {
        self.checks = Some(checks);
        self
    }
}

/// Whole percent of `part` in `total`, 0 when `total` is 0.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Counters shared by the batch workers
#[derive(Default)]
pub struct BatchStats {
    pub articles_processed: AtomicU64,
    pub articles_failed: AtomicU64,
    pub articles_with_references: AtomicU64,
    pub references_found: AtomicU64,
    pub named_references: AtomicU64,
    pub hashed_references: AtomicU64,
    pub unterminated_tags: AtomicU64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stats: &ArticleStatistics) {
        self.articles_processed.fetch_add(1, Ordering::Relaxed);
        if stats.has_references {
            self.articles_with_references
                .fetch_add(1, Ordering::Relaxed);
        }
        self.references_found
            .fetch_add(stats.number_of_references as u64, Ordering::Relaxed);
        self.named_references
            .fetch_add(stats.counts.number_of_named_references as u64, Ordering::Relaxed);
        self.hashed_references
            .fetch_add(stats.number_of_hashed_content_references as u64, Ordering::Relaxed);
        self.unterminated_tags
            .fetch_add(stats.number_of_unterminated_ref_tags as u64, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.articles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn articles(&self) -> u64 {
        self.articles_processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.articles_failed.load(Ordering::Relaxed)
    }

    pub fn references(&self) -> u64 {
        self.references_found.load(Ordering::Relaxed)
    }

    pub fn hashed(&self) -> u64 {
        self.hashed_references.load(Ordering::Relaxed)
    }

    /// Snapshot for reporting
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            articles_processed: self.articles(),
            articles_failed: self.failed(),
            articles_with_references: self.articles_with_references.load(Ordering::Relaxed),
            references_found: self.references(),
            named_references: self.named_references.load(Ordering::Relaxed),
            hashed_references: self.hashed(),
            unterminated_tags: self.unterminated_tags.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub articles_processed: u64,
    pub articles_failed: u64,
    pub articles_with_references: u64,
    pub references_found: u64,
    pub named_references: u64,
    pub hashed_references: u64,
    pub unterminated_tags: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_handles_zero() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(2, 2), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
    }

    #[test]
    fn summary_captures_recorded_articles() {
        let stats = BatchStats::new();
        let article = ArticleStatistics {
            has_references: true,
            number_of_references: 3,
            number_of_hashed_content_references: 2,
            number_of_unterminated_ref_tags: 1,
            counts: StructuralCounts {
                number_of_named_references: 1,
                ..StructuralCounts::default()
            },
            ..ArticleStatistics::default()
        };
        stats.record(&article);
        stats.record(&ArticleStatistics::default());
        stats.inc_failed();

        let summary = stats.summary();
        assert_eq!(summary.articles_processed, 2);
        assert_eq!(summary.articles_failed, 1);
        assert_eq!(summary.articles_with_references, 1);
        assert_eq!(summary.references_found, 3);
        assert_eq!(summary.named_references, 1);
        assert_eq!(summary.hashed_references, 2);
        assert_eq!(summary.unterminated_tags, 1);
    }

    #[test]
    fn statistics_serialize_flat_counts() {
        let stats = ArticleStatistics::default().with_title("Test");
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["title"], "Test");
        assert_eq!(json["number_of_cs1_references"], 0);
        assert!(json.get("checks").is_none());
    }
}
