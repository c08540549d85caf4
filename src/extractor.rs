//! One extraction run over one article.
//!
//! `ExtractorState::extract` chains the pipeline stages (tokenize, classify,
//! normalize, hash) and keeps everything they produce so the counters in
//! [`ArticleStatistics`] can be read off without re-running anything.

use crate::checks::CheckTarget;
use crate::classifier::{classify, Classification};
use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::hash::HashEngine;
use crate::models::{RawReference, Reference, ReferenceKind, Section};
use crate::normalizer::normalize;
use crate::stats::{percent, ArticleStatistics, ReferenceSummary};
use crate::tokenizer::tokenize;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ExtractorState {
    sections: Vec<Section>,
    raw_references: Vec<RawReference>,
    classification: Classification,
    references: Vec<Reference>,
    /// Raw reference index -> index into `references`
    reference_of_raw: FxHashMap<usize, usize>,
    unterminated_tags: usize,
    wiki_language: String,
}

impl ExtractorState {
    /// Fails only when a citation carries an ambiguous numbered field.
    pub fn extract(wikitext: &str, config: &ExtractorConfig) -> Result<Self> {
        let tokenized = tokenize(wikitext, config);
        let classification = classify(&tokenized.raw_references);
        let engine = HashEngine::new(config.hash_namespace());

        let body_indices = classification.body_references();
        let mut references = Vec::with_capacity(body_indices.len());
        let mut reference_of_raw = FxHashMap::default();
        for i in body_indices {
            let mut reference = normalize(&tokenized.raw_references[i], classification.flags[i])?;
            engine.apply(&mut reference);
            reference_of_raw.insert(i, references.len());
            references.push(reference);
        }

        debug!(
            raw = tokenized.raw_references.len(),
            references = references.len(),
            sections = tokenized.sections.len(),
            "Extracted references"
        );

        Ok(Self {
            sections: tokenized.sections,
            raw_references: tokenized.raw_references,
            classification,
            references,
            reference_of_raw,
            unterminated_tags: tokenized.unterminated_tags,
            wiki_language: config.wiki_language.clone(),
        })
    }

    pub fn number_of_raw_references(&self) -> usize {
        self.raw_references.len()
    }

    /// Named + content + general.
    pub fn number_of_references(&self) -> usize {
        let c = &self.classification.counts;
        c.number_of_named_references + c.number_of_content_references + c.number_of_general_references
    }

    pub fn has_references(&self) -> bool {
        self.number_of_references() > 0
    }

    pub fn raw_references(&self) -> &[RawReference] {
        &self.raw_references
    }

    /// Normalized content and general references, in document order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn content_references(&self) -> impl Iterator<Item = &Reference> {
        self.references_of_kind(ReferenceKind::Content)
    }

    pub fn general_references(&self) -> impl Iterator<Item = &Reference> {
        self.references_of_kind(ReferenceKind::General)
    }

    fn references_of_kind(&self, kind: ReferenceKind) -> impl Iterator<Item = &Reference> {
        let indices = match kind {
            ReferenceKind::Named => &self.classification.named,
            ReferenceKind::Content => &self.classification.content,
            ReferenceKind::General => &self.classification.general,
        };
        indices
            .iter()
            .filter_map(|i| self.reference_of_raw.get(i))
            .map(|&r| &self.references[r])
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// The normalized reference a named reference resolves to.
    pub fn resolve_named(&self, raw_index: usize) -> Option<&Reference> {
        let target = self.classification.named_targets.get(&raw_index)?;
        self.reference_of_raw
            .get(target)
            .map(|&r| &self.references[r])
    }

    pub fn number_of_hashed_references(&self) -> usize {
        self.references.iter().filter(|r| r.has_hash()).count()
    }

    /// Unique non-empty URLs, first occurrence order.
    pub fn reference_urls(&self) -> Vec<String> {
        unique(self.references.iter().filter_map(|r| r.url.as_deref()))
    }

    pub fn dois(&self) -> Vec<String> {
        unique(self.references.iter().filter_map(|r| r.doi.as_deref()))
    }

    pub fn first_level_domains(&self) -> Vec<String> {
        unique(
            self.references
                .iter()
                .filter_map(|r| r.first_level_domain_of_url.as_deref()),
        )
    }

    /// Occurrences per first-level domain, most frequent first.
    pub fn first_level_domain_counts(&self) -> Vec<(String, usize)> {
        sorted_counts(
            self.references
                .iter()
                .filter_map(|r| r.first_level_domain_of_url.as_deref()),
        )
    }

    /// Occurrences per first template name over body references.
    pub fn template_counts(&self) -> Vec<(String, usize)> {
        sorted_counts(
            self.references
                .iter()
                .map(|r| r.template_name.as_str()),
        )
    }

    /// Unique URLs and DOIs for the remote check dispatcher.
    pub fn check_targets(&self) -> Vec<CheckTarget> {
        self.reference_urls()
            .into_iter()
            .map(CheckTarget::Url)
            .chain(self.dois().into_iter().map(CheckTarget::Doi))
            .collect()
    }

    fn summaries(&self) -> Vec<ReferenceSummary> {
        self.raw_references
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let reference = match raw.kind {
                    ReferenceKind::Named => self.resolve_named(i),
                    _ => self.reference_of_raw.get(&i).map(|&r| &self.references[r]),
                };
                ReferenceSummary {
                    flags: self.classification.flags[i],
                    wikitext: raw.wikitext.clone(),
                    reference_name: raw.name.clone(),
                    md5hash: reference.and_then(|r| r.md5hash.clone()),
                    template_url: reference
                        .filter(|r| !r.template_name.is_empty())
                        .map(|r| r.template_url(&self.wiki_language)),
                }
            })
            .collect()
    }

    pub fn statistics(&self) -> ArticleStatistics {
        let hashed = self.number_of_hashed_references();
        ArticleStatistics {
            title: None,
            has_references: self.has_references(),
            number_of_references: self.number_of_references(),
            number_of_raw_references: self.number_of_raw_references(),
            number_of_sections_found: self.sections.len(),
            number_of_unterminated_ref_tags: self.unterminated_tags,
            counts: self.classification.counts,
            number_of_hashed_content_references: hashed,
            percent_of_content_references_with_a_hash: percent(hashed, self.references.len()),
            number_of_references_with_a_first_level_domain: self
                .references
                .iter()
                .filter(|r| r.first_level_domain_of_url.is_some())
                .count(),
            template_counts: self.template_counts(),
            first_level_domain_counts: self.first_level_domain_counts(),
            urls: self.reference_urls(),
            dois: self.dois(),
            reference_summaries: self.summaries(),
            references: self.references.clone(),
            checks: None,
        }
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    values
        .map(str::trim)
        .filter(|v| !v.is_empty() && seen.insert(*v))
        .map(str::to_string)
        .collect()
}

fn sorted_counts<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for value in values.filter(|v| !v.is_empty()) {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut counts: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
