use crate::models::{RawReference, ReferenceKind, TemplateFlags};
use crate::template::TemplateKind;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counters derived from tag shape and template count/name.
/// Template counts range over every reference with a body (content + general).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralCounts {
    pub number_of_named_references: usize,
    pub number_of_content_references: usize,
    pub number_of_general_references: usize,
    pub number_of_content_reference_with_at_least_one_template: usize,
    pub number_of_content_reference_with_no_templates: usize,
    pub number_of_multiple_template_references: usize,
    pub number_of_references_with_a_supported_template: usize,
    pub number_of_cs1_references: usize,
    pub number_of_citation_template_references: usize,
    pub number_of_citeq_references: usize,
    pub number_of_url_template_references: usize,
    pub number_of_bare_url_references: usize,
    pub number_of_isbn_template_references: usize,
    pub number_of_resolved_named_references: usize,
    pub number_of_dangling_named_references: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub named: Vec<usize>,
    pub content: Vec<usize>,
    pub general: Vec<usize>,
    /// Flags per raw reference, same indexing as the input
    pub flags: Vec<TemplateFlags>,
    /// Named reference index -> index of the content reference defining it
    pub named_targets: FxHashMap<usize, usize>,
    pub counts: StructuralCounts,
}

impl Classification {
    /// Indices of references that produce a normalized record, in document order.
    pub fn body_references(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.content.iter().chain(&self.general).copied().collect();
        indices.sort_unstable();
        indices
    }
}

pub fn template_flags(raw: &RawReference) -> TemplateFlags {
    if raw.is_named() {
        return TemplateFlags {
            is_named_reference: true,
            ..TemplateFlags::default()
        };
    }

    let count = raw.number_of_templates();
    let first = raw.first_template().map(|t| t.kind());
    TemplateFlags {
        is_named_reference: false,
        cs1_template_found: first == Some(TemplateKind::Cs1),
        citation_template_found: first == Some(TemplateKind::Citation),
        citeq_template_found: first == Some(TemplateKind::CiteQ),
        url_template_found: first == Some(TemplateKind::Url),
        isbn_template_found: first == Some(TemplateKind::Isbn),
        bare_url_template_found: raw
            .templates
            .iter()
            .any(|t| t.kind() == TemplateKind::BareUrl),
        multiple_templates_found: count > 1,
        plain_text_in_reference: count == 0,
    }
}

pub fn has_supported_template(raw: &RawReference) -> bool {
    raw.templates.iter().any(|t| t.kind().is_supported())
}

pub fn classify(raw_references: &[RawReference]) -> Classification {
    let mut classification = Classification {
        flags: Vec::with_capacity(raw_references.len()),
        ..Classification::default()
    };

    // only content references seen so far can define a name
    let mut definitions: FxHashMap<&str, usize> = FxHashMap::default();
    let counts = &mut classification.counts;
    for (i, raw) in raw_references.iter().enumerate() {
        let flags = template_flags(raw);
        classification.flags.push(flags);

        match raw.kind {
            ReferenceKind::Named => {
                classification.named.push(i);
                counts.number_of_named_references += 1;
                match raw.name.as_deref().and_then(|n| definitions.get(n)) {
                    Some(&target) => {
                        classification.named_targets.insert(i, target);
                        counts.number_of_resolved_named_references += 1;
                    }
                    None => counts.number_of_dangling_named_references += 1,
                }
                continue;
            }
            ReferenceKind::Content => {
                if let Some(name) = raw.name.as_deref() {
                    definitions.entry(name).or_insert(i);
                }
                classification.content.push(i);
                counts.number_of_content_references += 1;
            }
            ReferenceKind::General => {
                classification.general.push(i);
                counts.number_of_general_references += 1;
            }
        }

        if flags.plain_text_in_reference {
            counts.number_of_content_reference_with_no_templates += 1;
        } else {
            counts.number_of_content_reference_with_at_least_one_template += 1;
        }
        if flags.multiple_templates_found {
            counts.number_of_multiple_template_references += 1;
        }
        if has_supported_template(raw) {
            counts.number_of_references_with_a_supported_template += 1;
        }
        if flags.cs1_template_found {
            counts.number_of_cs1_references += 1;
        }
        if flags.citation_template_found {
            counts.number_of_citation_template_references += 1;
        }
        if flags.citeq_template_found {
            counts.number_of_citeq_references += 1;
        }
        if flags.url_template_found {
            counts.number_of_url_template_references += 1;
        }
        if flags.bare_url_template_found {
            counts.number_of_bare_url_references += 1;
        }
        if flags.isbn_template_found {
            counts.number_of_isbn_template_references += 1;
        }
    }

    debug!(
        named = classification.named.len(),
        content = classification.content.len(),
        general = classification.general.len(),
        "Classified references"
    );

    classification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::tokenizer::tokenize;

    fn classify_text(text: &str) -> (Vec<RawReference>, Classification) {
        let raw = tokenize(text, &ExtractorConfig::default()).raw_references;
        let classification = classify(&raw);
        (raw, classification)
    }

    #[test]
    fn partition_named_content_general() {
        let text = "<ref name=\"a\">{{citeq|Q1}}</ref><ref name=\"a\"/>\n== Sources ==\n* {{cite book|title=T}}\n";
        let (_, c) = classify_text(text);
        assert_eq!(c.content, vec![0]);
        assert_eq!(c.named, vec![1]);
        assert_eq!(c.general, vec![2]);
        assert_eq!(c.body_references(), vec![0, 2]);
        assert_eq!(c.counts.number_of_cs1_references, 1);
        assert_eq!(c.counts.number_of_citeq_references, 1);
    }

    #[test]
    fn named_reference_resolution() {
        let text = "<ref name=\"a\">{{citeq|Q1}}</ref><ref name=\"a\"/><ref name=\"missing\"/>";
        let (_, c) = classify_text(text);
        assert_eq!(c.counts.number_of_named_references, 2);
        assert_eq!(c.counts.number_of_resolved_named_references, 1);
        assert_eq!(c.counts.number_of_dangling_named_references, 1);
        assert_eq!(c.named_targets.get(&1), Some(&0));
    }

    #[test]
    fn later_definition_leaves_named_reference_dangling() {
        let text = "Text<ref name=\"late\"/>\n<references>\n<ref name=\"late\">{{citeq|Q9}}</ref>\n</references>";
        let (_, c) = classify_text(text);
        assert_eq!(c.counts.number_of_resolved_named_references, 0);
        assert_eq!(c.counts.number_of_dangling_named_references, 1);
        assert!(c.named_targets.is_empty());

        let (_, c) = classify_text("<ref name=\"a\"/> text <ref name=\"a\">{{citeq|Q1}}</ref><ref name=\"a\"/>");
        assert_eq!(c.counts.number_of_resolved_named_references, 1);
        assert_eq!(c.counts.number_of_dangling_named_references, 1);
        assert_eq!(c.named_targets.get(&2), Some(&1));
    }

    #[test]
    fn template_count_flags_are_exclusive() {
        let (_, c) = classify_text(
            "<ref>Plain text</ref><ref>{{cite web|url=http://a.com}}</ref><ref>{{cite web|url=http://b.com}}{{dead link}}</ref>",
        );
        let plain = c.flags[0];
        assert!(plain.plain_text_in_reference && !plain.multiple_templates_found);
        let single = c.flags[1];
        assert!(!single.plain_text_in_reference && !single.multiple_templates_found);
        let multiple = c.flags[2];
        assert!(!multiple.plain_text_in_reference && multiple.multiple_templates_found);
        assert_eq!(c.counts.number_of_content_reference_with_no_templates, 1);
        assert_eq!(c.counts.number_of_content_reference_with_at_least_one_template, 2);
        assert_eq!(c.counts.number_of_multiple_template_references, 1);
    }

    #[test]
    fn unsupported_template_is_still_content() {
        let (_, c) = classify_text("<ref>{{sfn|Smith|2001|p=4}}</ref>");
        assert_eq!(c.counts.number_of_content_references, 1);
        assert_eq!(c.counts.number_of_references_with_a_supported_template, 0);
        assert_eq!(c.counts.number_of_content_reference_with_at_least_one_template, 1);
    }

    #[test]
    fn kind_flags_follow_first_template() {
        let (_, c) = classify_text(
            "<ref>{{isbn|1234}}</ref><ref>{{url|http://x.org}}</ref><ref>{{Citation|title=a}}</ref><ref>http://x.org {{Bare URL inline|date=2020}}</ref>",
        );
        assert!(c.flags[0].isbn_template_found);
        assert!(c.flags[1].url_template_found);
        assert!(c.flags[2].citation_template_found);
        assert!(c.flags[3].bare_url_template_found);
        assert_eq!(c.counts.number_of_isbn_template_references, 1);
        assert_eq!(c.counts.number_of_url_template_references, 1);
        assert_eq!(c.counts.number_of_citation_template_references, 1);
        assert_eq!(c.counts.number_of_bare_url_references, 1);
        assert_eq!(c.counts.number_of_references_with_a_supported_template, 3);
    }

    #[test]
    fn cite_dictionary_classifies_like_cite_encyclopedia() {
        let (_, a) = classify_text("<ref>{{cite dictionary|title=x}}</ref>");
        let (_, b) = classify_text("<ref>{{cite encyclopedia|title=x}}</ref>");
        assert_eq!(a.flags, b.flags);
        assert_eq!(a.counts, b.counts);
    }

    #[test]
    fn named_flags_only_mark_named() {
        let (_, c) = classify_text("<ref name=\"x\"/>");
        assert_eq!(
            c.flags[0],
            TemplateFlags {
                is_named_reference: true,
                ..TemplateFlags::default()
            }
        );
    }
}
