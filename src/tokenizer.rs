use crate::config::ExtractorConfig;
use crate::markup::strip_comments;
use crate::models::{RawReference, ReferenceKind, Section};
use crate::template::{brace_balance, extract_templates};
use memchr::memchr;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static SECTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(={2,})[ \t]*(.+?)[ \t]*={2,}[ \t]*\r?$").unwrap());

static NAME_ATTR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s/>"']+))"#).unwrap()
});

/// Output of one tokenizer pass, references in document order.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub raw_references: Vec<RawReference>,
    pub sections: Vec<Section>,
    /// `<ref>` tags with no closing tag, read to the end of the document
    pub unterminated_tags: usize,
}

pub fn tokenize(wikitext: &str, config: &ExtractorConfig) -> Tokenized {
    let text = strip_comments(wikitext);

    let mut positioned: Vec<(usize, RawReference)> = Vec::new();
    let unterminated_tags = scan_ref_tags(&text, &mut positioned);

    let sections = extract_reference_sections(&text, config);
    for section in &sections {
        collect_general_references(&text, section, &mut positioned);
    }

    // stable, so a general item keeps its place relative to refs inside it
    positioned.sort_by_key(|(pos, _)| *pos);

    debug!(
        references = positioned.len(),
        sections = sections.len(),
        unterminated = unterminated_tags,
        "Tokenized wikitext"
    );

    Tokenized {
        raw_references: positioned.into_iter().map(|(_, r)| r).collect(),
        sections,
        unterminated_tags,
    }
}

fn scan_ref_tags(text: &str, out: &mut Vec<(usize, RawReference)>) -> usize {
    let bytes = text.as_bytes();
    let mut pos = 0;
    let mut unterminated = 0;

    while let Some(offset) = memchr(b'<', &bytes[pos..]) {
        let start = pos + offset;
        if !is_ref_open(bytes, start) {
            pos = start + 1;
            continue;
        }

        let Some(gt) = memchr(b'>', &bytes[start..]).map(|o| start + o) else {
            break;
        };
        let open_tag = &text[start..=gt];
        let name = parse_name_attribute(open_tag);
        let self_closing = open_tag[..open_tag.len() - 1].trim_end().ends_with('/');

        if self_closing {
            if name.is_some() {
                out.push((start, named_reference(open_tag, name)));
            }
            pos = gt + 1;
            continue;
        }

        let body_start = gt + 1;
        let (body_end, tag_end) = match find_ref_close(bytes, body_start) {
            Some(span) => span,
            None => {
                debug!(offset = start, "Unterminated <ref>, reading to end of document");
                unterminated += 1;
                (bytes.len(), bytes.len())
            }
        };

        let wikitext = &text[start..tag_end];
        let body = &text[body_start..body_end];
        if body.trim().is_empty() {
            if name.is_some() {
                out.push((start, named_reference(wikitext, name)));
            }
        } else {
            out.push((
                start,
                RawReference {
                    wikitext: wikitext.to_string(),
                    body: body.to_string(),
                    kind: ReferenceKind::Content,
                    name,
                    templates: extract_templates(body),
                    section: None,
                },
            ));
        }
        pos = tag_end;
    }

    unterminated
}

fn named_reference(wikitext: &str, name: Option<String>) -> RawReference {
    RawReference {
        wikitext: wikitext.to_string(),
        body: String::new(),
        kind: ReferenceKind::Named,
        name,
        templates: Vec::new(),
        section: None,
    }
}

/// `<ref` followed by whitespace, `>` or `/`; rejects `<references>`.
fn is_ref_open(bytes: &[u8], start: usize) -> bool {
    if start + 4 >= bytes.len() {
        return false;
    }
    if !bytes[start..start + 4].eq_ignore_ascii_case(b"<ref") {
        return false;
    }
    matches!(bytes[start + 4], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
}

/// Returns (start of `</ref`, end of the closing tag).
fn find_ref_close(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some(offset) = memchr(b'<', &bytes[pos..]) {
        let start = pos + offset;
        if start + 5 <= bytes.len() && bytes[start..start + 5].eq_ignore_ascii_case(b"</ref") {
            let mut i = start + 5;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'>' {
                return Some((start, i + 1));
            }
        }
        pos = start + 1;
    }
    None
}

fn parse_name_attribute(open_tag: &str) -> Option<String> {
    let caps = NAME_ATTR_REGEX.captures(open_tag)?;
    let value = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

struct Heading {
    level: usize,
    title: String,
    start: usize,
    end: usize,
}

/// Sections under reference-like headings. A section runs to the next heading
/// of the same or a higher level, so its subsections belong to it.
pub fn extract_reference_sections(text: &str, config: &ExtractorConfig) -> Vec<Section> {
    let headings: Vec<Heading> = SECTION_REGEX
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(Heading {
                level: c[1].len(),
                title: c[2].trim().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect();

    let mut sections = Vec::new();
    let mut covered_until = 0;
    for (i, heading) in headings.iter().enumerate() {
        if heading.start < covered_until || !config.is_reference_heading(&heading.title) {
            continue;
        }
        let end = headings[i + 1..]
            .iter()
            .find(|h| h.level <= heading.level)
            .map(|h| h.start)
            .unwrap_or(text.len());
        covered_until = end;
        sections.push(Section {
            heading: heading.title.clone(),
            level: heading.level,
            start: heading.end,
            end,
        });
    }
    sections
}

/// Each `*` or `#` list item is one general reference. An item continues onto
/// following lines while it has an open `{{`.
fn collect_general_references(
    text: &str,
    section: &Section,
    out: &mut Vec<(usize, RawReference)>,
) {
    let body = section.body(text);
    let lines: Vec<(usize, &str)> = body
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut i = 0;
    while i < lines.len() {
        let (offset, line) = lines[i];
        i += 1;
        if !line.starts_with(['*', '#']) {
            continue;
        }

        let mut item = line.to_string();
        let mut balance = brace_balance(line);
        while balance > 0 && i < lines.len() {
            let next = lines[i].1;
            balance += brace_balance(next);
            item.push_str(next);
            i += 1;
        }

        let content = item.trim_start_matches(['*', '#', ':', ';']).trim();
        if content.is_empty() {
            continue;
        }

        out.push((
            section.start + offset,
            RawReference {
                wikitext: item.trim_end().to_string(),
                body: content.to_string(),
                kind: ReferenceKind::General,
                name: None,
                templates: extract_templates(content),
                section: Some(section.heading.clone()),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Tokenized {
        tokenize(text, &ExtractorConfig::default())
    }

    #[test]
    fn content_and_named_references() {
        let t = run("<ref>{{citeq|Q1}}</ref> text <ref name=\"INE\"/>");
        assert_eq!(t.raw_references.len(), 2);
        assert_eq!(t.raw_references[0].kind, ReferenceKind::Content);
        assert_eq!(t.raw_references[0].body, "{{citeq|Q1}}");
        assert_eq!(t.raw_references[1].kind, ReferenceKind::Named);
        assert_eq!(t.raw_references[1].name.as_deref(), Some("INE"));
    }

    #[test]
    fn named_tag_with_body_is_content() {
        let t = run("<ref name=\"INE\">{{cite web|url=http://ine.cl}}</ref>");
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].kind, ReferenceKind::Content);
        assert_eq!(t.raw_references[0].name.as_deref(), Some("INE"));
        assert_eq!(
            t.raw_references[0].wikitext,
            "<ref name=\"INE\">{{cite web|url=http://ine.cl}}</ref>"
        );
    }

    #[test]
    fn name_attribute_forms() {
        assert_eq!(parse_name_attribute("<ref name=abc>"), Some("abc".to_string()));
        assert_eq!(parse_name_attribute("<ref name='a b'/>"), Some("a b".to_string()));
        assert_eq!(
            parse_name_attribute("<ref group=note name = \"x\" />"),
            Some("x".to_string())
        );
        assert_eq!(parse_name_attribute("<ref>"), None);
    }

    #[test]
    fn empty_named_tag_pair_is_named() {
        let t = run("<ref name=\"x\"></ref>");
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].kind, ReferenceKind::Named);
    }

    #[test]
    fn nameless_empty_tags_are_ignored() {
        let t = run("<ref/><ref></ref><ref />");
        assert!(t.raw_references.is_empty());
    }

    #[test]
    fn references_tag_is_not_a_ref() {
        let t = run("<references>\n<ref name=\"a\">Plain text source</ref>\n</references>");
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].body, "Plain text source");
    }

    #[test]
    fn case_insensitive_tags() {
        let t = run("<REF>{{citeq|Q5}}</Ref >");
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].first_parameter(), Some("Q5"));
    }

    #[test]
    fn unterminated_ref_extends_to_end() {
        let t = run("a<ref>{{citeq|Q1}} trailing text");
        assert_eq!(t.unterminated_tags, 1);
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].body, "{{citeq|Q1}} trailing text");
    }

    #[test]
    fn commented_refs_are_ignored() {
        let t = run("<!-- <ref>{{citeq|Q1}}</ref> --><ref>{{citeq|Q2}}</ref>");
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].first_parameter(), Some("Q2"));
    }

    #[test]
    fn sections_limited_to_reference_headings() {
        let text = "Intro\n== History ==\n* not a ref\n== Bibliography ==\n* {{cite book|title=A}}\n=== Journals ===\n* {{cite journal|title=B}}\n== External links ==\n* [http://x.org X]\n";
        let t = run(text);
        assert_eq!(t.sections.len(), 1);
        assert_eq!(t.sections[0].heading, "Bibliography");
        assert_eq!(t.raw_references.len(), 2);
        assert!(t
            .raw_references
            .iter()
            .all(|r| r.kind == ReferenceKind::General));
        assert_eq!(t.raw_references[1].first_template_name(), Some("cite journal"));
    }

    #[test]
    fn multi_line_list_item_is_one_reference() {
        let text = "== Further reading ==\n* {{cite book\n| last = Smith\n| title = A Book\n}}\n* Plain entry, 1999.\n";
        let t = run(text);
        assert_eq!(t.raw_references.len(), 2);
        assert_eq!(t.raw_references[0].number_of_templates(), 1);
        assert_eq!(t.raw_references[0].templates[0].get("last"), Some("Smith"));
        assert_eq!(t.raw_references[1].body, "Plain entry, 1999.");
        assert_eq!(t.raw_references[1].section.as_deref(), Some("Further reading"));
    }

    #[test]
    fn reflist_only_section_has_no_general_references() {
        let text = "Body.<ref>{{citeq|Q1}}</ref>\n== References ==\n{{Reflist}}\n";
        let t = run(text);
        assert_eq!(t.sections.len(), 1);
        assert_eq!(t.raw_references.len(), 1);
        assert_eq!(t.raw_references[0].kind, ReferenceKind::Content);
    }

    #[test]
    fn crlf_line_endings() {
        let t = run("Body\r\n== References ==\r\n* {{cite book|title=T|oclc=1}}\r\n* Plain entry\r\n");
        assert_eq!(t.sections.len(), 1);
        assert_eq!(t.sections[0].heading, "References");
        assert_eq!(t.raw_references.len(), 2);
        assert_eq!(t.raw_references[0].kind, ReferenceKind::General);
        assert_eq!(t.raw_references[0].templates[0].get("oclc"), Some("1"));
        assert_eq!(t.raw_references[1].body, "Plain entry");
    }

    #[test]
    fn no_sections_in_plain_text() {
        let t = run("test");
        assert!(t.sections.is_empty());
        assert!(t.raw_references.is_empty());
    }
}
