//! Maps a recognized citation template onto a [`Reference`].
//!
//! Dispatch is keyed by [`TemplateKind`]: CS1 templates and `{{citation}}`
//! share the named-field mapping, `{{citeq}}`, `{{isbn}}` and `{{url}}` read
//! their first positional parameter. Field values keep their raw form except
//! for wiki-link cleanup and URL resolution.

use crate::archive::{detect_archive, internet_archive_id};
use crate::error::{ReferenceError, Result};
use crate::markup::{contains_wiki_link, first_external_link, first_level_domain, strip_wiki_links};
use crate::models::{Person, RawReference, Reference, Role, TemplateFlags};
use crate::template::{normalize_template_name, parse_template, Template, TemplateKind};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use url::Url;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

type UrlBuilder = fn(&Template) -> Option<String>;

/// Templates that may stand in for a URL value.
static URL_TEMPLATES: Lazy<FxHashMap<&'static str, UrlBuilder>> = Lazy::new(|| {
    let mut builders: FxHashMap<&'static str, UrlBuilder> = FxHashMap::default();
    builders.insert("google books", google_books_url);
    builders.insert("google book", google_books_url);
    builders
});

fn google_books_url(template: &Template) -> Option<String> {
    let id = template.get("id")?.trim();
    if id.is_empty() {
        return None;
    }
    Some(format!("https://books.google.com/books?id={id}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamePart {
    Surname,
    Given,
    Full,
}

/// Digit-free key shapes that carry a person name.
static PERSON_FIELDS: Lazy<FxHashMap<String, (Role, NamePart)>> = Lazy::new(|| {
    let mut fields = FxHashMap::default();
    for (key, part) in [
        ("last", NamePart::Surname),
        ("surname", NamePart::Surname),
        ("author_last", NamePart::Surname),
        ("author_surname", NamePart::Surname),
        ("first", NamePart::Given),
        ("given", NamePart::Given),
        ("author_first", NamePart::Given),
        ("author_given", NamePart::Given),
        ("author", NamePart::Full),
    ] {
        fields.insert(key.to_string(), (Role::Author, part));
    }
    for (prefix, role) in [
        ("editor", Role::Editor),
        ("translator", Role::Translator),
        ("interviewer", Role::Interviewer),
    ] {
        fields.insert(prefix.to_string(), (role, NamePart::Full));
        for (suffix, part) in [
            ("last", NamePart::Surname),
            ("surname", NamePart::Surname),
            ("first", NamePart::Given),
            ("given", NamePart::Given),
        ] {
            fields.insert(format!("{prefix}_{suffix}"), (role, part));
        }
    }
    fields
});

/// Extracts the single integer embedded in `string`.
///
/// One run of digits yields its value, no digits yield `None`, and two or
/// more separate runs are ambiguous. A run too long for `u64` saturates.
pub fn find_number(string: &str) -> Result<Option<u64>> {
    let mut runs = DIGIT_RUN.find_iter(string);
    let Some(first) = runs.next() else {
        return Ok(None);
    };
    if runs.next().is_some() {
        return Err(ReferenceError::AmbiguousNumber {
            input: string.to_string(),
        });
    }
    Ok(Some(first.as_str().parse().unwrap_or(u64::MAX)))
}

/// Resolves one URL-family value: a URL template yields its canonical URL,
/// anything that is not an absolute URL with a host becomes empty.
pub fn parse_url(raw: &str) -> String {
    let value = raw.trim();
    if value.starts_with("{{") {
        return url_from_template(value).unwrap_or_default();
    }
    if contains_wiki_link(value) {
        return String::new();
    }
    match Url::parse(value) {
        Ok(parsed) if parsed.has_host() => value.to_string(),
        _ => String::new(),
    }
}

pub fn url_from_template(value: &str) -> Option<String> {
    let template = parse_template(value);
    let builder = URL_TEMPLATES.get(normalize_template_name(&template.raw_name).as_str())?;
    builder(&template)
}

/// Named parameters with keys folded for lookup (`access-date` -> `access_date`).
struct Fields<'a> {
    values: FxHashMap<String, &'a str>,
}

impl<'a> Fields<'a> {
    fn new(template: &'a Template) -> Self {
        let mut values = FxHashMap::default();
        for (key, value) in &template.named {
            values.entry(fold_key(key)).or_insert(value.as_str());
        }
        Self { values }
    }

    /// First non-empty value among `keys`.
    fn raw(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|k| self.values.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        self.raw(keys).map(|v| v.to_string())
    }

    fn clean(&self, keys: &[&str]) -> Option<String> {
        self.raw(keys)
            .map(strip_wiki_links)
            .filter(|v| !v.is_empty())
    }

    fn url(&self, keys: &[&str]) -> Option<String> {
        self.raw(keys).map(parse_url)
    }
}

fn fold_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Key with digits removed, e.g. `editor1_last` -> `editor_last`.
fn key_shape(key: &str) -> String {
    let stripped: String = key.chars().filter(|c| !c.is_ascii_digit()).collect();
    stripped
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Default)]
struct NameParts {
    given: Option<String>,
    surname: Option<String>,
    full_name: Option<String>,
}

/// Collects numbered person fields. Ordinals run from 1 up to the first gap;
/// `last` and `last1` share ordinal 1 and the first declared value wins.
fn parse_persons(template: &Template) -> Result<(Vec<Person>, Vec<Person>)> {
    let mut by_role: BTreeMap<Role, BTreeMap<u64, NameParts>> = BTreeMap::new();

    for (key, value) in &template.named {
        let folded = fold_key(key);
        let Some(&(role, part)) = PERSON_FIELDS.get(&key_shape(&folded)) else {
            continue;
        };
        let ordinal = find_number(&folded)?.unwrap_or(1);
        let value = strip_wiki_links(value);
        if value.is_empty() {
            continue;
        }
        let parts = by_role.entry(role).or_default().entry(ordinal).or_default();
        let slot = match part {
            NamePart::Surname => &mut parts.surname,
            NamePart::Given => &mut parts.given,
            NamePart::Full => &mut parts.full_name,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    let mut without_role = Vec::new();
    let mut with_role = Vec::new();
    for (role, mut ordinals) in by_role {
        let target = if role == Role::Author {
            &mut without_role
        } else {
            &mut with_role
        };
        let mut n = 1;
        while let Some(parts) = ordinals.remove(&n) {
            if parts.given.is_some() || parts.surname.is_some() || parts.full_name.is_some() {
                target.push(Person {
                    role,
                    given: parts.given,
                    surname: parts.surname,
                    full_name: parts.full_name,
                    number_in_sequence: n,
                });
            }
            n += 1;
        }
    }

    Ok((without_role, with_role))
}

fn apply_citation_fields(reference: &mut Reference, template: &Template) -> Result<()> {
    let f = Fields::new(template);

    reference.title = f.clean(&["title"]);
    reference.trans_title = f.clean(&["trans_title"]);

    reference.url = f.url(&["url"]);
    reference.archive_url = f.url(&["archive_url", "archiveurl"]);
    reference.chapter_url = f.url(&[
        "chapter_url",
        "chapterurl",
        "contribution_url",
        "contributionurl",
        "section_url",
        "sectionurl",
    ]);
    reference.conference_url = f.url(&["conference_url", "conferenceurl"]);
    reference.lay_url = f.url(&["lay_url", "layurl"]);
    reference.transcript_url = f.url(&["transcript_url", "transcripturl"]);
    reference.url_status = f.text(&["url_status"]);

    reference.publisher = f.clean(&["publisher", "institution"]);
    reference.location = f.clean(&["location", "place", "publication_place"]);
    reference.language = f.clean(&["language", "lang"]);
    reference.periodical = f.clean(&["periodical", "journal", "magazine", "newspaper"]);
    reference.website = f.clean(&["website", "work"]);
    reference.series = f.clean(&["series"]);
    reference.edition = f.clean(&["edition"]);
    reference.volume = f.text(&["volume"]);
    reference.issue = f.text(&["issue", "number"]);
    reference.pages = f.text(&["pages", "page"]);
    reference.publication_date = f.text(&["date", "year"]);
    reference.access_date = f.text(&["access_date", "accessdate"]);
    reference.archive_date = f.text(&["archive_date", "archivedate"]);

    reference.doi = f.text(&["doi"]);
    reference.isbn = f.text(&["isbn", "isbn13"]);
    reference.pmid = f.text(&["pmid"]);
    reference.oclc = f.text(&["oclc"]);
    reference.lumped_authors = f.clean(&["authors", "vauthors", "people"]);

    let (without_role, with_role) = parse_persons(template)?;
    reference.persons_without_role = without_role;
    reference.persons_with_role = with_role;
    Ok(())
}

fn first_positional(template: &Template) -> Option<String> {
    template
        .get("1")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Normalizes a single template, with no surrounding reference context.
pub fn normalize_template(template: &Template) -> Result<Reference> {
    let mut reference = Reference {
        template_name: template.name.clone(),
        template_names: vec![template.name.clone()],
        first_parameter: template.first_parameter().map(|s| s.to_string()),
        ..Reference::default()
    };
    apply_template(&mut reference, template)?;
    derive_fields(&mut reference);
    Ok(reference)
}

fn apply_template(reference: &mut Reference, template: &Template) -> Result<()> {
    match template.kind() {
        TemplateKind::Cs1 | TemplateKind::Citation => apply_citation_fields(reference, template)?,
        TemplateKind::CiteQ => reference.wikidata_qid = first_positional(template),
        TemplateKind::Isbn => reference.isbn = first_positional(template),
        TemplateKind::Url => reference.url = first_positional(template).map(|v| parse_url(&v)),
        TemplateKind::BareUrl | TemplateKind::Other => {}
    }
    Ok(())
}

/// Builds the record for one content or general reference. The first supported
/// template is mapped; a reference without templates falls back to its first
/// external link.
pub fn normalize(raw: &RawReference, flags: TemplateFlags) -> Result<Reference> {
    let primary = raw.templates.iter().find(|t| t.kind().is_supported());
    let template_name = primary
        .or_else(|| raw.first_template())
        .map(|t| t.name.clone())
        .unwrap_or_default();

    let mut reference = Reference {
        template_name,
        template_names: raw.templates.iter().map(|t| t.name.clone()).collect(),
        reference_name: raw.name.clone(),
        first_parameter: raw.first_parameter().map(|s| s.to_string()),
        wikitext: raw.wikitext.clone(),
        flags,
        ..Reference::default()
    };

    match primary {
        Some(template) => apply_template(&mut reference, template)?,
        None if flags.plain_text_in_reference => {
            reference.url = first_external_link(&raw.body).map(|u| parse_url(&u));
        }
        None => {}
    }

    derive_fields(&mut reference);
    Ok(reference)
}

fn isbn_digits(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Fills fields computed from others: ISBN-10/13, first-level domain,
/// detected archives and the Internet Archive item id.
pub fn derive_fields(reference: &mut Reference) {
    if let Some(isbn) = reference.isbn.as_deref() {
        let digits = isbn_digits(isbn);
        match digits.len() {
            10 => reference.isbn_10 = Some(digits),
            13 => reference.isbn_13 = Some(digits),
            _ => {}
        }
    }

    let url = reference.url.as_deref().filter(|u| !u.is_empty());
    reference.first_level_domain_of_url = url.and_then(first_level_domain);
    reference.detected_archive_of_url = url.and_then(detect_archive);
    reference.internet_archive_id = url.and_then(internet_archive_id);
    reference.detected_archive_of_archive_url = reference
        .archive_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .and_then(detect_archive);
}
