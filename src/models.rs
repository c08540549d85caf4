use crate::archive::KnownArchive;
use crate::template::Template;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Self-closing `<ref name="X"/>`, or a named tag with an empty body
    Named,
    /// `<ref>` with a body
    Content,
    /// List item under a reference-like heading
    General,
}

/// A heading and the byte span of the markup it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub level: usize,
    pub start: usize,
    pub end: usize,
}

impl Section {
    pub fn body<'a>(&self, wikitext: &'a str) -> &'a str {
        &wikitext[self.start..self.end]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReference {
    /// Markup as found, tags included
    pub wikitext: String,
    /// Text between the tags, or the list item text for general references
    pub body: String,
    pub kind: ReferenceKind,
    pub name: Option<String>,
    pub templates: Vec<Template>,
    /// Heading of the section a general reference came from
    pub section: Option<String>,
}

impl RawReference {
    pub fn number_of_templates(&self) -> usize {
        self.templates.len()
    }

    pub fn first_template(&self) -> Option<&Template> {
        self.templates.first()
    }

    pub fn first_template_name(&self) -> Option<&str> {
        self.first_template().map(|t| t.name.as_str())
    }

    pub fn first_parameter(&self) -> Option<&str> {
        self.first_template().and_then(|t| t.first_parameter())
    }

    pub fn is_named(&self) -> bool {
        self.kind == ReferenceKind::Named
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Editor,
    Translator,
    Interviewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub role: Role,
    pub given: Option<String>,
    pub surname: Option<String>,
    /// Whole-name fields such as `author2` or `editor1`
    pub full_name: Option<String>,
    pub number_in_sequence: u64,
}

/// Structural flags, derived from tag shape and template count/name only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFlags {
    pub is_named_reference: bool,
    pub cs1_template_found: bool,
    pub citation_template_found: bool,
    pub citeq_template_found: bool,
    pub url_template_found: bool,
    pub bare_url_template_found: bool,
    pub isbn_template_found: bool,
    pub multiple_templates_found: bool,
    pub plain_text_in_reference: bool,
}

/// A normalized citation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub template_name: String,
    pub template_names: Vec<String>,
    pub reference_name: Option<String>,
    pub first_parameter: Option<String>,
    pub wikitext: String,

    pub title: Option<String>,
    pub trans_title: Option<String>,
    pub url: Option<String>,
    pub archive_url: Option<String>,
    pub chapter_url: Option<String>,
    pub conference_url: Option<String>,
    pub lay_url: Option<String>,
    pub transcript_url: Option<String>,
    pub url_status: Option<String>,
    pub first_level_domain_of_url: Option<String>,
    pub first_level_domain_of_url_hash: Option<String>,
    pub internet_archive_id: Option<String>,

    pub publisher: Option<String>,
    pub location: Option<String>,
    pub language: Option<String>,
    pub periodical: Option<String>,
    pub website: Option<String>,
    pub series: Option<String>,
    pub edition: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub publication_date: Option<String>,
    pub access_date: Option<String>,
    pub archive_date: Option<String>,

    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub pmid: Option<String>,
    pub oclc: Option<String>,
    pub wikidata_qid: Option<String>,

    pub persons_without_role: Vec<Person>,
    pub persons_with_role: Vec<Person>,
    pub lumped_authors: Option<String>,

    pub detected_archive_of_url: Option<KnownArchive>,
    pub detected_archive_of_archive_url: Option<KnownArchive>,

    pub md5hash: Option<String>,
    #[serde(flatten)]
    pub flags: TemplateFlags,
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl Reference {
    pub fn has_hash(&self) -> bool {
        is_present(&self.md5hash)
    }

    pub fn has_first_level_domain_url_hash(&self) -> bool {
        is_present(&self.first_level_domain_of_url_hash)
    }

    pub fn is_named_reference(&self) -> bool {
        self.flags.is_named_reference
    }

    pub fn template_url(&self, wiki_language: &str) -> String {
        format!(
            "https://{}.wikipedia.org/wiki/Template:{}",
            wiki_language, self.template_name
        )
    }

    pub fn editors(&self) -> impl Iterator<Item = &Person> {
        self.persons_with_role
            .iter()
            .filter(|p| p.role == Role::Editor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_hash_treats_empty_and_none_as_absent() {
        let mut reference = Reference {
            template_name: "cite book".to_string(),
            ..Reference::default()
        };
        assert!(!reference.has_hash());
        reference.md5hash = Some(String::new());
        assert!(!reference.has_hash());
        reference.md5hash = Some("123".to_string());
        assert!(reference.has_hash());
    }

    #[test]
    fn template_url_uses_language_edition() {
        let reference = Reference {
            template_name: "cite book".to_string(),
            ..Reference::default()
        };
        assert_eq!(
            reference.template_url("en"),
            "https://en.wikipedia.org/wiki/Template:cite book"
        );
    }

    #[test]
    fn raw_reference_accessors() {
        let raw = RawReference {
            wikitext: "<ref>{{citeq|Q1}}</ref>".to_string(),
            body: "{{citeq|Q1}}".to_string(),
            kind: ReferenceKind::Content,
            name: None,
            templates: crate::template::extract_templates("{{citeq|Q1}}"),
            section: None,
        };
        assert_eq!(raw.number_of_templates(), 1);
        assert_eq!(raw.first_template_name(), Some("citeq"));
        assert_eq!(raw.first_parameter(), Some("Q1"));
        assert!(!raw.is_named());
    }

    #[test]
    fn flags_serialize_flat() {
        let reference = Reference {
            flags: TemplateFlags {
                cs1_template_found: true,
                ..TemplateFlags::default()
            },
            ..Reference::default()
        };
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["cs1_template_found"], true);
        assert_eq!(json["is_named_reference"], false);
    }
}
