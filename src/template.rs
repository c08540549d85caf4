use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One `{{...}}` invocation. Named parameters keep declaration order; a
/// repeated key keeps its first value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Lower-cased, alias-folded name
    pub name: String,
    /// Name as written
    pub raw_name: String,
    pub positional: Vec<String>,
    pub named: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Cs1,
    Citation,
    CiteQ,
    Isbn,
    Url,
    BareUrl,
    Other,
}

impl TemplateKind {
    /// Kinds the normalizer maps onto a reference.
    pub fn is_supported(&self) -> bool {
        !matches!(self, TemplateKind::BareUrl | TemplateKind::Other)
    }
}

static CS1_TEMPLATES: &[&str] = &[
    "cite arxiv",
    "cite av media",
    "cite av media notes",
    "cite biorxiv",
    "cite book",
    "cite citeseerx",
    "cite conference",
    "cite encyclopedia",
    "cite episode",
    "cite interview",
    "cite journal",
    "cite magazine",
    "cite mailing list",
    "cite map",
    "cite news",
    "cite newsgroup",
    "cite podcast",
    "cite press release",
    "cite report",
    "cite serial",
    "cite sign",
    "cite speech",
    "cite ssrn",
    "cite tech report",
    "cite thesis",
    "cite web",
];

static TEMPLATE_ALIASES: &[(&str, &str)] = &[
    ("cite dictionary", "cite encyclopedia"),
    ("cite q", "citeq"),
    ("cite pressrelease", "cite press release"),
    ("cite techreport", "cite tech report"),
    ("cite mailinglist", "cite mailing list"),
    ("cite video", "cite av media"),
];

static TEMPLATE_KINDS: Lazy<FxHashMap<&'static str, TemplateKind>> = Lazy::new(|| {
    let mut kinds: FxHashMap<&'static str, TemplateKind> = CS1_TEMPLATES
        .iter()
        .map(|name| (*name, TemplateKind::Cs1))
        .collect();
    kinds.insert("citation", TemplateKind::Citation);
    kinds.insert("citeq", TemplateKind::CiteQ);
    kinds.insert("isbn", TemplateKind::Isbn);
    kinds.insert("url", TemplateKind::Url);
    for name in [
        "bare url inline",
        "bare url",
        "bare urls",
        "cleanup bare urls",
        "cleanup-bare urls",
    ] {
        kinds.insert(name, TemplateKind::BareUrl);
    }
    kinds
});

static ALIASES: Lazy<FxHashMap<&'static str, &'static str>> =
    Lazy::new(|| TEMPLATE_ALIASES.iter().copied().collect());

/// Lower-cases, folds underscores and runs of whitespace, then resolves aliases.
pub fn normalize_template_name(raw: &str) -> String {
    let folded = raw
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    match ALIASES.get(folded.as_str()) {
        Some(canonical) => canonical.to_string(),
        None => folded,
    }
}

impl Template {
    pub fn kind(&self) -> TemplateKind {
        TEMPLATE_KINDS
            .get(self.name.as_str())
            .copied()
            .unwrap_or(TemplateKind::Other)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Looks up a named parameter, falling back to the 1-based positional
    /// index for numeric keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some((_, value)) = self.named.iter().find(|(k, _)| k == key) {
            return Some(value.as_str());
        }
        key.parse::<usize>()
            .ok()
            .filter(|&n| n >= 1)
            .and_then(|n| self.positional.get(n - 1))
            .map(|s| s.as_str())
    }

    pub fn first_parameter(&self) -> Option<&str> {
        self.positional.first().map(|s| s.as_str())
    }
}

/// Parses a single invocation, with or without its outer braces.
pub fn parse_template(text: &str) -> Template {
    let trimmed = text.trim();
    let inner = match trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        Some(inner) => inner,
        None => trimmed,
    };

    let segments = split_at_depth_zero(inner, b'|');
    let raw_name = segments[0].trim();
    if raw_name.is_empty() {
        return Template::default();
    }

    let mut template = Template {
        name: normalize_template_name(raw_name),
        raw_name: raw_name.to_string(),
        ..Template::default()
    };

    for segment in &segments[1..] {
        match find_at_depth_zero(segment, b'=') {
            Some(eq_pos) => {
                let key = segment[..eq_pos].trim().to_lowercase();
                let value = segment[eq_pos + 1..].trim();
                if key.is_empty() || template.named.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                template.named.push((key, value.to_string()));
            }
            None => template.positional.push(segment.trim().to_string()),
        }
    }

    template
}

/// Every top-level `{{...}}` in `text`, in order. Unterminated openings are skipped.
pub fn extract_templates(text: &str) -> Vec<Template> {
    let bytes = text.as_bytes();
    let mut templates = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            match find_matching_close(bytes, i) {
                Some(close_pos) => {
                    let template = parse_template(&text[i..close_pos + 2]);
                    if !template.is_empty() {
                        templates.push(template);
                    }
                    i = close_pos + 2;
                }
                None => i += 2,
            }
        } else {
            i += 1;
        }
    }

    templates
}

/// Byte offset of the `}}` closing the `{{` at `start`.
pub(crate) fn find_matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'}' && bytes[i + 1] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

/// Net `{{`/`}}` balance of a fragment; positive while a template is open.
pub(crate) fn brace_balance(text: &str) -> i32 {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'}' && bytes[i + 1] == b'}' {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    depth
}

/// Position of `needle` outside nested `{{ }}` and `[[ ]]`.
fn find_at_depth_zero(content: &str, needle: u8) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() && is_open_pair(bytes, i) {
            depth += 1;
            i += 2;
        } else if i + 1 < bytes.len() && is_close_pair(bytes, i) {
            depth = (depth - 1).max(0);
            i += 2;
        } else if bytes[i] == needle && depth == 0 {
            return Some(i);
        } else {
            i += 1;
        }
    }
    None
}

/// Splits on `sep` at depth 0, respecting nested `{{ }}` and `[[ ]]`.
fn split_at_depth_zero(content: &str, sep: u8) -> Vec<&str> {
    let mut segments = Vec::new();
    let bytes = content.as_bytes();
    let mut depth: i32 = 0;
    let mut last_split = 0;
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() && is_open_pair(bytes, i) {
            depth += 1;
            i += 2;
        } else if i + 1 < bytes.len() && is_close_pair(bytes, i) {
            depth = (depth - 1).max(0);
            i += 2;
        } else if bytes[i] == sep && depth == 0 {
            segments.push(&content[last_split..i]);
            last_split = i + 1;
            i += 1;
        } else {
            i += 1;
        }
    }
    segments.push(&content[last_split..]);
    segments
}

fn is_open_pair(bytes: &[u8], i: usize) -> bool {
    (bytes[i] == b'{' && bytes[i + 1] == b'{') || (bytes[i] == b'[' && bytes[i + 1] == b'[')
}

fn is_close_pair(bytes: &[u8], i: usize) -> bool {
    (bytes[i] == b'}' && bytes[i + 1] == b'}') || (bytes[i] == b']' && bytes[i + 1] == b']')
}
