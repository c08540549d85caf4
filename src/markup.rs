use once_cell::sync::Lazy;
use regex::Regex;
use url::{Host, Url};

pub static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^|\]]+?)(?:\|[^\]]*)?\]\]").unwrap());

static EXTERNAL_LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[((?:https?|ftp)://[^\s\]]+)(?:\s[^\]]*)?\]").unwrap());

static BARE_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:https?|ftp)://[^\s\]\[<>"|{}]+"#).unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").unwrap());

/// Second-level labels that sit under a country code, e.g. `co.uk`, `ac.nz`.
static GENERIC_SECOND_LEVEL: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "org", "or", "ne", "go"];

/// Replaces `[[Target|Display]]` and `[[Target]]` with `Target`.
pub fn strip_wiki_links(text: &str) -> String {
    LINK_REGEX.replace_all(text, "$1").trim().to_string()
}

pub fn contains_wiki_link(text: &str) -> bool {
    text.contains("[[")
}

/// Drops `<!-- ... -->` blocks; an unterminated comment runs to the end.
pub fn strip_comments(text: &str) -> String {
    if !text.contains("<!--") {
        return text.to_string();
    }
    COMMENT_REGEX.replace_all(text, "").into_owned()
}

/// First `[http://... label]` link, else the first bare URL.
pub fn first_external_link(text: &str) -> Option<String> {
    if let Some(c) = EXTERNAL_LINK_REGEX.captures(text) {
        return Some(c[1].to_string());
    }
    BARE_URL_REGEX.find(text).map(|m| m.as_str().to_string())
}

/// Registrable domain of a URL's host, e.g. `www.stereogum.com` -> `stereogum.com`.
pub fn first_level_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    match parsed.host()? {
        Host::Domain(domain) => registrable_domain(domain),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

fn registrable_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => None,
        1 => Some(labels[0].to_string()),
        n => {
            let tld = labels[n - 1];
            let second = labels[n - 2];
            let take = if n >= 3 && tld.len() == 2 && GENERIC_SECOND_LEVEL.contains(&second) {
                3
            } else {
                2
            };
            Some(labels[n - take..].join("."))
        }
    }
}
