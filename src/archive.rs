use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownArchive {
    ArchiveOrg,
    ArchiveToday,
    ArchiveIs,
    WebcitationOrg,
}

impl KnownArchive {
    pub fn label(&self) -> &'static str {
        match self {
            KnownArchive::ArchiveOrg => "Archive.org",
            KnownArchive::ArchiveToday => "Archive.today",
            KnownArchive::ArchiveIs => "Archive.is",
            KnownArchive::WebcitationOrg => "Webcitation.org",
        }
    }
}

/// Host patterns, checked in order. archive.is has its own entry ahead of
/// the archive.today mirrors.
static ARCHIVE_HOSTS: Lazy<Vec<(Regex, KnownArchive)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^(?:web|wayback)\.archive\.org$").unwrap(),
            KnownArchive::ArchiveOrg,
        ),
        (
            Regex::new(r"^(?:www\.)?archive\.is$").unwrap(),
            KnownArchive::ArchiveIs,
        ),
        (
            Regex::new(r"^(?:www\.)?archive\.(?:today|ph|li|vn|fo|md)$").unwrap(),
            KnownArchive::ArchiveToday,
        ),
        (
            Regex::new(r"^(?:www\.)?webcitation\.org$").unwrap(),
            KnownArchive::WebcitationOrg,
        ),
    ]
});

static INTERNET_ARCHIVE_DETAILS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/details/([^/?#]+)").unwrap());

pub fn detect_archive(url: &str) -> Option<KnownArchive> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    ARCHIVE_HOSTS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&host))
        .map(|(_, archive)| *archive)
}

/// Item identifier of an `archive.org/details/<id>` URL.
pub fn internet_archive_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if host != "archive.org" && host != "www.archive.org" {
        return None;
    }
    INTERNET_ARCHIVE_DETAILS
        .captures(parsed.path())
        .map(|c| c[1].to_string())
}
