use crate::storage::KnowledgeBase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Knowledge base the reference hashes are namespaced to
pub const DEFAULT_KNOWLEDGE_BASE_URL: &str = "https://ia-sandbox.wikibase.cloud";

/// Language edition used to build template documentation URLs
pub const DEFAULT_WIKI_LANGUAGE: &str = "en";

/// Headings whose list items are treated as general references
pub const DEFAULT_REFERENCE_HEADINGS: &[&str] = &[
    "references",
    "bibliography",
    "further reading",
    "sources",
    "works cited",
];

/// Max remote checks in flight across all runs sharing a dispatcher
pub const DEFAULT_CHECK_CONCURRENCY: usize = 16;

/// Per-request budget for a remote check
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress update interval (tick every N articles)
pub const PROGRESS_INTERVAL: u64 = 100;

/// File extensions picked up by the batch directory loader
pub const ARTICLE_EXTENSIONS: &[&str] = &["wiki", "wikitext", "txt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub reference_headings: Vec<String>,
    pub wiki_language: String,
    pub knowledge_base: KnowledgeBase,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            reference_headings: DEFAULT_REFERENCE_HEADINGS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            wiki_language: DEFAULT_WIKI_LANGUAGE.to_string(),
            knowledge_base: KnowledgeBase::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Case-insensitive match of a heading against the reference-like set.
    pub fn is_reference_heading(&self, heading: &str) -> bool {
        let heading = heading.trim();
        self.reference_headings
            .iter()
            .any(|h| h.trim().eq_ignore_ascii_case(heading))
    }

    pub fn hash_namespace(&self) -> String {
        self.knowledge_base.namespace()
    }
}
