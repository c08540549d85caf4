use crate::config::DEFAULT_KNOWLEDGE_BASE_URL;
use crate::error::{ReferenceError, Result};
use crate::models::Reference;
use anyhow::Context;
use csv::Writer;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;
use url::Url;

/// A knowledge-base deployment references are uploaded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub url: String,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            url: DEFAULT_KNOWLEDGE_BASE_URL.to_string(),
        }
    }
}

impl KnowledgeBase {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Host of the deployment, used to namespace reference hashes.
    /// Falls back to the configured string when it is not a URL.
    pub fn namespace(&self) -> String {
        Url::parse(self.url.trim())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_else(|| self.url.trim().trim_end_matches('/').to_ascii_lowercase())
    }

    fn base(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub item_qid: String,
    /// False when the item already existed under this hash
    pub uploaded_now: bool,
}

/// What the upload layer needs to look up or create the item for one hashed reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub md5hash: String,
    pub template_name: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub first_level_domain_of_url: Option<String>,
    pub upload: Option<UploadResult>,
}

impl StorageEntry {
    pub fn record_upload(&mut self, result: UploadResult) {
        self.upload = Some(result);
    }

    pub fn item_url(&self, kb: &KnowledgeBase) -> Result<String> {
        let upload = self.upload.as_ref().ok_or_else(|| {
            ReferenceError::MissingInformation(format!(
                "no upload result for reference {}",
                self.md5hash
            ))
        })?;
        Ok(format!("{}/wiki/Item:{}", kb.base(), upload.item_qid))
    }
}

impl Reference {
    /// `None` unless the reference has a hash.
    pub fn storage_entry(&self) -> Option<StorageEntry> {
        if !self.has_hash() {
            return None;
        }
        Some(StorageEntry {
            md5hash: self.md5hash.clone().unwrap_or_default(),
            template_name: self.template_name.clone(),
            title: self.title.clone(),
            url: self.url.clone().filter(|u| !u.is_empty()),
            first_level_domain_of_url: self.first_level_domain_of_url.clone(),
            upload: None,
        })
    }
}

/// Hashed references grouped by idempotency key, first occurrence kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoragePlan {
    pub entries: Vec<StorageEntry>,
    pub number_of_duplicates: usize,
    pub number_of_ineligible: usize,
}

impl StoragePlan {
    pub fn from_references<'a>(references: impl IntoIterator<Item = &'a Reference>) -> Self {
        let mut plan = Self::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for reference in references {
            match reference.storage_entry() {
                Some(entry) => {
                    if seen.insert(entry.md5hash.clone()) {
                        plan.entries.push(entry);
                    } else {
                        plan.number_of_duplicates += 1;
                    }
                }
                None => plan.number_of_ineligible += 1,
            }
        }
        plan
    }

    pub fn merge(&mut self, other: StoragePlan) {
        let mut seen: FxHashSet<String> =
            self.entries.iter().map(|e| e.md5hash.clone()).collect();
        for entry in other.entries {
            if seen.insert(entry.md5hash.clone()) {
                self.entries.push(entry);
            } else {
                self.number_of_duplicates += 1;
            }
        }
        self.number_of_duplicates += other.number_of_duplicates;
        self.number_of_ineligible += other.number_of_ineligible;
    }
}

pub fn write_storage_entries<W: Write>(writer: W, entries: &[StorageEntry]) -> anyhow::Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record([
        "md5hash",
        "template_name",
        "title",
        "url",
        "first_level_domain_of_url",
        "item_qid",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.md5hash.as_str(),
            entry.template_name.as_str(),
            entry.title.as_deref().unwrap_or(""),
            entry.url.as_deref().unwrap_or(""),
            entry.first_level_domain_of_url.as_deref().unwrap_or(""),
            entry.upload.as_ref().map(|u| u.item_qid.as_str()).unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one row per storage entry.
pub fn write_storage_csv(path: impl AsRef<Path>, plan: &StoragePlan) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create storage export: {}", path.display()))?;
    write_storage_entries(BufWriter::with_capacity(256 * 1024, file), &plan.entries)?;
    info!(
        entries = plan.entries.len(),
        path = %path.display(),
        "Wrote storage export"
    );
    Ok(())
}
