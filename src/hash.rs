use crate::models::Reference;
use md5::{Digest, Md5};

/// Computes namespaced MD5 digests for references.
///
/// The canonical form is `"{namespace}/{identifier}"`, trimmed and lower-cased,
/// so the same identifier always yields the same digest within one knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEngine {
    namespace: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl HashEngine {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn digest(&self, identifier: &str) -> String {
        let canonical = format!("{}/{}", self.namespace, identifier.trim()).to_lowercase();
        format!("{:x}", Md5::digest(canonical.as_bytes()))
    }

    /// The identifier a reference is keyed by, in priority order
    /// qid > doi > pmid > isbn > oclc > url.
    pub fn hash_identifier<'a>(&self, reference: &'a Reference) -> Option<&'a str> {
        non_empty(&reference.wikidata_qid)
            .or_else(|| non_empty(&reference.doi))
            .or_else(|| non_empty(&reference.pmid))
            .or_else(|| {
                non_empty(&reference.isbn_13)
                    .or_else(|| non_empty(&reference.isbn_10))
                    .or_else(|| non_empty(&reference.isbn))
            })
            .or_else(|| non_empty(&reference.oclc))
            .or_else(|| non_empty(&reference.url))
    }

    pub fn hash_reference(&self, reference: &Reference) -> Option<String> {
        self.hash_identifier(reference).map(|id| self.digest(id))
    }

    /// Sets `md5hash` and `first_level_domain_of_url_hash`.
    pub fn apply(&self, reference: &mut Reference) {
        reference.md5hash = self.hash_reference(reference);
        reference.first_level_domain_of_url_hash =
            non_empty(&reference.first_level_domain_of_url).map(|d| self.digest(d));
    }
}
