//! Wikirefs: citation extraction for Wikipedia articles
//!
//! This crate turns raw wikitext into typed, hashed citation records:
//!
//! 1. **Tokenize** -- Find `<ref>` tags, reference-like sections and their list
//!    items, and the templates inside each reference
//! 2. **Classify** -- Split references into named, content and general ones and
//!    derive structural counts from tag shape and template names
//! 3. **Normalize** -- Map the first supported citation template onto a
//!    [`models::Reference`]: persons, identifiers, URLs, container fields
//! 4. **Hash** -- Key each reference by its strongest identifier for
//!    deduplication and storage
//!
//! # Architecture
//!
//! - **Single pass per article** -- [`extractor::ExtractorState`] owns everything
//!   one run produces and holds no cross-run state
//! - **Degrade, don't fail** -- Malformed markup yields empty values; only
//!   ambiguous numbered fields and out-of-order storage access are errors
//! - **Parallel batches** -- Uses rayon to extract many articles concurrently
//! - **Bounded remote checks** -- One shared dispatcher deduplicates URL/DOI checks
//!   across runs and caps requests in flight
//!
//! # Key Modules
//!
//! - [`tokenizer`] -- `<ref>` tags, sections and general references
//! - [`template`] -- Template parsing with nested template/link support
//! - [`classifier`] -- Named/content/general partition and structural counts
//! - [`normalizer`] -- Template to [`models::Reference`] mapping
//! - [`hash`] -- Identifier-priority MD5 hashing
//! - [`extractor`] -- The per-article pipeline
//! - [`stats`] -- Article statistics and atomic batch counters
//! - [`storage`] -- Knowledge-base storage keys and CSV export
//! - [`checks`] -- Remote check dispatcher
//! - [`batch`] -- Directory loading and parallel extraction
//! - [`config`] -- Constants and run-time configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Statistics for one article
//! wikirefs extract -i Easter_Island.wiki --pretty
//!
//! # Every article in a directory, with a storage export
//! wikirefs batch -i articles/ --export references.csv
//! ```

pub mod archive;
pub mod batch;
pub mod checks;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod hash;
pub mod markup;
pub mod models;
pub mod normalizer;
pub mod stats;
pub mod storage;
pub mod template;
pub mod tokenizer;

pub use error::ReferenceError;
pub use extractor::ExtractorState;
