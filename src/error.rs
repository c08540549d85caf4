use thiserror::Error;

/// Contract violations surfaced to callers. Malformed wikitext never ends up
/// here; it degrades to empty values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("more than one number found in {input:?}")]
    AmbiguousNumber { input: String },
    #[error("missing information: {0}")]
    MissingInformation(String),
}

pub type Result<T, E = ReferenceError> = std::result::Result<T, E>;
