//! Error taxonomy shared by every Quarry operation.
//!
//! Store and search operations surface these errors to the immediate
//! caller. Empty result sets are not errors: a query with no matches
//! returns an empty collection, and prompt augmentation with no context
//! returns the prompt unchanged.

use thiserror::Error;

/// Unified error type for the retrieval pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input: empty document content, blank query,
    /// zero-sized chunk configuration, and similar.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A document or knowledge base with this id already exists.
    #[error("{kind} already exists: {id}")]
    DuplicateEntity { kind: &'static str, id: String },

    /// The referenced document or knowledge base does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The file extension or MIME type has no extraction strategy.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The embedding model failed to initialize or to run inference.
    /// Callers must not fall back to zero vectors.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A storage backend fault (I/O, SQL, serialization of stored rows).
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        Error::DuplicateEntity {
            kind,
            id: id.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Error::Storage(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_entity_kind_and_id() {
        let err = Error::duplicate("document", "doc-1");
        assert_eq!(err.to_string(), "document already exists: doc-1");

        let err = Error::not_found("knowledge base", "kb-9");
        assert_eq!(err.to_string(), "knowledge base not found: kb-9");
    }
}
