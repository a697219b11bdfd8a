//! Storage abstraction for Quarry.
//!
//! The [`Store`] trait defines every persistence operation the retrieval
//! pipeline needs, enabling pluggable backends: the in-memory reference
//! implementation here, SQLite in the application crate, or anything
//! else that honors the same contract.
//!
//! Three aggregates live behind the trait — documents, chunks, and
//! knowledge bases — and a backend must make each mutation atomic with
//! respect to the others (per-aggregate locking or transactions), so
//! concurrent writers cannot lose updates through read-modify-write
//! races.
//!
//! Every mutating operation also bumps a monotonic corpus
//! [`generation`](Store::generation) counter. Query caches key on it, so
//! results cached before a mutation become unreachable afterwards.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Document, DocumentChunk, KnowledgeBase, KnowledgeBaseUpdate};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Persist a fully chunked, embedded document |
/// | [`get_document`](Store::get_document) / [`list_documents`](Store::list_documents) | Pure reads |
/// | [`delete_document`](Store::delete_document) | Remove a document and all its chunks |
/// | [`create_knowledge_base`](Store::create_knowledge_base) … | Knowledge-base CRUD and membership |
/// | [`chunks_in_scope`](Store::chunks_in_scope) | Chunk scan for search, optionally scoped |
/// | [`document_title`](Store::document_title) | Lightweight title lookup for result metadata |
/// | [`generation`](Store::generation) | Corpus generation counter |
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a document together with its chunks. The document must
    /// arrive fully populated — chunked and embedded — so a failure
    /// leaves no partial record behind.
    ///
    /// Fails with `DuplicateEntity` if the id is already taken.
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Remove a document and every chunk it owns. Fails with `NotFound`
    /// for an unknown id. Knowledge-base memberships are left untouched.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Fails with `DuplicateEntity` if the knowledge-base id is taken.
    async fn create_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()>;

    async fn get_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>>;

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>>;

    /// Apply a partial update; returns the updated record. Fails with
    /// `NotFound` for an unknown id.
    async fn update_knowledge_base(
        &self,
        id: &str,
        update: KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBase>;

    /// Delete the grouping only; member documents survive.
    async fn delete_knowledge_base(&self, id: &str) -> Result<()>;

    /// Add a document id to a knowledge base with set-union semantics:
    /// adding an existing member is a no-op, not an error.
    async fn add_document_to_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()>;

    async fn remove_document_from_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()>;

    /// All chunks, or only those owned by `document_ids` when given.
    /// An empty id slice yields an empty scan.
    async fn chunks_in_scope(&self, document_ids: Option<&[String]>)
        -> Result<Vec<DocumentChunk>>;

    /// Title of a document, if it exists. Cheaper than fetching the
    /// full record when enriching search results.
    async fn document_title(&self, id: &str) -> Result<Option<String>>;

    /// Monotonic counter incremented by every mutating operation.
    async fn generation(&self) -> Result<u64>;
}
