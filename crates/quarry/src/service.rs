//! The retrieval service: ingestion, search, augmentation, and
//! knowledge-base management wired together over a [`Store`] and an
//! [`Embedder`].
//!
//! Ingestion is all-or-nothing: a document is extracted, chunked, and
//! fully embedded before it touches the store, so an embedding failure
//! leaves no partial record behind.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use quarry_core::augment::augment_prompt;
use quarry_core::chunk::split_text;
use quarry_core::embedding::Embedder;
use quarry_core::error::{Error, Result};
use quarry_core::hybrid::HybridSearcher;
use quarry_core::models::{
    Document, DocumentType, KnowledgeBase, KnowledgeBaseUpdate, SearchConfig, SearchResult,
};
use quarry_core::store::Store;

use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::extract;

/// Everything needed to ingest, search, and augment.
pub struct RagService {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    searcher: HybridSearcher,
    chunk_size: usize,
    overlap: usize,
}

impl RagService {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            searcher: HybridSearcher::new()
                .with_weights(retrieval.vector_weight, retrieval.keyword_weight),
            chunk_size: chunking.chunk_size,
            overlap: chunking.overlap,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Ingest a file from disk: detect the type from the extension,
    /// extract text, and add the document.
    pub async fn add_file(&self, path: &Path, title: Option<String>, user_id: &str) -> Result<Document> {
        let doc_type = extract::doc_type_for_path(path)?;
        let bytes = std::fs::read(path).map_err(|e| Error::storage(e.to_string()))?;
        let title = title.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });
        self.add_document(None, &title, &bytes, doc_type, user_id, Vec::new())
            .await
    }

    /// Ingest raw content as a document. Chunks and embeds everything
    /// up front; any failure aborts before the store sees the document.
    pub async fn add_document(
        &self,
        id: Option<String>,
        title: &str,
        bytes: &[u8],
        doc_type: DocumentType,
        user_id: &str,
        tags: Vec<String>,
    ) -> Result<Document> {
        if title.trim().is_empty() {
            return Err(Error::invalid_input("document title must not be empty"));
        }
        let content = extract::extract_text(bytes, doc_type)?;
        if content.trim().is_empty() {
            return Err(Error::invalid_input("document has no extractable text"));
        }

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut chunks = split_text(&id, &content, self.chunk_size, self.overlap);

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        let doc = Document {
            id,
            title: title.to_string(),
            content,
            doc_type,
            size: bytes.len() as u64,
            user_id: user_id.to_string(),
            uploaded_at: Utc::now(),
            tags,
            metadata: serde_json::json!({}),
            chunks,
        };
        self.store.insert_document(&doc).await?;
        info!(id = %doc.id, title = %doc.title, chunks = doc.chunks.len(), "document added");
        Ok(doc)
    }

    pub async fn get_document(&self, id: &str) -> Result<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::not_found("document", id))
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.store.delete_document(id).await?;
        info!(id, "document deleted");
        Ok(())
    }

    /// Search, optionally scoped to one knowledge base's documents.
    pub async fn search(
        &self,
        query: &str,
        config: &SearchConfig,
        kb_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let scope = match kb_id {
            Some(kb_id) => {
                let kb = self
                    .store
                    .get_knowledge_base(kb_id)
                    .await?
                    .ok_or_else(|| Error::not_found("knowledge base", kb_id))?;
                Some(kb.document_ids)
            }
            None => None,
        };
        self.searcher
            .search(
                self.store.as_ref(),
                self.embedder.as_ref(),
                query,
                config,
                scope.as_deref(),
            )
            .await
    }

    /// Retrieve context for `prompt` and fold it into an augmented
    /// prompt for a downstream model.
    pub async fn augment(
        &self,
        prompt: &str,
        config: &SearchConfig,
        kb_id: Option<&str>,
    ) -> Result<String> {
        let results = self.search(prompt, config, kb_id).await?;
        Ok(augment_prompt(prompt, &results))
    }

    pub async fn create_knowledge_base(
        &self,
        name: &str,
        description: &str,
        user_id: &str,
        is_public: bool,
        tags: Vec<String>,
    ) -> Result<KnowledgeBase> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("knowledge base name must not be empty"));
        }
        let now = Utc::now();
        let kb = KnowledgeBase {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            user_id: user_id.to_string(),
            document_ids: Vec::new(),
            is_public,
            collaborators: Vec::new(),
            tags,
            created_at: now,
            updated_at: now,
        };
        self.store.create_knowledge_base(&kb).await?;
        info!(id = %kb.id, name = %kb.name, "knowledge base created");
        Ok(kb)
    }

    pub async fn get_knowledge_base(&self, id: &str) -> Result<KnowledgeBase> {
        self.store
            .get_knowledge_base(id)
            .await?
            .ok_or_else(|| Error::not_found("knowledge base", id))
    }

    pub async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        self.store.list_knowledge_bases().await
    }

    pub async fn update_knowledge_base(
        &self,
        id: &str,
        update: KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBase> {
        self.store.update_knowledge_base(id, update).await
    }

    pub async fn delete_knowledge_base(&self, id: &str) -> Result<()> {
        self.store.delete_knowledge_base(id).await?;
        info!(id, "knowledge base deleted");
        Ok(())
    }

    /// Add a document to a knowledge base. The document must exist at
    /// add time; it may be deleted later without touching membership.
    pub async fn add_document_to_knowledge_base(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        if self.store.get_document(doc_id).await?.is_none() {
            return Err(Error::not_found("document", doc_id));
        }
        self.store
            .add_document_to_knowledge_base(kb_id, doc_id)
            .await
    }

    pub async fn remove_document_from_knowledge_base(
        &self,
        kb_id: &str,
        doc_id: &str,
    ) -> Result<()> {
        self.store
            .remove_document_from_knowledge_base(kb_id, doc_id)
            .await
    }
}
