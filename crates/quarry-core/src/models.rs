//! Core data types that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of an ingested document's source material.
///
/// PDF and DOCX documents are stored as the plain text extracted from
/// them; the variant records provenance, not encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Plain,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Plain => "plain",
            DocumentType::Markdown => "markdown",
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(DocumentType::Plain),
            "markdown" => Some(DocumentType::Markdown),
            "pdf" => Some(DocumentType::Pdf),
            "docx" => Some(DocumentType::Docx),
            _ => None,
        }
    }
}

/// A unit of ingested content, immutable once stored.
///
/// A stored document's `chunks` collectively cover `[0, content.len())`
/// in character offsets with bounded overlap, and the list is never
/// empty for non-empty content. Deleting a document removes its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_type: DocumentType,
    /// Content size in bytes.
    pub size: u64,
    pub user_id: String,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    /// Ordered by `chunk_index`.
    pub chunks: Vec<DocumentChunk>,
}

/// A contiguous span of a document's text, the atomic retrieval unit.
///
/// Owned exclusively by its document. The embedding is `None` until
/// computed and immutable afterwards; stored embeddings are unit-length
/// (L2-normalized), so cosine similarity reduces to a dot product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Derived id: `{document_id}-chunk-{chunk_index}`.
    pub id: String,
    pub document_id: String,
    pub content: String,
    /// Character offset of the span start in the parent document.
    pub start_offset: usize,
    /// Character offset one past the span end.
    pub end_offset: usize,
    pub embedding: Option<Vec<f32>>,
    pub chunk_index: usize,
    /// Total chunk count of the owning document, stamped after the
    /// full split completes.
    pub total_chunks: usize,
}

/// Build the deterministic chunk id for a document id and sequence index.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}-chunk-{}", document_id, index)
}

/// A named, user-visible grouping of document ids used to scope search.
///
/// Member ids should reference existing documents, but document deletion
/// does not cascade into memberships; stale ids simply contribute no
/// chunks to a scoped search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub user_id: String,
    /// Deduplicated; additions use set-union semantics.
    pub document_ids: Vec<String>,
    pub is_public: bool,
    pub collaborators: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a knowledge base; `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub collaborators: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// An excerpted sentence from a retrieved chunk, attributed to its
/// source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub text: String,
    pub source_title: String,
    pub page: Option<u32>,
    /// In `[0.8, 1.0]`, rising with sentence position.
    pub confidence: f32,
}

/// A ranked passage returned from search. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub chunk_id: String,
    pub content: String,
    /// Raw retrieval score: dot-product similarity, BM25, or the
    /// weighted hybrid fusion of both.
    pub score: f32,
    /// Second-pass relevance, present only when reranking ran.
    pub rerank_score: Option<f32>,
    pub title: Option<String>,
    pub chunk_index: usize,
    pub citations: Vec<Citation>,
}

impl SearchResult {
    /// The score the caller should rank and threshold by: the rerank
    /// score when reranking ran, the retrieval score otherwise.
    pub fn relevance(&self) -> f32 {
        self.rerank_score.unwrap_or(self.score)
    }
}

/// Retrieval strategy for the hybrid orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Vector,
    Keyword,
    Hybrid,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Vector => "vector",
            SearchStrategy::Keyword => "keyword",
            SearchStrategy::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vector" => Some(SearchStrategy::Vector),
            "keyword" => Some(SearchStrategy::Keyword),
            "hybrid" => Some(SearchStrategy::Hybrid),
            _ => None,
        }
    }
}

/// Request-scoped configuration for one orchestrated search. Not persisted.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    pub top_k: usize,
    pub rerank: bool,
    pub expand_query: bool,
    pub min_relevance: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Hybrid,
            top_k: 5,
            rerank: true,
            expand_query: false,
            min_relevance: None,
        }
    }
}
