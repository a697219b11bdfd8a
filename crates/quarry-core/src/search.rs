//! Brute-force semantic search over chunk embeddings.
//!
//! Embeds the query, scans every chunk in scope, and scores by dot
//! product (embeddings are unit-normalized, so this is cosine
//! similarity). Exact and O(N·D) per query — chosen for correctness
//! over an approximate index; the [`Store`] seam lets a backend swap in
//! an ANN structure without changing callers.

use std::collections::HashMap;

use tracing::debug;

use crate::embedding::{dot, Embedder};
use crate::error::{Error, Result};
use crate::models::SearchResult;
use crate::store::Store;

/// Options for one semantic search call.
#[derive(Debug, Clone)]
pub struct SemanticSearchOptions {
    /// Maximum results to return.
    pub top_k: usize,
    /// Discard results scoring below this similarity.
    pub min_score: Option<f32>,
    /// Restrict the scan to chunks owned by these documents.
    pub document_ids: Option<Vec<String>>,
}

impl Default for SemanticSearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            document_ids: None,
        }
    }
}

/// Rank chunks in scope by similarity to the query.
///
/// Results are sorted by descending score and truncated to `top_k`;
/// every returned result satisfies the `min_score` threshold. Chunks
/// whose embedding is still pending score `0.0` rather than erroring.
/// A blank query is invalid input.
pub async fn semantic_search(
    store: &dyn Store,
    embedder: &dyn Embedder,
    query: &str,
    opts: &SemanticSearchOptions,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Err(Error::invalid_input("query must not be empty"));
    }

    let query_vec = embedder.embed(query).await?;
    let chunks = store
        .chunks_in_scope(opts.document_ids.as_deref())
        .await?;
    debug!(chunks = chunks.len(), "semantic scan");

    let mut results: Vec<SearchResult> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let score = chunk
                .embedding
                .as_ref()
                .map(|e| dot(&query_vec, e))
                .unwrap_or(0.0);
            if let Some(min) = opts.min_score {
                if score < min {
                    return None;
                }
            }
            Some(SearchResult {
                document_id: chunk.document_id,
                chunk_id: chunk.id,
                content: chunk.content,
                score,
                rerank_score: None,
                title: None,
                chunk_index: chunk.chunk_index,
                citations: Vec::new(),
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(opts.top_k);

    attach_titles(store, &mut results).await?;
    Ok(results)
}

/// Fill in document titles for result metadata, one lookup per distinct
/// document.
pub(crate) async fn attach_titles(
    store: &dyn Store,
    results: &mut [SearchResult],
) -> Result<()> {
    let mut titles: HashMap<String, Option<String>> = HashMap::new();
    for result in results.iter_mut() {
        if !titles.contains_key(&result.document_id) {
            let title = store.document_title(&result.document_id).await?;
            titles.insert(result.document_id.clone(), title);
        }
        result.title = titles[&result.document_id].clone();
    }
    Ok(())
}
