//! Hybrid search orchestrator.
//!
//! Runs the full retrieval pipeline: optional query expansion, one or
//! both retrieval strategies, weighted score fusion, optional
//! reranking, relevance filtering, and citation extraction. Results
//! are cached per query shape; the cache key folds in the store's
//! generation counter, so any mutation invalidates all cached entries
//! without explicit eviction wiring.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::bm25::Bm25Index;
use crate::citation::extract_citations;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::expand::{Expander, SynonymExpander};
use crate::models::{SearchConfig, SearchResult, SearchStrategy};
use crate::rerank::{rerank, LexicalOverlapScorer, Scorer};
use crate::search::{attach_titles, semantic_search, SemanticSearchOptions};
use crate::store::Store;

/// Weight of the vector score in hybrid fusion.
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.6;
/// Weight of the BM25 score in hybrid fusion.
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.4;

/// The retrieval pipeline. One instance is shared across queries; the
/// internal cache is interior-mutable.
pub struct HybridSearcher {
    expander: Box<dyn Expander>,
    scorer: Box<dyn Scorer>,
    vector_weight: f32,
    keyword_weight: f32,
    cache: Mutex<HashMap<String, Vec<SearchResult>>>,
}

impl Default for HybridSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridSearcher {
    pub fn new() -> Self {
        Self {
            expander: Box::new(SynonymExpander::new()),
            scorer: Box::new(LexicalOverlapScorer),
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_weights(mut self, vector: f32, keyword: f32) -> Self {
        self.vector_weight = vector;
        self.keyword_weight = keyword;
        self
    }

    pub fn with_expander(mut self, expander: Box<dyn Expander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Drop all cached results. Stale entries already become
    /// unreachable when the store generation moves; this frees them.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Run one search through the full pipeline.
    ///
    /// `scope` restricts retrieval to the given document ids; `None`
    /// searches the whole store. Results are sorted by [`SearchResult::relevance`]
    /// descending and capped at `config.top_k`.
    pub async fn search(
        &self,
        store: &dyn Store,
        embedder: &dyn Embedder,
        query: &str,
        config: &SearchConfig,
        scope: Option<&[String]>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }

        let generation = store.generation().await?;
        let key = cache_key(query, config, scope, generation);
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            debug!(query, "search cache hit");
            return Ok(hit.clone());
        }

        let variants = if config.expand_query {
            self.expander.expand(query)
        } else {
            vec![query.to_string()]
        };
        debug!(query, variants = variants.len(), strategy = config.strategy.as_str(), "search");

        let mut results = match config.strategy {
            SearchStrategy::Vector => {
                let mut by_chunk = self
                    .vector_scores(store, embedder, &variants, scope, config.top_k)
                    .await?;
                let mut results: Vec<SearchResult> = by_chunk.drain().map(|(_, r)| r).collect();
                sort_by_score(&mut results);
                results.truncate(config.top_k);
                results
            }
            SearchStrategy::Keyword => {
                let mut by_chunk = self
                    .keyword_scores(store, &variants, scope, config.top_k)
                    .await?;
                let mut results: Vec<SearchResult> = by_chunk.drain().map(|(_, r)| r).collect();
                sort_by_score(&mut results);
                results.truncate(config.top_k);
                results
            }
            SearchStrategy::Hybrid => {
                // Score every chunk on both axes before fusing; truncating
                // either side first would zero out legitimate partial scores.
                let vector = self
                    .vector_scores(store, embedder, &variants, scope, usize::MAX)
                    .await?;
                let keyword = self
                    .keyword_scores(store, &variants, scope, usize::MAX)
                    .await?;
                let mut fused: HashMap<String, SearchResult> = HashMap::new();
                for (chunk_id, mut result) in vector {
                    result.score *= self.vector_weight;
                    fused.insert(chunk_id, result);
                }
                for (chunk_id, mut result) in keyword {
                    match fused.entry(chunk_id) {
                        Entry::Occupied(mut entry) => {
                            entry.get_mut().score += result.score * self.keyword_weight;
                        }
                        Entry::Vacant(entry) => {
                            result.score *= self.keyword_weight;
                            entry.insert(result);
                        }
                    }
                }
                let mut results: Vec<SearchResult> = fused.into_values().collect();
                sort_by_score(&mut results);
                results.truncate(config.top_k);
                results
            }
        };

        attach_titles(store, &mut results).await?;

        if config.rerank {
            rerank(self.scorer.as_ref(), query, &mut results);
        }

        if let Some(min) = config.min_relevance {
            results.retain(|r| r.relevance() >= min);
        }

        for result in &mut results {
            let title = result.title.as_deref().unwrap_or("Unknown source");
            result.citations = extract_citations(&result.chunk_id, &result.content, title);
        }

        self.cache.lock().unwrap().insert(key, results.clone());
        Ok(results)
    }

    /// Dot-product score per chunk across query variants. A chunk seen
    /// by an earlier variant keeps that score; variants are ordered by
    /// priority with the original query first.
    async fn vector_scores(
        &self,
        store: &dyn Store,
        embedder: &dyn Embedder,
        variants: &[String],
        scope: Option<&[String]>,
        top_k: usize,
    ) -> Result<HashMap<String, SearchResult>> {
        let mut by_chunk: HashMap<String, SearchResult> = HashMap::new();
        for variant in variants {
            let opts = SemanticSearchOptions {
                top_k,
                min_score: None,
                document_ids: scope.map(|s| s.to_vec()),
            };
            for result in semantic_search(store, embedder, variant, &opts).await? {
                if let Entry::Vacant(entry) = by_chunk.entry(result.chunk_id.clone()) {
                    entry.insert(result);
                }
            }
        }
        Ok(by_chunk)
    }

    /// BM25 score per chunk across query variants, first variant wins.
    async fn keyword_scores(
        &self,
        store: &dyn Store,
        variants: &[String],
        scope: Option<&[String]>,
        top_k: usize,
    ) -> Result<HashMap<String, SearchResult>> {
        let chunks = store.chunks_in_scope(scope).await?;
        let index = Bm25Index::build(chunks.iter().map(|c| (c.id.clone(), c.content.as_str())));
        let by_id: HashMap<&str, &crate::models::DocumentChunk> =
            chunks.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut by_chunk: HashMap<String, SearchResult> = HashMap::new();
        for variant in variants {
            for (chunk_id, score) in index.search(variant, top_k) {
                let chunk = match by_id.get(chunk_id.as_str()) {
                    Some(c) => *c,
                    None => continue,
                };
                if let Entry::Vacant(entry) = by_chunk.entry(chunk_id.clone()) {
                    entry.insert(SearchResult {
                        document_id: chunk.document_id.clone(),
                        chunk_id,
                        content: chunk.content.clone(),
                        score,
                        rerank_score: None,
                        title: None,
                        chunk_index: chunk.chunk_index,
                        citations: Vec::new(),
                    });
                }
            }
        }
        Ok(by_chunk)
    }
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

fn cache_key(
    query: &str,
    config: &SearchConfig,
    scope: Option<&[String]>,
    generation: u64,
) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        query,
        config.strategy.as_str(),
        config.top_k,
        config.rerank,
        config.expand_query,
        config.min_relevance.map(|m| m.to_string()).unwrap_or_default(),
        scope.map(|s| s.join(",")).unwrap_or_default(),
        generation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_normalize;
    use crate::models::{chunk_id, Document, DocumentChunk, DocumentType};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    /// Deterministic embedder: topic words map onto fixed axes.
    struct AxisEmbedder;

    fn axis_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v = vec![0.0f32; 4];
        if lower.contains("rust") {
            v[0] = 1.0;
        }
        if lower.contains("cooking") {
            v[1] = 1.0;
        }
        if lower.contains("intelligence") {
            v[2] = 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[3] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(axis_for(text))
        }
        fn dims(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "axis-test"
        }
    }

    fn doc(id: &str, title: &str, content: &str) -> Document {
        let chunk = DocumentChunk {
            id: chunk_id(id, 0),
            document_id: id.to_string(),
            content: content.to_string(),
            start_offset: 0,
            end_offset: content.chars().count(),
            embedding: Some(axis_for(content)),
            chunk_index: 0,
            total_chunks: 1,
        };
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            doc_type: DocumentType::Plain,
            size: content.len() as u64,
            user_id: "u1".to_string(),
            uploaded_at: Utc::now(),
            tags: Vec::new(),
            metadata: json!({}),
            chunks: vec![chunk],
        }
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_document(&doc(
                "rust-doc",
                "Rust Ownership",
                "The rust ownership model gives memory safety without a garbage collector running",
            ))
            .await
            .unwrap();
        store
            .insert_document(&doc(
                "cooking-doc",
                "Pasta Night",
                "A cooking guide for weeknight pasta that comes together in under thirty minutes",
            ))
            .await
            .unwrap();
        store
    }

    fn config(strategy: SearchStrategy) -> SearchConfig {
        SearchConfig {
            strategy,
            top_k: 5,
            rerank: false,
            expand_query: false,
            min_relevance: None,
        }
    }

    #[tokio::test]
    async fn hybrid_score_is_weighted_sum_of_both_strategies() {
        let store = seeded_store().await;
        let searcher = HybridSearcher::new();

        let vector = searcher
            .search(&store, &AxisEmbedder, "rust ownership", &config(SearchStrategy::Vector), None)
            .await
            .unwrap();
        let keyword = searcher
            .search(&store, &AxisEmbedder, "rust ownership", &config(SearchStrategy::Keyword), None)
            .await
            .unwrap();
        let hybrid = searcher
            .search(&store, &AxisEmbedder, "rust ownership", &config(SearchStrategy::Hybrid), None)
            .await
            .unwrap();

        let chunk = "rust-doc-chunk-0";
        let v = vector.iter().find(|r| r.chunk_id == chunk).unwrap().score;
        let k = keyword.iter().find(|r| r.chunk_id == chunk).unwrap().score;
        let h = hybrid.iter().find(|r| r.chunk_id == chunk).unwrap().score;
        assert!((h - (0.6 * v + 0.4 * k)).abs() < 1e-5);
        assert_eq!(hybrid[0].chunk_id, chunk);
    }

    #[tokio::test]
    async fn expansion_recovers_spelled_out_terms() {
        let store = InMemoryStore::new();
        store
            .insert_document(&doc(
                "ai-doc",
                "AI Overview",
                "Artificial intelligence systems learn statistical patterns from large datasets",
            ))
            .await
            .unwrap();
        let searcher = HybridSearcher::new();

        let mut cfg = config(SearchStrategy::Keyword);
        let plain = searcher
            .search(&store, &AxisEmbedder, "ai", &cfg, None)
            .await
            .unwrap();
        assert!(plain.is_empty());

        cfg.expand_query = true;
        let expanded = searcher
            .search(&store, &AxisEmbedder, "ai", &cfg, None)
            .await
            .unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].document_id, "ai-doc");
    }

    /// Expander emitting a fixed variant list regardless of the query.
    struct FixedExpander(Vec<&'static str>);

    impl Expander for FixedExpander {
        fn expand(&self, _query: &str) -> Vec<String> {
            self.0.iter().map(|v| v.to_string()).collect()
        }
    }

    #[tokio::test]
    async fn chunk_seen_by_earlier_variant_keeps_that_score() {
        let store = InMemoryStore::new();
        store
            .insert_document(&doc(
                "intel-doc",
                "AI Overview",
                "Artificial intelligence systems learn statistical patterns from large datasets",
            ))
            .await
            .unwrap();
        // The original query misses the chunk's topic axis; the synonym
        // variant hits it perfectly.
        let searcher = HybridSearcher::new().with_expander(Box::new(FixedExpander(vec![
            "plain words",
            "artificial intelligence",
        ])));

        let mut cfg = config(SearchStrategy::Vector);
        cfg.expand_query = true;
        let results = searcher
            .search(&store, &AxisEmbedder, "plain words", &cfg, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // The original variant's score sticks; the later variant's 1.0
        // must not overwrite it.
        assert!(results[0].score.abs() < 1e-6);
    }

    #[tokio::test]
    async fn keyword_dedup_prefers_first_variant() {
        let store = seeded_store().await;
        // The second variant repeats the term, which would double the
        // BM25 score if it were allowed to win.
        let searcher = HybridSearcher::new().with_expander(Box::new(FixedExpander(vec![
            "ownership",
            "ownership ownership",
        ])));

        let mut cfg = config(SearchStrategy::Keyword);
        let plain = searcher
            .search(&store, &AxisEmbedder, "ownership", &cfg, None)
            .await
            .unwrap();
        cfg.expand_query = true;
        let expanded = searcher
            .search(&store, &AxisEmbedder, "ownership", &cfg, None)
            .await
            .unwrap();
        assert!((expanded[0].score - plain[0].score).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rerank_populates_scores_and_min_relevance_filters() {
        let store = seeded_store().await;
        let searcher = HybridSearcher::new();
        let cfg = SearchConfig {
            strategy: SearchStrategy::Hybrid,
            top_k: 5,
            rerank: true,
            expand_query: false,
            min_relevance: Some(0.9),
        };
        let results = searcher
            .search(&store, &AxisEmbedder, "rust ownership", &cfg, None)
            .await
            .unwrap();
        // Only the rust chunk contains both query terms.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rerank_score, Some(1.0));
    }

    #[tokio::test]
    async fn citations_carry_source_titles() {
        let store = seeded_store().await;
        let searcher = HybridSearcher::new();
        let results = searcher
            .search(&store, &AxisEmbedder, "rust", &config(SearchStrategy::Vector), None)
            .await
            .unwrap();
        let top = &results[0];
        assert!(!top.citations.is_empty());
        assert_eq!(top.citations[0].source_title, "Rust Ownership");
    }

    #[tokio::test]
    async fn scope_limits_retrieval() {
        let store = seeded_store().await;
        let searcher = HybridSearcher::new();
        let scope = vec!["cooking-doc".to_string()];
        let results = searcher
            .search(
                &store,
                &AxisEmbedder,
                "rust",
                &config(SearchStrategy::Hybrid),
                Some(&scope),
            )
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.document_id == "cooking-doc"));
    }

    #[tokio::test]
    async fn cache_invalidates_when_store_mutates() {
        let store = seeded_store().await;
        let searcher = HybridSearcher::new();
        let cfg = config(SearchStrategy::Keyword);

        let before = searcher
            .search(&store, &AxisEmbedder, "ownership", &cfg, None)
            .await
            .unwrap();
        assert_eq!(before.len(), 1);

        store
            .insert_document(&doc(
                "second",
                "More Ownership",
                "Another discussion of ownership transfer and move semantics in practice",
            ))
            .await
            .unwrap();

        let after = searcher
            .search(&store, &AxisEmbedder, "ownership", &cfg, None)
            .await
            .unwrap();
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let store = InMemoryStore::new();
        let searcher = HybridSearcher::new();
        let err = searcher
            .search(&store, &AxisEmbedder, "", &config(SearchStrategy::Hybrid), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
