//! Second-stage reranking of retrieved results.
//!
//! A [`Scorer`] assigns a query-relative relevance score to a piece of
//! text. The default [`LexicalOverlapScorer`] is a cheap cross-check on
//! the retrieval scores: it measures what fraction of the query's
//! distinct terms actually appear in the chunk, which penalizes chunks
//! that matched only on embedding geometry.

use crate::bm25::tokenize;
use crate::models::SearchResult;

/// Scores `text` against `query`, higher is more relevant.
pub trait Scorer: Send + Sync {
    fn score(&self, query: &str, text: &str) -> f32;
}

/// Fraction of distinct query tokens present in the text, in `[0, 1]`.
pub struct LexicalOverlapScorer;

impl Scorer for LexicalOverlapScorer {
    fn score(&self, query: &str, text: &str) -> f32 {
        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() {
            return 0.0;
        }
        let text_terms: std::collections::HashSet<String> =
            tokenize(text).into_iter().collect();
        let hits = query_terms
            .iter()
            .filter(|t| text_terms.contains(t.as_str()))
            .count();
        hits as f32 / query_terms.len() as f32
    }
}

/// Apply `scorer` to every result and re-sort by the new score.
///
/// The original retrieval `score` is preserved; ordering switches to
/// `rerank_score`.
pub fn rerank(scorer: &dyn Scorer, query: &str, results: &mut Vec<SearchResult>) {
    for result in results.iter_mut() {
        result.rerank_score = Some(scorer.score(query, &result.content));
    }
    results.sort_by(|a, b| {
        b.relevance()
            .partial_cmp(&a.relevance())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(chunk_id: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            document_id: "d1".to_string(),
            chunk_id: chunk_id.to_string(),
            content: content.to_string(),
            score,
            rerank_score: None,
            title: None,
            chunk_index: 0,
            citations: Vec::new(),
        }
    }

    #[test]
    fn full_overlap_scores_one() {
        let s = LexicalOverlapScorer.score("rust ownership", "ownership rules in rust");
        assert_eq!(s, 1.0);
    }

    #[test]
    fn partial_overlap_is_fractional() {
        let s = LexicalOverlapScorer.score("rust ownership model", "the rust book");
        assert!((s - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn no_overlap_scores_zero() {
        assert_eq!(LexicalOverlapScorer.score("rust", "pasta recipes"), 0.0);
    }

    #[test]
    fn duplicate_query_terms_count_once() {
        let s = LexicalOverlapScorer.score("rust rust cooking", "rust intro");
        assert!((s - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rerank_reorders_but_keeps_retrieval_score() {
        let mut results = vec![
            result("c1", "unrelated pasta text", 0.9),
            result("c2", "rust ownership explained", 0.4),
        ];
        rerank(&LexicalOverlapScorer, "rust ownership", &mut results);
        assert_eq!(results[0].chunk_id, "c2");
        assert_eq!(results[0].score, 0.4);
        assert_eq!(results[0].rerank_score, Some(1.0));
        assert_eq!(results[1].rerank_score, Some(0.0));
    }
}
