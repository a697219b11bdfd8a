//! Classic BM25 lexical ranking.
//!
//! [`Bm25Index::build`] precomputes per-entry term frequencies, entry
//! lengths, the average length, and per-term inverse document frequency:
//!
//! ```text
//! idf(t) = ln((N − n_t + 0.5) / (n_t + 0.5) + 1)
//! ```
//!
//! [`Bm25Index::search`] then scores each entry as the sum over query
//! terms of
//!
//! ```text
//! idf(t) · tf·(k1+1) / (tf + k1·(1 − b + b·len/avg_len))
//! ```
//!
//! with `k1 = 1.5`, `b = 0.75`. Zero-score entries are excluded from
//! results. The index is not incrementally maintained — callers rebuild
//! it whenever the underlying corpus changes.

use std::collections::HashMap;

/// Term-frequency saturation parameter.
pub const K1: f32 = 1.5;
/// Length-normalization parameter.
pub const B: f32 = 0.75;

struct IndexedEntry {
    id: String,
    term_freqs: HashMap<String, usize>,
    len: usize,
}

/// A BM25 index over a snapshot of text entries.
pub struct Bm25Index {
    entries: Vec<IndexedEntry>,
    avg_len: f32,
    idf: HashMap<String, f32>,
}

/// Lowercase, strip non-word characters, split on whitespace, and drop
/// tokens of length ≤ 2.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

impl Bm25Index {
    /// Build an index over `(id, text)` entries.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, &'a str)>,
    {
        let entries: Vec<IndexedEntry> = entries
            .into_iter()
            .map(|(id, text)| {
                let tokens = tokenize(text);
                let len = tokens.len();
                let mut term_freqs: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *term_freqs.entry(token).or_insert(0) += 1;
                }
                IndexedEntry {
                    id,
                    term_freqs,
                    len,
                }
            })
            .collect();

        let n = entries.len();
        let avg_len = if n == 0 {
            0.0
        } else {
            entries.iter().map(|e| e.len).sum::<usize>() as f32 / n as f32
        };

        let mut doc_freqs: HashMap<&str, usize> = HashMap::new();
        for entry in &entries {
            for term in entry.term_freqs.keys() {
                *doc_freqs.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        let idf = doc_freqs
            .into_iter()
            .map(|(term, n_t)| {
                let idf = ((n as f32 - n_t as f32 + 0.5) / (n_t as f32 + 0.5) + 1.0).ln();
                (term.to_string(), idf)
            })
            .collect();

        Self {
            entries,
            avg_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank entries against the query, best first. Entries scoring zero
    /// (no query term present) are excluded; at most `top_k` returned.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let mut score = 0.0f32;
                for term in &terms {
                    let tf = *entry.term_freqs.get(term).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let idf = *self.idf.get(term).unwrap_or(&0.0);
                    let len_norm = 1.0 - B + B * entry.len as f32 / self.avg_len;
                    score += idf * tf * (K1 + 1.0) / (tf + K1 * len_norm);
                }
                (score > 0.0).then(|| (entry.id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(texts: &[(&str, &str)]) -> Bm25Index {
        Bm25Index::build(texts.iter().map(|(id, text)| (id.to_string(), *text)))
    }

    #[test]
    fn tokenize_drops_short_and_nonword() {
        assert_eq!(
            tokenize("The C++ API is my-API, ok? Programming!"),
            vec!["the", "api", "api", "programming"]
        );
        assert!(tokenize("a an to of").is_empty());
    }

    #[test]
    fn matching_entry_ranks_and_nonmatching_excluded() {
        let idx = index(&[
            ("a", "Rust programming with cargo and crates"),
            ("b", "Cooking pasta with tomato sauce"),
        ]);
        let results = idx.search("programming", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn term_frequency_raises_score() {
        let idx = index(&[
            ("a", "search search search and other words here"),
            ("b", "search appears once among other words here"),
        ]);
        let results = idx.search("search", 10);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn rare_terms_outweigh_common_ones() {
        let idx = index(&[
            ("a", "shared shared zebra"),
            ("b", "shared shared words"),
            ("c", "shared shared words"),
        ]);
        // "zebra" appears in one entry, "shared" in all three.
        let zebra = idx.search("zebra", 10);
        let shared = idx.search("shared", 10);
        assert!(zebra[0].1 > shared[0].1);
    }

    #[test]
    fn idf_formula_matches_definition() {
        let idx = index(&[("a", "unique words"), ("b", "common words")]);
        // "unique": N=2, n_t=1 -> ln((2-1+0.5)/(1+0.5)+1) = ln(2)
        assert!((idx.idf["unique"] - 2.0f32.ln()).abs() < 1e-6);
        // "words": N=2, n_t=2 -> ln((0.5)/(2.5)+1) = ln(1.2)
        assert!((idx.idf["words"] - 1.2f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn top_k_truncates_sorted_results() {
        let entries: Vec<(String, String)> = (0..10)
            .map(|i| {
                let repeats = "needle ".repeat(i + 1);
                (format!("e{}", i), format!("{} padding words", repeats))
            })
            .collect();
        let idx = Bm25Index::build(entries.iter().map(|(id, t)| (id.clone(), t.as_str())));
        let results = idx.search("needle", 3);
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn empty_query_or_corpus_returns_nothing() {
        let idx = index(&[("a", "some text")]);
        assert!(idx.search("", 5).is_empty());
        assert!(idx.search("ab", 5).is_empty());

        let empty = index(&[]);
        assert!(empty.search("anything", 5).is_empty());
        assert!(empty.is_empty());
    }
}
