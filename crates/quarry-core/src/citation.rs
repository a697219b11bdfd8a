//! Citation extraction from retrieved chunks.
//!
//! Pulls the first few substantive sentences out of a chunk so answers
//! can point back at their sources. Sentence position drives the
//! confidence score: earlier sentences in a chunk are assumed more
//! topical.

use crate::models::Citation;

/// Sentences shorter than this are treated as fragments and skipped.
const MIN_SENTENCE_CHARS: usize = 50;

/// At most this many citations per chunk.
const MAX_CITATIONS: usize = 3;

/// Extract up to three citation-worthy sentences from `text`.
///
/// Sentences are split on `.`, `!`, `?`; only those longer than
/// [`MIN_SENTENCE_CHARS`] qualify. Confidence starts at `0.8` and rises
/// by `0.1` per position, capped at `1.0`.
pub fn extract_citations(chunk_id: &str, text: &str, source_title: &str) -> Vec<Citation> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .take(MAX_CITATIONS)
        .enumerate()
        .map(|(i, sentence)| Citation {
            id: format!("{}-cite-{}", chunk_id, i),
            text: sentence.to_string(),
            source_title: source_title.to_string(),
            page: None,
            confidence: (0.8 + 0.1 * i as f32).min(1.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_A: &str =
        "Ownership is the single most distinctive feature of the Rust language";
    const LONG_B: &str =
        "The borrow checker enforces these rules at compile time with no runtime cost";
    const LONG_C: &str =
        "Lifetimes describe how long references remain valid within a given scope";
    const LONG_D: &str =
        "Smart pointers such as Box and Rc extend ownership beyond the stack frame";

    #[test]
    fn short_fragments_are_skipped() {
        let text = format!("Yes. No! {}.", LONG_A);
        let citations = extract_citations("c1", &text, "Rust Book");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].text, LONG_A);
    }

    #[test]
    fn capped_at_three_citations() {
        let text = format!("{}. {}. {}. {}.", LONG_A, LONG_B, LONG_C, LONG_D);
        let citations = extract_citations("c1", &text, "Rust Book");
        assert_eq!(citations.len(), 3);
    }

    #[test]
    fn confidence_rises_with_position_and_caps() {
        let text = format!("{}. {}. {}.", LONG_A, LONG_B, LONG_C);
        let citations = extract_citations("c1", &text, "Rust Book");
        assert!((citations[0].confidence - 0.8).abs() < 1e-6);
        assert!((citations[1].confidence - 0.9).abs() < 1e-6);
        assert!((citations[2].confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ids_and_title_are_stamped() {
        let text = format!("{}.", LONG_A);
        let citations = extract_citations("chunk-7", &text, "Rust Book");
        assert_eq!(citations[0].id, "chunk-7-cite-0");
        assert_eq!(citations[0].source_title, "Rust Book");
        assert_eq!(citations[0].page, None);
    }

    #[test]
    fn boundary_length_sentence_is_excluded() {
        // Exactly 50 chars does not qualify; the rule is strictly greater.
        let fifty = "a".repeat(50);
        let citations = extract_citations("c1", &format!("{}.", fifty), "T");
        assert!(citations.is_empty());
    }

    #[test]
    fn no_qualifying_sentences_yields_empty() {
        assert!(extract_citations("c1", "Short. Tiny. Small.", "T").is_empty());
    }
}
