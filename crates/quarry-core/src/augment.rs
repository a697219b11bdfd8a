//! Prompt augmentation.
//!
//! Prepends retrieved context blocks to a user prompt so a downstream
//! language model can ground its answer. With no results the prompt
//! passes through unchanged, so callers can pipe every prompt through
//! this unconditionally.

use std::fmt::Write;

use crate::models::SearchResult;

const INSTRUCTION: &str =
    "Based on the context above, please answer the following question:";

/// Build an augmented prompt from retrieved results.
///
/// The output always contains the original prompt verbatim; with at
/// least one result it is strictly longer than the input.
pub fn augment_prompt(prompt: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        // write! to a String cannot fail.
        let _ = write!(out, "Context {}:\n{}\n\n", i + 1, result.content);
    }
    let _ = write!(out, "{}\n\nQuestion: {}", INSTRUCTION, prompt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str) -> SearchResult {
        SearchResult {
            document_id: "d1".to_string(),
            chunk_id: "d1-chunk-0".to_string(),
            content: content.to_string(),
            score: 1.0,
            rerank_score: None,
            title: None,
            chunk_index: 0,
            citations: Vec::new(),
        }
    }

    #[test]
    fn no_results_returns_prompt_unchanged() {
        assert_eq!(augment_prompt("what is rust?", &[]), "what is rust?");
    }

    #[test]
    fn context_blocks_are_numbered_in_order() {
        let out = augment_prompt("q", &[result("first passage"), result("second passage")]);
        let first = out.find("Context 1:\nfirst passage").unwrap();
        let second = out.find("Context 2:\nsecond passage").unwrap();
        assert!(first < second);
    }

    #[test]
    fn prompt_appears_verbatim_after_instruction() {
        let out = augment_prompt("what is ownership?", &[result("passage")]);
        assert!(out.contains(INSTRUCTION));
        assert!(out.ends_with("Question: what is ownership?"));
        assert!(out.len() > "what is ownership?".len());
    }
}
