//! Query expansion.
//!
//! An [`Expander`] turns one query into a set of variants to search
//! with; the original query always comes first. The built-in
//! [`SynonymExpander`] substitutes common technical abbreviations with
//! their long forms, which recovers recall when documents spell terms
//! out.

/// Produces query variants for recall-oriented retrieval.
pub trait Expander: Send + Sync {
    /// Expand `query` into variants. The first element must be the
    /// original query verbatim.
    fn expand(&self, query: &str) -> Vec<String>;
}

/// Passthrough expander: the original query only.
pub struct NoExpander;

impl Expander for NoExpander {
    fn expand(&self, query: &str) -> Vec<String> {
        vec![query.to_string()]
    }
}

/// Table-driven synonym expander.
///
/// For every query token with a known synonym, emits one variant with
/// that token replaced by the synonym. Matching is on whole tokens
/// (case-insensitive); the replacement is spliced into a lowercased
/// copy of the query.
pub struct SynonymExpander {
    table: Vec<(&'static str, &'static str)>,
}

impl Default for SynonymExpander {
    fn default() -> Self {
        Self {
            table: vec![
                ("ai", "artificial intelligence"),
                ("ml", "machine learning"),
                ("nlp", "natural language processing"),
                ("db", "database"),
                ("api", "application programming interface"),
                ("app", "application"),
                ("config", "configuration"),
                ("auth", "authentication"),
                ("doc", "document"),
                ("k8s", "kubernetes"),
            ],
        }
    }
}

impl SynonymExpander {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Expander for SynonymExpander {
    fn expand(&self, query: &str) -> Vec<String> {
        let mut variants = vec![query.to_string()];
        let lower = query.to_lowercase();
        let tokens = tokenize_with_short(&lower);

        for (word, synonym) in &self.table {
            if tokens.iter().any(|t| t == word) {
                let variant = splice_token(&lower, word, synonym);
                if !variants.contains(&variant) {
                    variants.push(variant);
                }
            }
        }
        variants
    }
}

/// Like `bm25::tokenize` but keeps short tokens, since abbreviations such
/// as "ai" and "db" fall under the index tokenizer's length floor.
fn tokenize_with_short(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Replace whole-token occurrences of `word` in `text` with `with`.
fn splice_token(text: &str, word: &str, with: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(word) {
        let before_ok = pos == 0
            || !rest[..pos]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);
        let after = &rest[pos + word.len()..];
        let after_ok = after
            .chars()
            .next()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        out.push_str(&rest[..pos]);
        if before_ok && after_ok {
            out.push_str(with);
        } else {
            out.push_str(word);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}
