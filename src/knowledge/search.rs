//! Lexical retrieval over a knowledge snapshot.
//!
//! Scoring per surviving query token, summed per entry:
//!
//! | Signal | Points |
//! |--------|--------|
//! | title contains token (case-insensitive) | 10 |
//! | category equals token (case-insensitive) | 5 |
//! | each occurrence of token in content (case-insensitive) | 1 |
//!
//! Tokens are whitespace-separated words longer than three characters.
//! Entries scoring zero are dropped; the rest are ordered by score, ties kept
//! in snapshot order.

use serde::Serialize;

use super::types::KnowledgeEntry;

/// Results returned when the caller does not ask for a specific count.
pub const DEFAULT_TOP_K: usize = 3;

/// Tokens with this many characters or fewer are ignored.
const MAX_IGNORED_TOKEN_CHARS: usize = 3;

const TITLE_WEIGHT: u32 = 10;
const CATEGORY_WEIGHT: u32 = 5;

/// One ranked entry. Computed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub entry: KnowledgeEntry,
    pub score: u32,
}

/// Lowercased query words that survive the length filter.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|t| t.chars().count() > MAX_IGNORED_TOKEN_CHARS)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Score one entry against already-lowercased tokens.
pub fn score_entry(entry: &KnowledgeEntry, tokens: &[String]) -> u32 {
    let title = entry.title.to_lowercase();
    let category = entry.category.to_lowercase();
    let content = entry.content.to_lowercase();

    tokens
        .iter()
        .map(|token| {
            let mut score = 0u32;
            if title.contains(token.as_str()) {
                score += TITLE_WEIGHT;
            }
            if category == *token {
                score += CATEGORY_WEIGHT;
            }
            score + content.matches(token.as_str()).count() as u32
        })
        .sum()
}

/// Rank `entries` against `query` and keep the best `top_k`.
///
/// Returns an empty list when no token survives or nothing scores above zero.
pub fn retrieve(entries: &[KnowledgeEntry], query: &str, top_k: usize) -> Vec<RetrievalResult> {
    let tokens = query_tokens(query);
    if tokens.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<RetrievalResult> = entries
        .iter()
        .filter_map(|entry| {
            let score = score_entry(entry, &tokens);
            (score > 0).then(|| RetrievalResult {
                entry: entry.clone(),
                score,
            })
        })
        .collect();

    // sort_by is stable: equal scores keep snapshot order
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(top_k);

    tracing::debug!(
        tokens = tokens.len(),
        matched = scored.len(),
        "knowledge retrieval"
    );
    scored
}
