//! Deduplication and token-bounded batch planning

use std::collections::{HashMap, HashSet};

use super::tokens::count_text;

/// Unique texts in first-seen order.
pub fn dedup_preserving_order<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

pub fn occurrence_counts<S: AsRef<str>>(texts: &[S]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for text in texts {
        *counts.entry(text.as_ref().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Greedily group `texts` into batches of at most `max_tokens`.
///
/// A text is never split; one that exceeds the ceiling on its own ends up
/// alone in its batch. Batches keep input order.
pub fn split_batches<S: AsRef<str>>(texts: &[S], max_tokens: usize, model: &str) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;

    for text in texts {
        let text = text.as_ref();
        let tokens = count_text(text, model);
        if !current.is_empty() && current_tokens + tokens > max_tokens {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(text.to_string());
        current_tokens += tokens;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
