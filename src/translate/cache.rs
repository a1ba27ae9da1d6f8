//! Per-language translation cache
//!
//! Lives for one job and one target language; nothing is written to disk.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TranslationCache {
    entries: HashMap<String, String>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<&str> {
        self.entries.get(text).map(String::as_str)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    pub fn set(&mut self, text: &str, translated: &str) {
        self.entries.insert(text.to_string(), translated.to_string());
    }

    /// Cached translation, or the source text on a miss.
    pub fn resolve(&self, text: &str) -> String {
        self.get(text).unwrap_or(text).to_string()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
