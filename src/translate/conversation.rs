//! Multi-turn conversational translator
//!
//! One translator exists per target language. It keeps a short rolling chat
//! history so later batches see the wording chosen for earlier ones, labels
//! every segment of a batch with `[[SEGn]]` and reads the labels back out of
//! the reply.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::cache::TranslationCache;
use super::llm::{ChatMessage, ChatProvider, ChatReply, ProviderError};
use crate::utils::{language_name, truncate_display};

pub const DEFAULT_PROMPT: &str = "You are a professional translator. \
     Translate the following XML-safe text from {from_lang} to {to_lang}. \
     Do not change XML tags.";

pub const BATCH_PREAMBLE: &str = "Translate each segment below. Every segment starts with a label \
     such as [[SEG1]]. Answer with the same labels in the same order, each followed only by \
     its translation. Keep [[TAGn]] placeholders, spaces and line breaks exactly as they are.";

/// Messages kept after the system prompt once an exchange completes.
pub const HISTORY_LIMIT: usize = 6;

pub const TEMPERATURE: f32 = 0.3;

static SEGMENT_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[SEG\d+\]\]").expect("segment marker regex"));

pub fn segment_marker(index: usize) -> String {
    format!("[[SEG{}]]", index)
}

pub fn render_system_prompt(template: Option<&str>, source_lang: &str, target_lang: &str) -> String {
    template
        .unwrap_or(DEFAULT_PROMPT)
        .replace("{from_lang}", &language_name(source_lang))
        .replace("{to_lang}", &language_name(target_lang))
}

pub fn build_batch_message(batch: &[String]) -> String {
    let mut message = String::from(BATCH_PREAMBLE);
    for (i, segment) in batch.iter().enumerate() {
        message.push('\n');
        message.push_str(&segment_marker(i + 1));
        message.push(' ');
        message.push_str(segment);
    }
    message
}

/// Split a reply into segment texts.
///
/// The k-th marker found is the k-th segment regardless of the number inside
/// it. Text before the first marker is ignored.
pub fn parse_reply(reply: &str) -> Vec<String> {
    let markers: Vec<_> = SEGMENT_MARKER_RE.find_iter(reply).collect();
    markers
        .iter()
        .enumerate()
        .map(|(k, m)| {
            let end = markers.get(k + 1).map(|n| n.start()).unwrap_or(reply.len());
            clean_segment(&reply[m.end()..end])
        })
        .collect()
}

fn clean_segment(raw: &str) -> String {
    let text = raw.strip_prefix(' ').unwrap_or(raw);
    text.trim_end_matches(['\n', '\r']).to_string()
}

/// System prompt followed by a capped tail of completed exchanges.
///
/// Only answered exchanges enter the tail, so concurrent requests of one
/// language never see each other's unanswered messages.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system: ChatMessage,
    tail: VecDeque<ChatMessage>,
    limit: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_limit(system_prompt, HISTORY_LIMIT)
    }

    pub fn with_limit(system_prompt: impl Into<String>, limit: usize) -> Self {
        Self {
            system: ChatMessage::system(system_prompt),
            tail: VecDeque::with_capacity(limit + 2),
            limit,
        }
    }

    /// Store a user message together with its reply, then drop the oldest
    /// messages beyond the limit.
    pub fn record_exchange(&mut self, user: ChatMessage, assistant: ChatMessage) {
        self.tail.push_back(user);
        self.tail.push_back(assistant);
        while self.tail.len() > self.limit {
            self.tail.pop_front();
        }
    }

    /// Messages for a new request: system prompt, the retained tail, then `user`.
    pub fn request(&self, user: ChatMessage) -> Vec<ChatMessage> {
        let skip = self.tail.len().saturating_sub(self.limit);
        std::iter::once(self.system.clone())
            .chain(self.tail.iter().skip(skip).cloned())
            .chain(std::iter::once(user))
            .collect()
    }

    #[allow(dead_code)]
    pub fn messages(&self) -> Vec<ChatMessage> {
        std::iter::once(self.system.clone())
            .chain(self.tail.iter().cloned())
            .collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        1 + self.tail.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
    /// Only the system prompt has been set up.
    Idle,
    /// At least one batch has been sent.
    Active,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub translations: Vec<String>,
    /// Tokens reported by the provider for this request.
    pub tokens: Option<u64>,
    pub failed: bool,
}

pub struct ConversationalTranslator {
    provider: Arc<dyn ChatProvider>,
    model: String,
    target_lang: String,
    history: ConversationHistory,
    cache: TranslationCache,
    state: TranslatorState,
    tokens_used: u64,
    failed_batches: usize,
}

impl ConversationalTranslator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        model: &str,
        source_lang: &str,
        target_lang: &str,
        prompt: Option<&str>,
    ) -> Self {
        Self {
            provider,
            model: model.to_string(),
            target_lang: target_lang.to_string(),
            history: ConversationHistory::new(render_system_prompt(prompt, source_lang, target_lang)),
            cache: TranslationCache::new(),
            state: TranslatorState::Idle,
            tokens_used: 0,
            failed_batches: 0,
        }
    }

    pub fn provider(&self) -> Arc<dyn ChatProvider> {
        Arc::clone(&self.provider)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[allow(dead_code)]
    pub fn state(&self) -> TranslatorState {
        self.state
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn into_cache(self) -> TranslationCache {
        self.cache
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn failed_batches(&self) -> usize {
        self.failed_batches
    }

    /// Messages to send for `batch`. The history itself is left untouched
    /// until the reply is applied.
    pub fn begin_exchange(&mut self, batch: &[String]) -> Vec<ChatMessage> {
        self.state = TranslatorState::Active;
        self.history.request(ChatMessage::user(build_batch_message(batch)))
    }

    /// Apply the provider result for `batch`. Failures fall back to the
    /// source segments and leave the history unchanged.
    pub fn complete_exchange(
        &mut self,
        batch: &[String],
        result: Result<ChatReply, ProviderError>,
    ) -> BatchOutcome {
        match result {
            Ok(reply) => {
                let parsed = parse_reply(&reply.content);
                if parsed.len() != batch.len() {
                    tracing::warn!(
                        "[{}] Expected {} segments in reply, found {}",
                        self.target_lang,
                        batch.len(),
                        parsed.len()
                    );
                }

                for (source, translated) in batch.iter().zip(parsed.iter()) {
                    self.cache.set(source, translated);
                }

                let translations = batch
                    .iter()
                    .enumerate()
                    .map(|(i, source)| parsed.get(i).cloned().unwrap_or_else(|| source.clone()))
                    .collect();

                let tokens = reply.usage.map(|u| u.total_tokens);
                self.tokens_used += tokens.unwrap_or(0);
                self.history.record_exchange(
                    ChatMessage::user(build_batch_message(batch)),
                    ChatMessage::assistant(reply.content),
                );

                BatchOutcome {
                    translations,
                    tokens,
                    failed: false,
                }
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    "[{}] Rate limited or out of quota, keeping {} segments untranslated: {}",
                    self.target_lang,
                    batch.len(),
                    e
                );
                self.fail(batch)
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Translation failed for batch starting {:?}: {}",
                    self.target_lang,
                    batch.first().map(|s| truncate_display(s, 40)).unwrap_or_default(),
                    e
                );
                self.fail(batch)
            }
        }
    }

    fn fail(&mut self, batch: &[String]) -> BatchOutcome {
        self.failed_batches += 1;
        BatchOutcome {
            translations: batch.to_vec(),
            tokens: None,
            failed: true,
        }
    }

    pub async fn translate_batch(&mut self, batch: &[String]) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::default();
        }

        let messages = self.begin_exchange(batch);
        tracing::debug!(
            "[{}] Sending batch of {} segments ({} messages)",
            self.target_lang,
            batch.len(),
            messages.len()
        );
        let result = self
            .provider
            .complete(&messages, &self.model, TEMPERATURE)
            .await;
        self.complete_exchange(batch, result)
    }

    pub async fn translate_single(&mut self, text: &str) -> String {
        self.translate_batch(&[text.to_string()])
            .await
            .translations
            .into_iter()
            .next()
            .unwrap_or_else(|| text.to_string())
    }
}
