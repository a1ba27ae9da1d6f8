//! Stub providers shared by the translation tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::conversation::{BATCH_PREAMBLE, parse_reply, segment_marker};
use super::llm::{ChatMessage, ChatProvider, ChatReply, ProviderError, Role, Usage};

/// Answers every labelled segment of the last user message with the segment
/// plus a suffix, keeping the label scheme intact.
#[derive(Default)]
pub struct SuffixProvider {
    suffix: String,
    drop_last: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl SuffixProvider {
    pub const TOKENS_PER_CALL: u64 = 42;

    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            ..Self::default()
        }
    }

    /// Leave the last segment out of every reply.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for SuffixProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<ChatReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());
        tokio::task::yield_now().await;

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let body = last_user.strip_prefix(BATCH_PREAMBLE).unwrap_or(last_user);

        let mut segments = parse_reply(body);
        if self.drop_last {
            segments.pop();
        }

        let content = segments
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{} {}{}", segment_marker(i + 1), s, self.suffix))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ChatReply {
            content,
            usage: Some(Usage {
                total_tokens: Self::TOKENS_PER_CALL,
                ..Usage::default()
            }),
        })
    }
}

#[derive(Default)]
pub struct FailingProvider {
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for FailingProvider {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<ChatReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Status {
            status: 500,
            body: "upstream unavailable".to_string(),
        })
    }
}
