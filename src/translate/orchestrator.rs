//! Multi-language batch translation
//!
//! Texts are deduplicated once, then every target language gets its own
//! [`ConversationalTranslator`]. The sequential driver sends one batch at a
//! time; the concurrent driver launches every batch of every language at once
//! and waits for all of them. Either way the output is rebuilt in the caller's
//! original order from the per-language caches.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::batch::{dedup_preserving_order, occurrence_counts, split_batches};
use super::cache::TranslationCache;
use super::conversation::{BatchOutcome, ConversationalTranslator, TEMPERATURE};
use super::llm::{ChatProvider, DEFAULT_MODEL};

pub const DEFAULT_MAX_TOKENS: usize = 800;
pub const DEFAULT_ASYNC_MAX_TOKENS: usize = 1500;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Translations per target language, in the caller's input order.
pub type JobResult = HashMap<String, Vec<String>>;

pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);
pub type TokensFn<'a> = &'a (dyn Fn(u64) + Send + Sync);

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub source_lang: String,
    pub prompt: Option<String>,
    pub max_tokens: usize,
    pub delay: Option<Duration>,
    pub model: String,
}

impl BatchOptions {
    pub fn new(source_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            delay: Some(DEFAULT_DELAY),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[derive(Clone, Copy, Default)]
pub struct Callbacks<'a> {
    /// Percentage done, 0-100. Never decreases and ends with 100.
    pub progress: Option<ProgressFn<'a>>,
    /// Token increments as reported by the provider.
    pub tokens: Option<TokensFn<'a>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub requests: usize,
    pub failed_batches: usize,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub translations: JobResult,
    pub stats: JobStats,
}

/// Drop duplicates and the source language from a target list.
pub fn normalize_targets(targets: &[String], source_lang: &str) -> Vec<String> {
    let filtered: Vec<&String> = targets
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(source_lang))
        .collect();
    dedup_preserving_order(&filtered)
}

struct ProgressTracker<'a> {
    done: AtomicUsize,
    last: AtomicU8,
    total: usize,
    callback: Option<ProgressFn<'a>>,
}

impl<'a> ProgressTracker<'a> {
    fn new(total: usize, callback: Option<ProgressFn<'a>>) -> Self {
        Self {
            done: AtomicUsize::new(0),
            last: AtomicU8::new(0),
            total,
            callback,
        }
    }

    fn advance(&self, occurrences: usize) {
        let done = self.done.fetch_add(occurrences, Ordering::SeqCst) + occurrences;
        let percent = if self.total == 0 {
            100
        } else {
            (done * 100 / self.total).min(100) as u8
        };
        self.emit(percent);
    }

    fn finish(&self) {
        self.emit(100);
    }

    fn emit(&self, percent: u8) {
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent >= previous {
            if let Some(cb) = self.callback {
                cb(percent);
            }
        }
    }
}

struct TokenMeter<'a> {
    total: AtomicU64,
    callback: Option<TokensFn<'a>>,
}

impl<'a> TokenMeter<'a> {
    fn new(callback: Option<TokensFn<'a>>) -> Self {
        Self {
            total: AtomicU64::new(0),
            callback,
        }
    }

    fn record(&self, tokens: Option<u64>) {
        if let Some(n) = tokens {
            self.total.fetch_add(n, Ordering::SeqCst);
            if let Some(cb) = self.callback {
                cb(n);
            }
        }
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

fn assemble<S: AsRef<str>>(texts: &[S], caches: &[(String, TranslationCache)]) -> JobResult {
    caches
        .iter()
        .map(|(lang, cache)| {
            let translated = texts.iter().map(|t| cache.resolve(t.as_ref())).collect();
            (lang.clone(), translated)
        })
        .collect()
}

fn pending_texts(unique: &[String], cache: &TranslationCache) -> Vec<String> {
    unique.iter().filter(|t| !cache.contains(t)).cloned().collect()
}

/// Translate `texts` into every target language, one request at a time.
pub async fn batch_translate<S: AsRef<str>>(
    provider: Arc<dyn ChatProvider>,
    texts: &[S],
    target_langs: &[String],
    options: &BatchOptions,
    callbacks: Callbacks<'_>,
) -> JobOutput {
    let counts = occurrence_counts(texts);
    let unique = dedup_preserving_order(texts);
    let progress = ProgressTracker::new(texts.len() * target_langs.len(), callbacks.progress);
    let tokens = TokenMeter::new(callbacks.tokens);

    let mut stats = JobStats::default();
    let mut caches = Vec::with_capacity(target_langs.len());

    for lang in target_langs {
        let mut translator = ConversationalTranslator::new(
            Arc::clone(&provider),
            &options.model,
            &options.source_lang,
            lang,
            options.prompt.as_deref(),
        );

        let pending = pending_texts(&unique, translator.cache());
        let batches = split_batches(&pending, options.max_tokens, &options.model);
        info!(
            "[{}] Translating {} unique segments in {} batch(es)",
            lang,
            pending.len(),
            batches.len()
        );

        for batch in &batches {
            // Pause between consecutive requests, never after the last one.
            if stats.requests > 0 {
                if let Some(delay) = options.delay {
                    tokio::time::sleep(delay).await;
                }
            }

            let outcome = translator.translate_batch(batch).await;
            debug!(
                "[{}] Batch of {} segments done (failed: {})",
                lang,
                batch.len(),
                outcome.failed
            );
            stats.requests += 1;
            tokens.record(outcome.tokens);

            for segment in batch {
                progress.advance(counts.get(segment).copied().unwrap_or(1));
            }
        }

        stats.failed_batches += translator.failed_batches();
        caches.push((lang.clone(), translator.into_cache()));
    }

    progress.finish();
    stats.tokens_used = tokens.total();

    JobOutput {
        translations: assemble(texts, &caches),
        stats,
    }
}

/// Same contract as [`batch_translate`], but every batch of every language is
/// in flight at once.
pub async fn async_batch_translate<S: AsRef<str>>(
    provider: Arc<dyn ChatProvider>,
    texts: &[S],
    target_langs: &[String],
    options: &BatchOptions,
    callbacks: Callbacks<'_>,
) -> JobOutput {
    let counts = occurrence_counts(texts);
    let unique = dedup_preserving_order(texts);
    let progress = ProgressTracker::new(texts.len() * target_langs.len(), callbacks.progress);
    let tokens = TokenMeter::new(callbacks.tokens);

    let translators: Vec<(String, Mutex<ConversationalTranslator>)> = target_langs
        .iter()
        .map(|lang| {
            let translator = ConversationalTranslator::new(
                Arc::clone(&provider),
                &options.model,
                &options.source_lang,
                lang,
                options.prompt.as_deref(),
            );
            (lang.clone(), Mutex::new(translator))
        })
        .collect();

    let mut units = Vec::new();
    for (lang, translator) in &translators {
        let pending = pending_texts(&unique, translator.lock().cache());
        let batches = split_batches(&pending, options.max_tokens, &options.model);
        info!(
            "[{}] Queueing {} unique segments in {} batch(es)",
            lang,
            pending.len(),
            batches.len()
        );
        for batch in batches {
            units.push(run_unit(
                translator,
                batch,
                &counts,
                &progress,
                &tokens,
                options.delay,
            ));
        }
    }

    debug!("Dispatching {} batches concurrently", units.len());
    let outcomes = join_all(units).await;

    let mut stats = JobStats {
        requests: outcomes.len(),
        ..JobStats::default()
    };
    let caches: Vec<(String, TranslationCache)> = translators
        .into_iter()
        .map(|(lang, translator)| {
            let translator = translator.into_inner();
            stats.failed_batches += translator.failed_batches();
            (lang, translator.into_cache())
        })
        .collect();

    progress.finish();
    stats.tokens_used = tokens.total();

    JobOutput {
        translations: assemble(texts, &caches),
        stats,
    }
}

async fn run_unit(
    translator: &Mutex<ConversationalTranslator>,
    batch: Vec<String>,
    counts: &HashMap<String, usize>,
    progress: &ProgressTracker<'_>,
    tokens: &TokenMeter<'_>,
    delay: Option<Duration>,
) -> BatchOutcome {
    // The lock is only held while touching history and cache, never across
    // the provider call.
    let (messages, provider, model) = {
        let mut t = translator.lock();
        let messages = t.begin_exchange(&batch);
        (messages, t.provider(), t.model().to_string())
    };

    let result = provider.complete(&messages, &model, TEMPERATURE).await;
    let outcome = translator.lock().complete_exchange(&batch, result);

    tokens.record(outcome.tokens);
    for segment in &batch {
        progress.advance(counts.get(segment).copied().unwrap_or(1));
    }

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    outcome
}
