//! Token counting and cost estimation

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

use super::batch::dedup_preserving_order;
use super::conversation::{BATCH_PREAMBLE, DEFAULT_PROMPT};

/// Approximate USD rates per 1k tokens.
pub const MODEL_RATES: &[(&str, f64)] = &[
    ("gpt-3.5-turbo", 0.001),
    ("gpt-4", 0.03),
    ("gpt-4o", 0.005),
];

/// Rate for models missing from [`MODEL_RATES`].
pub const DEFAULT_RATE: f64 = 0.03;

/// Fixed protocol framing per request, counted once for the request and once
/// for the response.
const REQUEST_OVERHEAD: usize = 8;

static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!("cl100k tokenizer unavailable: {}", e);
        None
    }
});

/// Chat models are counted with cl100k_base whatever `model` names; the
/// parameter only picks the price.
fn encoder_for(_model: &str) -> Option<&'static CoreBPE> {
    CL100K.as_ref()
}

/// Token count of a single text, 0 when no tokenizer is available.
pub fn count_text(text: &str, model: &str) -> usize {
    encoder_for(model)
        .map(|bpe| bpe.encode_ordinary(text).len())
        .unwrap_or(0)
}

pub fn count_tokens<S: AsRef<str>>(texts: &[S], model: &str) -> usize {
    let Some(bpe) = encoder_for(model) else {
        return 0;
    };
    texts
        .iter()
        .map(|t| bpe.encode_ordinary(t.as_ref()).len())
        .sum()
}

pub fn rate_for(model: &str) -> f64 {
    MODEL_RATES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_RATE)
}

pub fn estimate_cost(tokens: usize, model: &str, language_count: usize) -> f64 {
    (tokens as f64 / 1000.0) * rate_for(model) * language_count as f64
}

/// Pre-flight estimate for translating `texts` into `language_count`
/// languages. Duplicates are counted once and the response is assumed to be
/// as long as the request.
pub fn estimate_total_tokens<S: AsRef<str>>(
    texts: &[S],
    model: &str,
    language_count: usize,
) -> usize {
    let unique = dedup_preserving_order(texts);

    let segments = count_tokens(&unique, model);
    let system = count_text(DEFAULT_PROMPT, model);
    let preamble = count_text(BATCH_PREAMBLE, model);
    let markers = unique.len();

    let request = segments + system + preamble + markers + REQUEST_OVERHEAD * 2;
    let response = request;

    (request + response) * language_count
}
