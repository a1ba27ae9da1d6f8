//! Inline markup protection for story content
//!
//! Tags inside a `Content` element are swapped for `[[TAGn]]` markers before
//! the text goes to the model, and swapped back afterwards.

use once_cell::sync::Lazy;
use quick_xml::escape::unescape;
use regex::{Captures, Regex};
use std::borrow::Cow;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static TAG_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[TAG(\d+)\]\]").expect("tag marker regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&[^&;\s]+;").expect("entity regex"));

pub fn tag_marker(index: usize) -> String {
    format!("[[TAG{}]]", index)
}

/// Replace every tag in `raw` with a sequential marker.
///
/// Returns the marked text and the original tags in encounter order. Text
/// between tags keeps its whitespace; character references are resolved so
/// the model sees `&` rather than `&amp;`.
pub fn to_placeholders(raw: &str) -> (String, Vec<String>) {
    let mut text = String::with_capacity(raw.len());
    let mut tags = Vec::new();
    let mut pos = 0;

    for m in TAG_RE.find_iter(raw) {
        text.push_str(&unescape_text(&raw[pos..m.start()]));
        tags.push(m.as_str().to_string());
        text.push_str(&tag_marker(tags.len()));
        pos = m.end();
    }
    text.push_str(&unescape_text(&raw[pos..]));

    (text, tags)
}

/// Inverse of [`to_placeholders`].
///
/// Markers that point past the end of `tags` stay in the output as literal
/// text.
pub fn from_placeholders(text: &str, tags: &[String]) -> String {
    let escaped = escape_text(text);
    TAG_MARKER_RE
        .replace_all(&escaped, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| tags.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Text with the markers removed. Used to skip nodes that only hold markup.
pub fn strip_markers(text: &str) -> Cow<'_, str> {
    TAG_MARKER_RE.replace_all(text, "")
}

/// Resolve each character reference on its own. Unknown references and
/// stray `&` are kept as-is and re-escaped on the way back.
fn unescape_text(s: &str) -> Cow<'_, str> {
    ENTITY_RE.replace_all(s, |caps: &Captures<'_>| {
        let reference = &caps[0];
        unescape(reference)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| reference.to_string())
    })
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
