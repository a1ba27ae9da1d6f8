//! Story XML access
//!
//! A story is kept as its original text. `Content` elements are located with
//! quick-xml and rewritten in place by splicing, so everything outside the
//! translated spans is written back byte for byte.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::translate::markup::{from_placeholders, strip_markers, to_placeholders};

const CONTENT_TAG: &[u8] = b"Content";
const BOM: char = '\u{feff}';

/// One translatable `Content` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    /// Byte range of the inner markup within the story source.
    pub span: Range<usize>,
    pub raw: String,
    /// Placeholder text handed to the translator.
    pub text: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StoryXml {
    source: String,
    nodes: Vec<ContentNode>,
}

impl StoryXml {
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read story {}", path.display()))?;
        Self::parse(source).with_context(|| format!("Failed to parse story {}", path.display()))
    }

    pub fn parse(source: String) -> Result<Self> {
        let nodes = find_content_nodes(&source)?;
        Ok(Self { source, nodes })
    }

    /// Non-blank `Content` elements in document order.
    #[allow(dead_code)]
    pub fn content_nodes(&self) -> &[ContentNode] {
        &self.nodes
    }

    pub fn texts(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Write `translations` into the content nodes, pairing them in order.
    ///
    /// Nodes past the end of `translations` keep their current markup.
    pub fn apply_translations<S: AsRef<str>>(&mut self, translations: &[S]) {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;

        for (i, node) in self.nodes.iter_mut().enumerate() {
            let raw = match translations.get(i) {
                Some(t) => from_placeholders(t.as_ref(), &node.tags),
                None => node.raw.clone(),
            };

            out.push_str(&self.source[cursor..node.span.start]);
            let start = out.len();
            out.push_str(&raw);
            cursor = node.span.end;

            let (text, tags) = to_placeholders(&raw);
            node.span = start..out.len();
            node.raw = raw;
            node.text = text;
            node.tags = tags;
        }

        out.push_str(&self.source[cursor..]);
        self.source = out;
    }

    #[allow(dead_code)]
    pub fn to_xml(&self) -> &str {
        &self.source
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.source)
            .with_context(|| format!("Failed to write story {}", path.display()))
    }
}

fn find_content_nodes(source: &str) -> Result<Vec<ContentNode>> {
    let offset = if source.starts_with(BOM) { BOM.len_utf8() } else { 0 };
    let mut reader = Reader::from_str(&source[offset..]);
    reader.config_mut().trim_text(false);

    let mut nodes = Vec::new();
    loop {
        match reader.read_event().context("Malformed story XML")? {
            Event::Start(e) if e.local_name().as_ref() == CONTENT_TAG => {
                let end = e.to_end().into_owned();
                let inner = reader
                    .read_to_end(end.name())
                    .context("Unclosed Content element")?;
                let span = (inner.start as usize + offset)..(inner.end as usize + offset);

                let raw = &source[span.clone()];
                let (text, tags) = to_placeholders(raw);
                if strip_markers(&text).trim().is_empty() {
                    continue;
                }

                nodes.push(ContentNode {
                    span,
                    raw: raw.to_string(),
                    text,
                    tags,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(nodes)
}
