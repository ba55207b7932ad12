//! Splits message text into prose and code for rendering.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(\w+)?\n?((?s:.*?))```").expect("fence pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("inline code pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(Vec<Inline>),
    Code { language: String, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
}

/// Fenced blocks become `Code`; the prose between them is kept when not blank.
pub fn segment(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in FENCED_BLOCK.captures_iter(content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_prose(&mut segments, &content[last..whole.start()]);

        let language = caps.get(1).map_or("text", |lang| lang.as_str());
        let code = caps.get(2).map_or("", |code| code.as_str());
        segments.push(Segment::Code {
            language: normalize_language(language).to_string(),
            code: code.trim().to_string(),
        });
        last = whole.end();
    }
    push_prose(&mut segments, &content[last..]);

    if segments.is_empty() {
        segments.push(Segment::Text(split_inline(content)));
    }
    segments
}

fn push_prose(segments: &mut Vec<Segment>, prose: &str) {
    if !prose.trim().is_empty() {
        segments.push(Segment::Text(split_inline(prose)));
    }
}

fn normalize_language(language: &str) -> &str {
    match language {
        "js" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "html" | "xml" => "markup",
        other => other,
    }
}

pub fn split_inline(text: &str) -> Vec<Inline> {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in INLINE_CODE.captures_iter(text) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            parts.push(Inline::Text(text[last..whole.start()].to_string()));
        }
        parts.push(Inline::Code(code.as_str().to_string()));
        last = whole.end();
    }
    if last < text.len() {
        parts.push(Inline::Text(text[last..].to_string()));
    }
    parts
}
