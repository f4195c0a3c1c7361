// src/utils/text.rs

//! Text cleanup shared by the normalizer and feed parsers.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

/// Longest title or summary kept, in grapheme clusters.
pub const MAX_TEXT_GRAPHEMES: usize = 255;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?p\s*/?>|<[^>]+>").expect("tag pattern is valid")
});

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed, whitespace-normalized text, or `None` when blank.
pub fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(normalize_whitespace)
        .filter(|s| !s.is_empty())
}

/// Cut text to at most `max` grapheme clusters, appending an ellipsis
/// when anything was dropped.
pub fn truncate_graphemes(s: &str, max: usize) -> String {
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = graphemes[..keep].concat();
    out.push('…');
    out
}

/// Replace HTML line breaks with newlines and drop every other tag.
pub fn strip_html(s: &str) -> String {
    let with_breaks = TAG_RE.replace_all(s, |caps: &regex::Captures<'_>| {
        let tag = caps[0].to_ascii_lowercase();
        if tag.starts_with("<br") || tag.starts_with("<p") || tag.starts_with("</p") {
            "\n".to_string()
        } else {
            String::new()
        }
    });
    // `&amp;` last, so an escaped entity stays literal.
    with_breaks
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Short stable digest of the given parts, used to derive identities.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(&hasher.finalize()[..8])
}
