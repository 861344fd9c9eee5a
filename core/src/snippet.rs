//! Highlighted excerpts for search output.

use regex::{Regex, RegexBuilder};

/// One case-insensitive alternation over the non-blank terms, longest first
/// so a longer term wins over its own prefix.
fn terms_pattern<S: AsRef<str>>(terms: &[S]) -> Option<Regex> {
    let mut alternatives: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    alternatives.sort_by(|a, b| b.len().cmp(&a.len()));
    RegexBuilder::new(&alternatives.join("|")).case_insensitive(true).build().ok()
}

/// Wraps every occurrence of any term in `<em>`.
pub fn highlight_terms<S: AsRef<str>>(text: &str, terms: &[S]) -> String {
    match terms_pattern(terms) {
        Some(pattern) => pattern.replace_all(text, "<em>$0</em>").into_owned(),
        None => text.to_string(),
    }
}

/// Up to `radius` characters either side of the first term hit, highlighted
/// and marked with `...` where cut. `None` when no term occurs in `text`.
pub fn excerpt<S: AsRef<str>>(text: &str, terms: &[S], radius: usize) -> Option<String> {
    let pattern = terms_pattern(terms)?;
    let hit = pattern.find(text)?;
    let start = text[..hit.start()]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(hit.start(), |(i, _)| i);
    let end = text[hit.end()..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| hit.end() + i);

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&pattern.replace_all(&text[start..end], "<em>$0</em>"));
    if end < text.len() {
        out.push_str("...");
    }
    Some(out)
}
