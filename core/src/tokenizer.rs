//! Text tokenizers.
//!
//! Two variants. [`tokenize`] feeds the
//! recommender vocabulary and emits every non-ASCII codepoint as its own
//! token, so unsegmented CJK text still produces terms. [`index_tokenize`]
//! feeds the catalog indexes and only ever sees ASCII words; non-ASCII text
//! there is handled by the substring fallback of title search.
//!
//! Both return distinct tokens in first-occurrence order.

use std::collections::HashSet;

/// Byte length of a UTF-8 sequence from its leading byte. Malformed leading
/// bytes count as one byte so scanning always advances.
fn utf8_char_len(first: u8) -> usize {
    if first & 0x80 == 0 {
        1
    } else if first & 0xE0 == 0xC0 {
        2
    } else if first & 0xF0 == 0xE0 {
        3
    } else if first & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

fn push_unique(token: String, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if !token.is_empty() && seen.insert(token.clone()) {
        out.push(token);
    }
}

fn flush(current: &mut String, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if !current.is_empty() {
        push_unique(std::mem::take(current), seen, out);
    }
}

/// Tokenize text for the recommender: lower-cased ASCII words (alphanumerics
/// and `_`) plus one token per non-ASCII codepoint.
pub fn tokenize(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();
    let mut current = String::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b < 0x80 {
            if b.is_ascii_alphanumeric() || b == b'_' {
                current.push(b.to_ascii_lowercase() as char);
            } else {
                flush(&mut current, &mut seen, &mut tokens);
            }
            i += 1;
            continue;
        }

        flush(&mut current, &mut seen, &mut tokens);
        let len = utf8_char_len(b);
        if i + len <= bytes.len() {
            // A `&str` only ever holds whole codepoints, but a stray
            // continuation byte still gets the one-byte fallback.
            if let Ok(ch) = std::str::from_utf8(&bytes[i..i + len]) {
                push_unique(ch.to_string(), &mut seen, &mut tokens);
            }
            i += len;
        } else {
            i += 1;
        }
    }
    flush(&mut current, &mut seen, &mut tokens);
    tokens
}

/// Tokenize text for the catalog indexes: lower-cased runs of ASCII
/// alphanumerics and `_`; everything else, non-ASCII included, separates.
pub fn index_tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();
    let mut current = String::new();

    for b in text.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' {
            current.push(b.to_ascii_lowercase() as char);
        } else {
            flush(&mut current, &mut seen, &mut tokens);
        }
    }
    flush(&mut current, &mut seen, &mut tokens);
    tokens
}
