use bookshelf_core::tokenizer::{index_tokenize, tokenize};

#[test]
fn it_lowercases_and_dedups() {
    let toks = tokenize("Rust RUST rust! The Rust Book.");
    assert_eq!(toks, vec!["rust", "the", "book"]);
}

#[test]
fn it_splits_cjk_per_codepoint() {
    let toks = tokenize("三體 The Three-Body Problem");
    assert_eq!(toks, vec!["三", "體", "the", "three", "body", "problem"]);
}

#[test]
fn empty_text_has_no_tokens() {
    assert!(tokenize("").is_empty());
    assert!(index_tokenize("").is_empty());
    assert!(tokenize("  ,.;  ").is_empty());
}

#[test]
fn index_tokenizer_ignores_cjk() {
    assert_eq!(index_tokenize("三體 The Three-Body Problem"), vec!["the", "three", "body", "problem"]);
}
