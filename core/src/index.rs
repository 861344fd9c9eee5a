use crate::tokenizer::index_tokenize;
use crate::{Book, BookId};
use std::collections::{BTreeSet, HashMap};

/// Token to book-id postings.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    pub postings: HashMap<String, BTreeSet<BookId>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, token: String, id: BookId) {
        self.postings.entry(token).or_default().insert(id);
    }

    pub fn get(&self, token: &str) -> Option<&BTreeSet<BookId>> {
        self.postings.get(token)
    }

    /// Drops `id` from every bucket. Linear in the number of tokens.
    pub fn remove(&mut self, id: BookId) {
        self.postings.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }
}

/// The two indexes kept per catalog: title, author, categories and synopsis
/// in `full`, the title alone in `title`.
#[derive(Debug, Default, Clone)]
pub struct CatalogIndex {
    pub full: InvertedIndex,
    pub title: InvertedIndex,
}

impl CatalogIndex {
    pub fn new() -> Self { Self::default() }

    pub fn build<'a>(books: impl IntoIterator<Item = &'a Book>) -> Self {
        let mut index = Self::new();
        for book in books {
            index.index(book);
        }
        index
    }

    pub fn index(&mut self, book: &Book) {
        let mut added = 0usize;
        let fields = std::iter::once(book.title.as_str())
            .chain(std::iter::once(book.author.as_str()))
            .chain(book.categories.iter().map(String::as_str))
            .chain(std::iter::once(book.synopsis.as_str()));
        for text in fields {
            for token in index_tokenize(text) {
                self.full.insert(token, book.id);
                added += 1;
            }
        }
        for token in index_tokenize(&book.title) {
            self.title.insert(token, book.id);
        }
        tracing::debug!(book_id = book.id, tokens = added, "indexed book");
    }

    pub fn deindex(&mut self, id: BookId) {
        self.full.remove(id);
        self.title.remove(id);
        tracing::debug!(book_id = id, "removed book from index");
    }

    /// Must follow every change to a book's indexed text.
    pub fn reindex(&mut self, book: &Book) {
        self.deindex(book.id);
        self.index(book);
    }

    pub fn lookup_full(&self, token: &str) -> BTreeSet<BookId> {
        self.full.get(token).cloned().unwrap_or_default()
    }

    /// Ids whose title holds every token. No tokens, no ids.
    pub fn lookup_title<S: AsRef<str>>(&self, tokens: &[S]) -> BTreeSet<BookId> {
        let mut iter = tokens.iter();
        let mut result = match iter.next() {
            Some(first) => self.title.get(first.as_ref()).cloned().unwrap_or_default(),
            None => return BTreeSet::new(),
        };
        for token in iter {
            if result.is_empty() {
                break;
            }
            match self.title.get(token.as_ref()) {
                Some(ids) => result.retain(|id| ids.contains(id)),
                None => result.clear(),
            }
        }
        result
    }

    /// Title keyword search. Token intersection first; when that finds
    /// nothing, a case-insensitive substring scan over raw titles, which is
    /// what makes unsegmented CJK queries work.
    pub fn search_in_title<'a>(&self, query: &str, books: impl IntoIterator<Item = &'a Book>) -> BTreeSet<BookId> {
        if query.is_empty() {
            return BTreeSet::new();
        }
        let exact = self.lookup_title(&index_tokenize(query));
        if !exact.is_empty() {
            return exact;
        }
        let needle = query.to_lowercase();
        books
            .into_iter()
            .filter(|b| b.title.to_lowercase().contains(&needle))
            .map(|b| b.id)
            .collect()
    }
}
