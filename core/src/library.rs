//! The catalog facade that keeps books, loans and derived state together.
//!
//! Index maintenance is incremental and happens on every book mutation. The
//! recommender is rebuilt wholesale after any change that can move its
//! scores.

use crate::eval::Evaluator;
use crate::index::CatalogIndex;
use crate::query::{parse, CompareOp, QueryError};
use crate::recommend::{Recommendation, Recommender};
use crate::{Book, BookId, Loan};
use std::collections::{BTreeMap, BTreeSet};

/// Loan period recorded on new loans.
pub const LOAN_PERIOD_SECS: i64 = 14 * 24 * 60 * 60;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("a book with id {0} already exists")]
    DuplicateId(BookId),
    #[error("no book with id {0}")]
    UnknownBook(BookId),
    #[error("book {0} has more available copies than total copies")]
    InvalidCopies(BookId),
    #[error("no copies of book {0} are available")]
    NoCopiesAvailable(BookId),
    #[error("{username} has no open loan for book {book_id}")]
    NoActiveLoan { username: String, book_id: BookId },
    #[error("no book ids left to assign")]
    IdsExhausted,
}

#[derive(Debug)]
pub struct Library {
    books: BTreeMap<BookId, Book>,
    loans: Vec<Loan>,
    index: CatalogIndex,
    recommender: Recommender,
    next_id: BookId,
}

impl Default for Library {
    fn default() -> Self { Self::new() }
}

impl Library {
    pub fn new() -> Self {
        Self {
            books: BTreeMap::new(),
            loans: Vec::new(),
            index: CatalogIndex::new(),
            recommender: Recommender::default(),
            next_id: 1,
        }
    }

    /// Bulk load. Books with id 0 get fresh ids.
    pub fn from_parts(books: Vec<Book>, loans: Vec<Loan>) -> Result<Self, LibraryError> {
        let mut library = Self::new();
        for book in books {
            library.insert_book(book)?;
        }
        library.loans = loans;
        library.refresh_recommender();
        Ok(library)
    }

    fn insert_book(&mut self, mut book: Book) -> Result<BookId, LibraryError> {
        if book.id == 0 {
            if self.books.contains_key(&self.next_id) {
                return Err(LibraryError::IdsExhausted);
            }
            book.id = self.next_id;
        } else if self.books.contains_key(&book.id) {
            return Err(LibraryError::DuplicateId(book.id));
        }
        if !book.copies_are_consistent() {
            return Err(LibraryError::InvalidCopies(book.id));
        }
        book.dedup_categories();
        // Saturates at the top id; the next automatic id then collides and is refused.
        self.next_id = self.next_id.max(book.id.saturating_add(1));
        let id = book.id;
        self.index.index(&book);
        self.books.insert(id, book);
        Ok(id)
    }

    /// Loans of deleted books stay on record but no longer feed recommendations.
    fn refresh_recommender(&mut self) {
        let books = &self.books;
        let loans = self.loans.iter().filter(|loan| books.contains_key(&loan.book_id));
        self.recommender = Recommender::build(books.values(), loans);
    }

    pub fn add_book(&mut self, book: Book) -> Result<BookId, LibraryError> {
        let id = self.insert_book(book)?;
        self.refresh_recommender();
        Ok(id)
    }

    pub fn update_book(&mut self, mut book: Book) -> Result<(), LibraryError> {
        if !self.books.contains_key(&book.id) {
            return Err(LibraryError::UnknownBook(book.id));
        }
        if !book.copies_are_consistent() {
            return Err(LibraryError::InvalidCopies(book.id));
        }
        book.dedup_categories();
        self.index.reindex(&book);
        self.books.insert(book.id, book);
        self.refresh_recommender();
        Ok(())
    }

    pub fn delete_book(&mut self, id: BookId) -> Result<Book, LibraryError> {
        let book = self.books.remove(&id).ok_or(LibraryError::UnknownBook(id))?;
        self.index.deindex(id);
        self.refresh_recommender();
        Ok(book)
    }

    pub fn book(&self, id: BookId) -> Option<&Book> { self.books.get(&id) }

    /// Books in id order.
    pub fn books(&self) -> impl Iterator<Item = &Book> { self.books.values() }

    pub fn loans(&self) -> &[Loan] { &self.loans }

    pub fn index(&self) -> &CatalogIndex { &self.index }

    pub fn recommender(&self) -> &Recommender { &self.recommender }

    pub fn len(&self) -> usize { self.books.len() }

    pub fn is_empty(&self) -> bool { self.books.is_empty() }

    /// Records a loan due [`LOAN_PERIOD_SECS`] after `now`.
    pub fn borrow(&mut self, username: &str, id: BookId, now: i64) -> Result<(), LibraryError> {
        let book = self.books.get_mut(&id).ok_or(LibraryError::UnknownBook(id))?;
        if book.available_copies == 0 {
            return Err(LibraryError::NoCopiesAvailable(id));
        }
        book.available_copies -= 1;
        let mut loan = Loan::new(username, id, now);
        loan.due_at = now + LOAN_PERIOD_SECS;
        self.loans.push(loan);
        tracing::info!(username, book_id = id, "book borrowed");
        self.refresh_recommender();
        Ok(())
    }

    /// Closes the user's open loan. Loan history is unchanged as far as
    /// recommendations go, so no rebuild.
    pub fn return_book(&mut self, username: &str, id: BookId, now: i64) -> Result<(), LibraryError> {
        let loan = self
            .loans
            .iter_mut()
            .find(|l| l.username == username && l.book_id == id && !l.is_returned())
            .ok_or_else(|| LibraryError::NoActiveLoan { username: username.to_string(), book_id: id })?;
        loan.returned_at = Some(now);
        if let Some(book) = self.books.get_mut(&id) {
            if book.available_copies < book.total_copies {
                book.available_copies += 1;
            }
        }
        tracing::info!(username, book_id = id, "book returned");
        Ok(())
    }

    /// Substring keyword search across the descriptive fields.
    pub fn search(&self, keyword: &str) -> Vec<BookId> {
        self.books.values().filter(|b| b.matches_keyword(keyword)).map(|b| b.id).collect()
    }

    pub fn try_advanced_search(&self, query: &str) -> Result<Vec<BookId>, QueryError> {
        let node = parse(query)?;
        tracing::debug!(query, parsed = %node, "evaluating query");
        Ok(Evaluator::new(&self.index, &self.books).evaluate(&node).into_iter().collect())
    }

    /// Boolean/field query search. A query that does not parse finds nothing.
    pub fn advanced_search(&self, query: &str) -> Vec<BookId> {
        match self.try_advanced_search(query) {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(query, %error, "query did not parse");
                Vec::new()
            }
        }
    }

    pub fn filter_by_year(&self, year: i32, op: CompareOp) -> Vec<BookId> {
        self.books.values().filter(|b| b.matches_year(year, op)).map(|b| b.id).collect()
    }

    pub fn filter_by_category(&self, category: &str) -> Vec<BookId> {
        self.books.values().filter(|b| b.matches_category(category)).map(|b| b.id).collect()
    }

    pub fn collaborative_recommendations(&self, username: &str, count: usize) -> Vec<Recommendation> {
        self.recommender.collaborative(username, count)
    }

    pub fn content_recommendations(&self, id: BookId, count: usize) -> Vec<Recommendation> {
        self.recommender.content_based(id, count)
    }

    pub fn hybrid_recommendations(&self, username: &str, count: usize) -> Vec<Recommendation> {
        self.recommender.hybrid(username, count)
    }

    /// Books still in the catalog ranked by number of loans, for users with
    /// no history to personalise on.
    pub fn popular_books(&self, count: usize) -> Vec<(BookId, usize)> {
        let mut counts: BTreeMap<BookId, usize> = BTreeMap::new();
        for loan in &self.loans {
            if self.books.contains_key(&loan.book_id) {
                *counts.entry(loan.book_id).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(BookId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(count);
        ranked
    }

    /// Number of books per category, by category name.
    pub fn category_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for book in self.books.values() {
            for category in &book.categories {
                *stats.entry(category.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    pub fn has_history(&self, username: &str) -> bool {
        self.loans.iter().any(|l| l.username == username)
    }

    pub fn ids(&self) -> BTreeSet<BookId> { self.books.keys().copied().collect() }
}
