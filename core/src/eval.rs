//! Query evaluation against the catalog.

use crate::index::CatalogIndex;
use crate::matcher::book_matches;
use crate::query::{CompareOp, Node};
use crate::{Book, BookId};
use std::collections::{BTreeMap, BTreeSet};

/// Evaluates parsed queries. Negation is relative to `universe`, which
/// defaults to every book in the catalog.
pub struct Evaluator<'a> {
    index: &'a CatalogIndex,
    books: &'a BTreeMap<BookId, Book>,
    universe: BTreeSet<BookId>,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a CatalogIndex, books: &'a BTreeMap<BookId, Book>) -> Self {
        Self { index, books, universe: books.keys().copied().collect() }
    }

    pub fn with_universe(mut self, universe: BTreeSet<BookId>) -> Self {
        self.universe = universe;
        self
    }

    pub fn evaluate(&self, node: &Node) -> BTreeSet<BookId> {
        match node {
            // Bare terms search titles only.
            Node::Term(term) => self.index.search_in_title(term, self.books.values()),
            Node::And(left, right) => {
                let left = self.evaluate(left);
                if left.is_empty() {
                    return left;
                }
                let right = self.evaluate(right);
                left.intersection(&right).copied().collect()
            }
            Node::Or(left, right) => {
                let mut result = self.evaluate(left);
                result.extend(self.evaluate(right));
                result
            }
            Node::Not(child) => {
                let excluded = self.evaluate(child);
                self.universe.difference(&excluded).copied().collect()
            }
            Node::Field { field, op, value } => self.field_query(field, *op, value),
        }
    }

    /// Linear scan; field predicates are relational, not token lookups.
    fn field_query(&self, field: &str, op: CompareOp, value: &str) -> BTreeSet<BookId> {
        self.books
            .values()
            .filter(|book| book_matches(book, field, op, value))
            .map(|book| book.id)
            .collect()
    }
}

pub fn evaluate(node: &Node, index: &CatalogIndex, books: &BTreeMap<BookId, Book>) -> BTreeSet<BookId> {
    Evaluator::new(index, books).evaluate(node)
}
