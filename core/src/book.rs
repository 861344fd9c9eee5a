use crate::query::CompareOp;
use crate::BookId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Zero means "not assigned yet"; the catalog hands out the next free id.
    #[serde(default)]
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub total_copies: u32,
    #[serde(default)]
    pub available_copies: u32,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Book {
    /// A book with every copy on the shelf.
    pub fn new(title: impl Into<String>, author: impl Into<String>, year: i32, copies: u32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            year,
            total_copies: copies,
            available_copies: copies,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: BookId) -> Self {
        self.id = id;
        self
    }

    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = synopsis.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.add_category(category);
        self
    }

    /// Appends a category unless it is already present.
    pub fn add_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
    }

    /// Drops repeated categories, keeping first occurrences in order.
    pub(crate) fn dedup_categories(&mut self) {
        let mut seen = HashSet::new();
        self.categories.retain(|c| seen.insert(c.clone()));
    }

    pub fn remove_category(&mut self, category: &str) {
        self.categories.retain(|c| c != category);
    }

    /// Plain substring match over the descriptive fields. Case-sensitive, like
    /// the simple search box it backs.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        if keyword.is_empty() {
            return false;
        }
        self.title.contains(keyword)
            || self.author.contains(keyword)
            || self.synopsis.contains(keyword)
            || self.categories.iter().any(|c| c.contains(keyword))
            || self.publisher.contains(keyword)
            || self.isbn.contains(keyword)
    }

    pub fn matches_year(&self, year: i32, op: CompareOp) -> bool {
        match op {
            CompareOp::Eq => self.year == year,
            CompareOp::Gt => self.year > year,
            CompareOp::Lt => self.year < year,
            CompareOp::Ge => self.year >= year,
            CompareOp::Le => self.year <= year,
            CompareOp::Contains => false,
        }
    }

    /// Exact category membership.
    pub fn matches_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub(crate) fn copies_are_consistent(&self) -> bool {
        self.available_copies <= self.total_copies
    }
}

/// One borrow event. `returned_at` stays empty while the book is out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub username: String,
    #[serde(rename = "bookId")]
    pub book_id: BookId,
    #[serde(rename = "borrowDate")]
    pub borrowed_at: i64,
    #[serde(rename = "dueDate", default)]
    pub due_at: i64,
    #[serde(rename = "returnDate", default, skip_serializing_if = "Option::is_none")]
    pub returned_at: Option<i64>,
}

impl Loan {
    pub fn new(username: impl Into<String>, book_id: BookId, borrowed_at: i64) -> Self {
        Self {
            username: username.into(),
            book_id,
            borrowed_at,
            due_at: borrowed_at,
            returned_at: None,
        }
    }

    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }
}
