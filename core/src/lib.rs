//! Library catalog search and recommendation core.
//!
//! The catalog is queried through two inverted indexes (full text and title
//! only) plus a small boolean query language, and a hybrid recommender blends
//! collaborative filtering over loan history with TF-IDF content similarity.

pub mod book;
pub mod eval;
pub mod index;
pub mod library;
pub mod matcher;
pub mod persist;
pub mod query;
pub mod recommend;
pub mod snippet;
pub mod tokenizer;

pub type BookId = u32;

pub use book::{Book, Loan};
pub use index::{CatalogIndex, InvertedIndex};
pub use library::{Library, LibraryError};
pub use query::{parse, CompareOp, Node, QueryError};
pub use recommend::{Recommendation, Recommender};
