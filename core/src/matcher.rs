//! Field predicates for `field op value` query clauses.

use crate::query::CompareOp;
use crate::Book;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Author,
    Year,
    Isbn,
    Publisher,
    Language,
    PageCount,
    Category,
    Synopsis,
    TotalCopies,
    AvailableCopies,
}

lazy_static! {
    // Keys are lower-case; lookups lower-case the query side.
    static ref FIELD_ALIASES: HashMap<&'static str, Field> = {
        let aliases: &[(&str, Field)] = &[
            ("title", Field::Title), ("標題", Field::Title),
            ("author", Field::Author), ("作者", Field::Author),
            ("year", Field::Year), ("年份", Field::Year),
            ("isbn", Field::Isbn),
            ("publisher", Field::Publisher), ("出版社", Field::Publisher),
            ("language", Field::Language), ("語言", Field::Language),
            ("pagecount", Field::PageCount), ("頁數", Field::PageCount),
            ("category", Field::Category), ("類別", Field::Category), ("標籤", Field::Category),
            ("synopsis", Field::Synopsis), ("簡介", Field::Synopsis), ("概要", Field::Synopsis),
            ("copies", Field::TotalCopies), ("totalcopies", Field::TotalCopies), ("總數量", Field::TotalCopies),
            ("availablecopies", Field::AvailableCopies), ("可用數量", Field::AvailableCopies),
        ];
        aliases.iter().copied().collect()
    };
}

impl Field {
    /// Case-insensitive alias lookup.
    pub fn resolve(name: &str) -> Option<Field> {
        FIELD_ALIASES.get(name.to_lowercase().as_str()).copied()
    }
}

/// Compares `text` against `value`. `Contains` is a substring test, the
/// ordering operators compare lexicographically.
pub fn match_str(text: &str, op: CompareOp, value: &str, ignore_case: bool) -> bool {
    let (text, value) = if ignore_case {
        (text.to_lowercase(), value.to_lowercase())
    } else {
        (text.to_string(), value.to_string())
    };
    match op {
        CompareOp::Eq => text == value,
        CompareOp::Contains => text.contains(&value),
        CompareOp::Gt => text > value,
        CompareOp::Lt => text < value,
        CompareOp::Ge => text >= value,
        CompareOp::Le => text <= value,
    }
}

/// Numeric comparison. A value that is not an integer never matches, and
/// neither does `Contains`.
pub fn match_number(number: i64, op: CompareOp, value: &str) -> bool {
    let Ok(wanted) = value.trim().parse::<i64>() else {
        return false;
    };
    match op {
        CompareOp::Eq => number == wanted,
        CompareOp::Gt => number > wanted,
        CompareOp::Lt => number < wanted,
        CompareOp::Ge => number >= wanted,
        CompareOp::Le => number <= wanted,
        CompareOp::Contains => false,
    }
}

/// Evaluates one field predicate against one book. Unknown fields match
/// nothing.
pub fn book_matches(book: &Book, field: &str, op: CompareOp, value: &str) -> bool {
    let Some(field) = Field::resolve(field) else {
        return false;
    };
    match field {
        Field::Title => match_str(&book.title, op, value, true),
        Field::Author => match_str(&book.author, op, value, true),
        Field::Isbn => match_str(&book.isbn, op, value, true),
        Field::Publisher => match_str(&book.publisher, op, value, true),
        Field::Language => match_str(&book.language, op, value, true),
        Field::Synopsis => match_str(&book.synopsis, op, value, true),
        // Category names are compared exactly as stored.
        Field::Category => book.categories.iter().any(|c| match_str(c, op, value, false)),
        Field::Year => match_number(i64::from(book.year), op, value),
        Field::PageCount => match_number(i64::from(book.page_count), op, value),
        Field::TotalCopies => match_number(i64::from(book.total_copies), op, value),
        Field::AvailableCopies => match_number(i64::from(book.available_copies), op, value),
    }
}
