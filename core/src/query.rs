//! Query language parser.
//!
//! ```text
//! Expression := Term (OR Term)*
//! Term       := Factor (AND Factor)*
//! Factor     := [NOT] Atom
//! Atom       := '(' Expression ')' | FieldQuery | TERM
//! FieldQuery := Identifier FieldOp Value
//! FieldOp    := '>=' | '<=' | '=' | '~' | '>' | '<'
//! ```
//!
//! Keywords are case-insensitive and only count when followed by whitespace
//! or the end of input. Input left over after a complete expression is
//! ignored, matching the behaviour users of the query box already rely on.

use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unterminated string literal starting at byte {at}")]
    UnterminatedQuote { at: usize },
    #[error("missing closing parenthesis at byte {at}")]
    MissingClosingParen { at: usize },
    #[error("expected a search term at byte {at}")]
    ExpectedIdentifier { at: usize },
    #[error("expected a value after the field operator at byte {at}")]
    ExpectedFieldValue { at: usize },
    #[error("expected a field operator at byte {at}")]
    ExpectedOperator { at: usize },
}

/// Field comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Contains,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Contains => "~",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(CompareOp::Eq),
            "~" => Ok(CompareOp::Contains),
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            _ => Err(QueryError::ExpectedOperator { at: 0 }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Term(String),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Field { field: String, op: CompareOp, value: String },
}

impl Node {
    pub fn term(t: impl Into<String>) -> Self { Node::Term(t.into()) }

    pub fn and(left: Node, right: Node) -> Self { Node::And(Box::new(left), Box::new(right)) }

    pub fn or(left: Node, right: Node) -> Self { Node::Or(Box::new(left), Box::new(right)) }

    pub fn not(child: Node) -> Self { Node::Not(Box::new(child)) }

    pub fn field(field: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Node::Field { field: field.into(), op, value: value.into() }
    }
}

/// Renders back into query syntax with explicit grouping, so the output
/// parses to the same tree.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Term(t) => write!(f, "\"{}\"", t),
            Node::And(l, r) => write!(f, "({} AND {})", l, r),
            Node::Or(l, r) => write!(f, "({} OR {})", l, r),
            Node::Not(c) => write!(f, "NOT ({})", c),
            Node::Field { field, op, value } => write!(f, "\"{}\"{}\"{}\"", field, op, value),
        }
    }
}

pub fn parse(query: &str) -> Result<Node, QueryError> {
    Parser::new(query).parse()
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, bytes: input.as_bytes(), pos: 0 }
    }

    fn parse(mut self) -> Result<Node, QueryError> {
        let node = self.expression()?;
        self.skip_whitespace();
        if self.pos < self.bytes.len() {
            tracing::warn!(query = self.input, at = self.pos, "ignoring trailing query input");
        }
        Ok(node)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consumes `keyword` if it appears next as a whole word.
    fn keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let end = self.pos + keyword.len();
        if end > self.bytes.len() || !self.bytes[self.pos..end].eq_ignore_ascii_case(keyword.as_bytes()) {
            return false;
        }
        if end < self.bytes.len() && !self.bytes[end].is_ascii_whitespace() {
            return false;
        }
        self.pos = end;
        self.skip_whitespace();
        true
    }

    fn expression(&mut self) -> Result<Node, QueryError> {
        let mut left = self.term()?;
        while self.keyword("OR") {
            let right = self.term()?;
            left = Node::or(left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Node, QueryError> {
        let mut left = self.factor()?;
        while self.keyword("AND") {
            let right = self.factor()?;
            left = Node::and(left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Node, QueryError> {
        if self.keyword("NOT") {
            return Ok(Node::not(self.atom()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Node, QueryError> {
        self.skip_whitespace();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            let node = self.expression()?;
            self.skip_whitespace();
            if self.peek() != Some(b')') {
                return Err(QueryError::MissingClosingParen { at: self.pos });
            }
            self.pos += 1;
            return Ok(node);
        }

        // Tentatively read a field name; without an operator right after it,
        // rewind and read the same span as a plain term.
        let saved = self.pos;
        let field = self.identifier()?;
        if !field.is_empty() {
            self.skip_whitespace();
            if matches!(self.peek(), Some(b'=' | b'~' | b'>' | b'<')) {
                return self.field_query(field);
            }
        }

        self.pos = saved;
        let start = self.pos;
        let term = self.identifier()?;
        if term.is_empty() {
            return Err(QueryError::ExpectedIdentifier { at: start });
        }
        Ok(Node::Term(term))
    }

    fn field_query(&mut self, field: String) -> Result<Node, QueryError> {
        let op = self.operator()?;
        self.skip_whitespace();
        let at = self.pos;
        let value = self.value()?;
        if value.is_empty() {
            return Err(QueryError::ExpectedFieldValue { at });
        }
        Ok(Node::Field { field, op, value })
    }

    fn operator(&mut self) -> Result<CompareOp, QueryError> {
        self.skip_whitespace();
        let op = match (self.peek(), self.bytes.get(self.pos + 1).copied()) {
            (Some(b'>'), Some(b'=')) => CompareOp::Ge,
            (Some(b'<'), Some(b'=')) => CompareOp::Le,
            (Some(b'='), _) => CompareOp::Eq,
            (Some(b'~'), _) => CompareOp::Contains,
            (Some(b'>'), _) => CompareOp::Gt,
            (Some(b'<'), _) => CompareOp::Lt,
            _ => return Err(QueryError::ExpectedOperator { at: self.pos }),
        };
        self.pos += op.symbol().len();
        Ok(op)
    }

    /// Reads a quoted string, returning its contents.
    fn quoted(&mut self) -> Result<String, QueryError> {
        let open = self.pos;
        self.pos += 1;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b != b'"') {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(QueryError::UnterminatedQuote { at: open });
        }
        let text = self.input[start..self.pos].to_string();
        self.pos += 1;
        Ok(text)
    }

    /// Quoted string, or a bare run of alphanumerics, `_`, `-`, `.` and
    /// non-ASCII bytes. Empty when nothing matches.
    fn identifier(&mut self) -> Result<String, QueryError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(String::new()),
            Some(b'"') => self.quoted(),
            Some(_) => {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.') || b >= 0x80)
                {
                    self.pos += 1;
                }
                Ok(self.input[start..self.pos].to_string())
            }
        }
    }

    /// Quoted string, or everything up to whitespace, a parenthesis, `&` or `|`.
    fn value(&mut self) -> Result<String, QueryError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(String::new()),
            Some(b'"') => self.quoted(),
            Some(_) => {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if !b.is_ascii_whitespace() && !matches!(b, b'(' | b')' | b'&' | b'|')) {
                    self.pos += 1;
                }
                Ok(self.input[start..self.pos].to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_binds_tighter_than_or() {
        let node = parse("a OR b AND c").unwrap();
        assert_eq!(node, Node::or(Node::term("a"), Node::and(Node::term("b"), Node::term("c"))));
    }

    #[test]
    fn operators_are_left_associative() {
        let node = parse("a and b AND c").unwrap();
        assert_eq!(node, Node::and(Node::and(Node::term("a"), Node::term("b")), Node::term("c")));
    }

    #[test]
    fn not_applies_to_next_atom_only() {
        let node = parse("NOT a AND b").unwrap();
        assert_eq!(node, Node::and(Node::not(Node::term("a")), Node::term("b")));
        let grouped = parse("not (a OR b)").unwrap();
        assert_eq!(grouped, Node::not(Node::or(Node::term("a"), Node::term("b"))));
    }

    #[test]
    fn bare_field_name_is_a_term() {
        assert_eq!(parse("title").unwrap(), Node::term("title"));
        assert_eq!(parse("title AND x").unwrap(), Node::and(Node::term("title"), Node::term("x")));
    }

    #[test]
    fn field_queries_take_every_operator() {
        for (text, op) in [
            ("year=2020", CompareOp::Eq),
            ("year~2020", CompareOp::Contains),
            ("year>2020", CompareOp::Gt),
            ("year<2020", CompareOp::Lt),
            ("year>=2020", CompareOp::Ge),
            ("year <= 2020", CompareOp::Le),
        ] {
            assert_eq!(parse(text).unwrap(), Node::field("year", op, "2020"), "{text}");
        }
    }

    #[test]
    fn quoted_values_and_non_ascii_fields() {
        assert_eq!(
            parse(r#"author="Ursula K. Le Guin""#).unwrap(),
            Node::field("author", CompareOp::Eq, "Ursula K. Le Guin")
        );
        assert_eq!(parse("年份>=2020").unwrap(), Node::field("年份", CompareOp::Ge, "2020"));
    }

    #[test]
    fn keywords_need_a_word_boundary() {
        assert_eq!(parse("Orwell").unwrap(), Node::term("Orwell"));
        assert_eq!(parse("android").unwrap(), Node::term("android"));
        assert_eq!(parse("a ORb").unwrap(), Node::term("a"));
    }

    #[test]
    fn value_stops_at_group_delimiters() {
        let node = parse("(year>2000)").unwrap();
        assert_eq!(node, Node::field("year", CompareOp::Gt, "2000"));
    }

    #[test]
    fn malformed_queries_fail() {
        assert!(matches!(parse(r#"author=""#), Err(QueryError::UnterminatedQuote { .. })));
        assert!(matches!(parse("(a OR b"), Err(QueryError::MissingClosingParen { .. })));
        assert!(matches!(parse(""), Err(QueryError::ExpectedIdentifier { .. })));
        assert!(matches!(parse("a AND"), Err(QueryError::ExpectedIdentifier { .. })));
        assert!(matches!(parse("year>="), Err(QueryError::ExpectedFieldValue { .. })));
        assert!(matches!(parse(r#""open"#), Err(QueryError::UnterminatedQuote { at: 0 })));
    }

    #[test]
    fn display_round_trips() {
        let node = parse(r#"NOT (a OR "b c") AND author~"Le Guin""#).unwrap();
        assert_eq!(parse(&node.to_string()).unwrap(), node);
    }

    #[test]
    fn compare_op_from_symbol() {
        assert_eq!(">=".parse::<CompareOp>().unwrap(), CompareOp::Ge);
        assert!("=>".parse::<CompareOp>().is_err());
    }
}
