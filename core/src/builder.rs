//! Text accumulator with SQL-aware helpers.
//!
//! [`QueryBuilder`] performs no validation of SQL correctness; it only
//! concatenates, quotes identifiers with backticks and joins lists. Every
//! statement in [`statement`](crate::statement) writes itself into one.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::OnceLock;

use regex::Regex;

use crate::value::SqlType;

/// Mutable SQL text buffer.
///
/// # Examples
///
/// ```
/// use sqlweave_core::QueryBuilder;
///
/// let mut qb = QueryBuilder::new();
/// qb.append("SELECT")
///     .append_space()
///     .append_quoted_list(["name", "salary"])
///     .append_space_separated("FROM")
///     .append_quoted("IndexModel");
/// assert_eq!(qb.query(), "SELECT `name`, `salary` FROM `IndexModel`");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    query: String,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder with existing text.
    pub fn with(initial: impl Display) -> Self {
        Self {
            query: initial.to_string(),
        }
    }

    pub fn append(&mut self, value: impl Display) -> &mut Self {
        self.query.push_str(&value.to_string());
        self
    }

    pub fn append_space(&mut self) -> &mut Self {
        self.query.push(' ');
        self
    }

    /// Appends `token` surrounded by single spaces.
    pub fn append_space_separated(&mut self, token: impl Display) -> &mut Self {
        self.query.push(' ');
        self.query.push_str(&token.to_string());
        self.query.push(' ');
        self
    }

    /// Appends an identifier wrapped in backticks (`*` is left alone).
    pub fn append_quoted(&mut self, name: &str) -> &mut Self {
        self.query.push_str(&quote(name));
        self
    }

    /// Appends `value` only when present.
    pub fn append_optional<T: Display>(&mut self, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.append(value);
        }
        self
    }

    /// Appends `name value` only when the value is present.
    pub fn append_qualifier<T: Display>(&mut self, name: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.append(name).append_space().append(value);
        }
        self
    }

    pub fn append_sql_type(&mut self, sql_type: SqlType) -> &mut Self {
        self.append(sql_type.as_sql())
    }

    /// Joins the items with `, `.
    pub fn append_list<I, T>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let joined = items
            .into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.query.push_str(&joined);
        self
    }

    /// Joins the items with `, `, quoting each one.
    pub fn append_quoted_list<I, T>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.append_list(items.into_iter().map(|item| quote(item.as_ref())))
    }

    /// Joins a slice with `, `.
    pub fn append_array<T: Display>(&mut self, items: &[T]) -> &mut Self {
        self.append_list(items)
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn into_query(self) -> String {
        self.query
    }
}

impl Display for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.query)
    }
}

/// Wraps an identifier in backticks unless it is `*` or already quoted.
///
/// Backticks inside the name are doubled, so the identifier survives intact.
pub fn quote(name: &str) -> String {
    if name == "*" || is_quoted(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

pub fn is_quoted(name: &str) -> bool {
    name.len() >= 2 && name.starts_with('`') && name.ends_with('`')
}

/// Removes surrounding backticks, if any, and undoes inner doubling.
pub fn strip_quotes(name: &str) -> Cow<'_, str> {
    if !is_quoted(name) {
        return Cow::Borrowed(name);
    }
    let inner = &name[1..name.len() - 1];
    if inner.contains("``") {
        Cow::Owned(inner.replace("``", "`"))
    } else {
        Cow::Borrowed(inner)
    }
}

/// Extracts every backticked identifier from emitted SQL, unquoted, in order.
///
/// ```
/// use sqlweave_core::builder::quoted_identifiers;
///
/// let names = quoted_identifiers("`name`='a' AND `T`.`salary`>1");
/// assert_eq!(names, ["name", "T", "salary"]);
/// ```
pub fn quoted_identifiers(sql: &str) -> Vec<String> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let re = IDENT.get_or_init(|| Regex::new(r"`((?:[^`]|``)+)`").expect("identifier regex is valid"));
    // Ignore backticks inside string literals.
    let outside_strings = strip_string_literals(sql);
    re.captures_iter(&outside_strings)
        .map(|c| c[1].replace("``", "`"))
        .collect()
}

fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    for ch in sql.chars() {
        if ch == '\'' {
            in_string = !in_string;
            out.push(ch);
        } else if !in_string {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_skips_star_and_quoted() {
        assert_eq!(quote("*"), "*");
        assert_eq!(quote("`name`"), "`name`");
        assert_eq!(quote("name"), "`name`");
    }

    #[test]
    fn test_quote_doubles_inner_backticks() {
        let quoted = quote("a`b");
        assert_eq!(quoted, "`a``b`");
        assert!(is_quoted(&quoted));
        assert_eq!(strip_quotes(&quoted), "a`b");
        assert_eq!(quoted_identifiers(&format!("{quoted}=1 AND `c`=2")), ["a`b", "c"]);
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("`salary`"), "salary");
        assert_eq!(strip_quotes("salary"), "salary");
        assert_eq!(strip_quotes("`"), "`");
    }

    #[test]
    fn test_space_separated_and_optional() {
        let mut qb = QueryBuilder::with("DELETE");
        qb.append_space_separated("FROM")
            .append_quoted("t")
            .append_optional(None::<&str>)
            .append_optional(Some(";"));
        assert_eq!(qb.query(), "DELETE FROM `t`;");
    }

    #[test]
    fn test_qualifier() {
        let mut qb = QueryBuilder::new();
        qb.append_qualifier("LIMIT", Some(10))
            .append_qualifier("OFFSET", None::<u64>);
        assert_eq!(qb.query(), "LIMIT 10");
    }

    #[test]
    fn test_lists() {
        let mut qb = QueryBuilder::new();
        qb.append_array(&[1, 2, 3]);
        assert_eq!(qb.query(), "1, 2, 3");

        let mut qb = QueryBuilder::new();
        qb.append_quoted_list(Vec::<String>::new());
        assert!(qb.is_empty());
    }

    #[test]
    fn test_sql_type() {
        let mut qb = QueryBuilder::new();
        qb.append_quoted("id").append_space().append_sql_type(SqlType::Integer);
        assert_eq!(qb.into_query(), "`id` INTEGER");
    }

    #[test]
    fn test_identifiers_ignore_string_literals() {
        let names = quoted_identifiers("`a`='`not`' OR `b`=2");
        assert_eq!(names, ["a", "b"]);
    }
}
