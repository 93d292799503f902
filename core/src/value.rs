//! SQL values, storage types, and the small enums shared by DDL and DML.
//!
//! [`SqlValue`] is the stored representation of a value. It knows how to
//! render itself as a SQL literal (numbers unquoted, text escaped and single
//! quoted) and how to parse such a literal back, which keeps the emitted
//! condition text reversible for integers, reals and text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqlError};

/// A value in its stored SQLite representation.
///
/// # Examples
///
/// ```
/// use sqlweave_core::SqlValue;
///
/// assert_eq!(SqlValue::from(42).literal(), "42");
/// assert_eq!(SqlValue::from("it's").literal(), "'it''s'");
/// assert_eq!(SqlValue::parse_literal("'it''s'").unwrap(), SqlValue::from("it's"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum SqlValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Returns `true` for integer and real values.
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlValue::Integer(_) | SqlValue::Real(_))
    }

    /// Returns the integer payload, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the real payload, widening integers.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            SqlValue::Real(r) => Some(*r),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the text payload, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The storage type of this value, or `None` for null.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(_) => Some(SqlType::Integer),
            SqlValue::Real(_) => Some(SqlType::Real),
            SqlValue::Text(_) => Some(SqlType::Text),
            SqlValue::Blob(_) => Some(SqlType::Blob),
        }
    }

    /// Renders the value as an escaped SQL literal.
    pub fn literal(&self) -> String {
        match self {
            SqlValue::Text(s) => escape_string(s),
            other => other.raw_literal(),
        }
    }

    /// Renders the value without escaping text, for debugging output.
    pub fn raw_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(r) => real_literal(*r),
            SqlValue::Text(s) => format!("'{s}'"),
            SqlValue::Blob(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 2 + 3);
                out.push_str("X'");
                for b in bytes {
                    out.push_str(&format!("{b:02X}"));
                }
                out.push('\'');
                out
            }
        }
    }

    /// Parses a literal produced by [`literal`](Self::literal) back into a value.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidLiteral`] for unterminated quotes, bad blob
    /// hex, or bare words that are not numbers.
    pub fn parse_literal(literal: &str) -> Result<SqlValue> {
        let s = literal.trim();
        if s.eq_ignore_ascii_case("NULL") {
            return Ok(SqlValue::Null);
        }
        if let Some(hex) = s
            .strip_prefix("X'")
            .or_else(|| s.strip_prefix("x'"))
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return parse_blob(hex).ok_or_else(|| SqlError::InvalidLiteral(s.to_string()));
        }
        if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
            let inner = &s[1..s.len() - 1];
            return Ok(SqlValue::Text(inner.replace("''", "'")));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(SqlValue::Integer(i));
        }
        if let Ok(r) = s.parse::<f64>() {
            return Ok(SqlValue::Real(r));
        }
        Err(SqlError::InvalidLiteral(s.to_string()))
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal())
    }
}

/// Quotes a string for SQL, doubling embedded single quotes.
pub fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn real_literal(r: f64) -> String {
    if r.is_nan() {
        "NULL".to_string()
    } else if r.is_infinite() {
        let lit = if r > 0.0 { "9e999" } else { "-9e999" };
        lit.to_string()
    } else {
        // Debug keeps a trailing `.0` so the literal parses back as a real.
        format!("{r:?}")
    }
}

fn parse_blob(hex: &str) -> Option<SqlValue> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(SqlValue::Blob(bytes))
}

macro_rules! integer_values {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::Integer(i64::from(v))
                }
            }
        )*
    };
}

integer_values!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Real(f64::from(v))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// SQLite storage classes used in column declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    /// The keyword used in DDL.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }

    /// Looks up the storage type for a Rust type name.
    ///
    /// `Option<..>` wrappers are ignored. Unknown names return `None`.
    ///
    /// ```
    /// use sqlweave_core::SqlType;
    ///
    /// assert_eq!(SqlType::for_type_name("i64"), Some(SqlType::Integer));
    /// assert_eq!(SqlType::for_type_name("Option<String>"), Some(SqlType::Text));
    /// assert_eq!(SqlType::for_type_name("HashMap<u8, u8>"), None);
    /// ```
    pub fn for_type_name(name: &str) -> Option<SqlType> {
        let name = name.trim();
        if let Some(inner) = name
            .strip_prefix("Option<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return SqlType::for_type_name(inner);
        }
        let name = name.rsplit("::").next().unwrap_or(name);
        match name {
            "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize"
            | "bool" | "DateTime<Utc>" => Some(SqlType::Integer),
            "f32" | "f64" => Some(SqlType::Real),
            "String" | "&str" | "str" | "char" | "NaiveDate" => Some(SqlType::Text),
            "Vec<u8>" | "&[u8]" => Some(SqlType::Blob),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Conflict resolution policy for constraints, INSERT and UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictAction {
    Rollback,
    Abort,
    Replace,
    Fail,
    Ignore,
}

impl ConflictAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConflictAction::Rollback => "ROLLBACK",
            ConflictAction::Abort => "ABORT",
            ConflictAction::Replace => "REPLACE",
            ConflictAction::Fail => "FAIL",
            ConflictAction::Ignore => "IGNORE",
        }
    }
}

/// Collating sequences accepted in column definitions and conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collate {
    Binary,
    NoCase,
    RTrim,
    Localized,
    Unicode,
}

impl Collate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Collate::Binary => "BINARY",
            Collate::NoCase => "NOCASE",
            Collate::RTrim => "RTRIM",
            Collate::Localized => "LOCALIZED",
            Collate::Unicode => "UNICODE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_literal_round_trip() {
        for i in [0_i64, -1, 42, i64::MAX, i64::MIN] {
            let lit = SqlValue::Integer(i).literal();
            assert_eq!(SqlValue::parse_literal(&lit).unwrap(), SqlValue::Integer(i));
        }
    }

    #[test]
    fn test_real_literal_round_trip() {
        for r in [0.0_f64, 0.1, -2.5, 30000.0, 1e300, f64::MIN_POSITIVE] {
            let lit = SqlValue::Real(r).literal();
            assert_eq!(SqlValue::parse_literal(&lit).unwrap(), SqlValue::Real(r), "{lit}");
        }
    }

    #[test]
    fn test_text_literal_escapes_quotes() {
        let v = SqlValue::from("O'Brien's");
        assert_eq!(v.literal(), "'O''Brien''s'");
        assert_eq!(v.raw_literal(), "'O'Brien's'");
        assert_eq!(SqlValue::parse_literal(&v.literal()).unwrap(), v);
    }

    #[test]
    fn test_blob_literal() {
        let v = SqlValue::Blob(vec![0x00, 0xAB, 0x10]);
        assert_eq!(v.literal(), "X'00AB10'");
        assert_eq!(SqlValue::parse_literal("X'00AB10'").unwrap(), v);
        assert!(SqlValue::parse_literal("X'0'").is_err());
    }

    #[test]
    fn test_null_and_nan() {
        assert_eq!(SqlValue::Null.literal(), "NULL");
        assert_eq!(SqlValue::Real(f64::NAN).literal(), "NULL");
        assert_eq!(SqlValue::parse_literal("null").unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_parse_bare_word_fails() {
        assert!(matches!(
            SqlValue::parse_literal("DROP"),
            Err(SqlError::InvalidLiteral(_))
        ));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("a")), SqlValue::Text("a".into()));
    }

    #[test]
    fn test_type_name_lookup() {
        assert_eq!(SqlType::for_type_name("u32"), Some(SqlType::Integer));
        assert_eq!(SqlType::for_type_name("f32"), Some(SqlType::Real));
        assert_eq!(SqlType::for_type_name("Vec<u8>"), Some(SqlType::Blob));
        assert_eq!(
            SqlType::for_type_name("chrono::DateTime<Utc>"),
            Some(SqlType::Integer)
        );
        assert_eq!(SqlType::for_type_name("Widget"), None);
    }
}
