//! Typed `column OP value` conditions.
//!
//! A [`Condition`] is built fluently from [`column`] and keeps its value in
//! an [`Operand`]. Nothing is converted or escaped until the condition is
//! written into a query, at which point typed values go through the
//! [`ConverterRegistry`](crate::ConverterRegistry), numbers are emitted
//! unquoted and everything else is escaped. The placeholder `?` is always
//! emitted verbatim.
//!
//! ```
//! use sqlweave_core::{Query, column};
//!
//! let cond = column("name").is("test");
//! assert_eq!(cond.query().unwrap(), "`name`='test'");
//!
//! let cond = column("salary").greater_than(20000);
//! assert_eq!(cond.query().unwrap(), "`salary`>20000");
//! ```

use chrono::{DateTime, NaiveDate, Utc};

use crate::builder::{QueryBuilder, quote};
use crate::converter::TypedValue;
use crate::error::Result;
use crate::query::{Query, SqlContext};
use crate::value::{Collate, SqlValue};

/// A possibly table-qualified, possibly aliased identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAlias {
    name: String,
    table: Option<String>,
    alias: Option<String>,
    quoted: bool,
}

impl NameAlias {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            alias: None,
            quoted: true,
        }
    }

    /// An identifier emitted exactly as given (e.g. `NEW.name`, `*`).
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            quoted: false,
            ..Self::new(name)
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The qualified name without alias, e.g. `` `T`.`name` ``.
    pub fn full_name(&self) -> String {
        let name = if self.quoted {
            quote(&self.name)
        } else {
            self.name.clone()
        };
        match &self.table {
            Some(table) if self.quoted => format!("{}.{}", quote(table), name),
            Some(table) => format!("{table}.{name}"),
            None => name,
        }
    }

    /// The qualified name followed by `AS alias` when an alias is set.
    pub fn definition(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.full_name(), quote(alias)),
            None => self.full_name(),
        }
    }
}

impl From<&str> for NameAlias {
    fn from(name: &str) -> Self {
        if name == "*" {
            NameAlias::raw(name)
        } else {
            NameAlias::new(name)
        }
    }
}

impl From<String> for NameAlias {
    fn from(name: String) -> Self {
        NameAlias::from(name.as_str())
    }
}

/// The right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A stored value, escaped on emission.
    Value(SqlValue),
    /// A Rust value converted through the converter registry on emission.
    Typed(TypedValue),
    /// SQL emitted verbatim, such as another column or `NEW.col`.
    Raw(String),
    /// The `?` placeholder.
    Param,
}

impl Operand {
    /// Wraps any value for converter lookup at emission time.
    pub fn typed<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Operand::Typed(TypedValue::new(value))
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Operand::Raw(sql.into())
    }

    /// Whether this operand emits `?`.
    pub fn is_param(&self) -> bool {
        match self {
            Operand::Param => true,
            Operand::Value(SqlValue::Text(s)) => s == "?",
            _ => false,
        }
    }

    pub(crate) fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        if self.is_param() {
            qb.append("?");
            return Ok(());
        }
        match self {
            Operand::Value(v) => write_value(qb, v, cx),
            Operand::Typed(t) => {
                let v = cx.converters().convert(t)?;
                write_value(qb, &v, cx);
            }
            Operand::Raw(sql) => {
                qb.append(sql);
            }
            Operand::Param => {
                qb.append("?");
            }
        }
        Ok(())
    }
}

fn write_value(qb: &mut QueryBuilder, value: &SqlValue, cx: &SqlContext<'_>) {
    if cx.is_raw() {
        qb.append(value.raw_literal());
    } else {
        qb.append(value.literal());
    }
}

/// Shorthand for [`Operand::Param`].
pub fn param() -> Operand {
    Operand::Param
}

macro_rules! value_operands {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Value(SqlValue::from(v))
                }
            }
        )*
    };
}

value_operands!(i8, i16, i32, i64, u8, u16, u32, f32, f64, Vec<u8>);

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        if v == "?" {
            Operand::Param
        } else {
            Operand::Value(SqlValue::from(v))
        }
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::from(v.as_str())
    }
}

impl From<SqlValue> for Operand {
    fn from(v: SqlValue) -> Self {
        Operand::Value(v)
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::typed(v)
    }
}

impl From<DateTime<Utc>> for Operand {
    fn from(v: DateTime<Utc>) -> Self {
        Operand::typed(v)
    }
}

impl From<NaiveDate> for Operand {
    fn from(v: NaiveDate) -> Self {
        Operand::typed(v)
    }
}

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        v.map_or(Operand::Value(SqlValue::Null), Into::into)
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Like,
    NotLike,
    Glob,
    Is,
    IsNot,
    /// Emitted verbatim between column and value.
    Custom(String),
}

impl Operator {
    pub fn token(&self) -> &str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Like => " LIKE ",
            Operator::NotLike => " NOT LIKE ",
            Operator::Glob => " GLOB ",
            Operator::Is => " IS ",
            Operator::IsNot => " IS NOT ",
            Operator::Custom(op) => op,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Binary { op: Operator, value: Operand },
    IsNull,
    IsNotNull,
    Between { low: Operand, high: Operand },
    In { negated: bool, values: Vec<Operand> },
}

/// A single condition on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: NameAlias,
    predicate: Predicate,
    collate: Option<Collate>,
}

/// Starts a condition on `name`.
pub fn column(name: impl Into<NameAlias>) -> ColumnRef {
    ColumnRef(name.into())
}

/// A column waiting for its operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef(NameAlias);

impl ColumnRef {
    pub fn with_table(self, table: impl Into<String>) -> Self {
        ColumnRef(self.0.with_table(table))
    }

    pub fn name(&self) -> &NameAlias {
        &self.0
    }

    fn binary(self, op: Operator, value: impl Into<Operand>) -> Condition {
        Condition {
            column: self.0,
            predicate: Predicate::Binary {
                op,
                value: value.into(),
            },
            collate: None,
        }
    }

    pub fn is(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Eq, value)
    }

    pub fn eq(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Eq, value)
    }

    pub fn is_not(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::NotEq, value)
    }

    pub fn not_eq(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::NotEq, value)
    }

    pub fn greater_than(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Gt, value)
    }

    pub fn greater_than_or_eq(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::GtEq, value)
    }

    pub fn less_than(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Lt, value)
    }

    pub fn less_than_or_eq(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::LtEq, value)
    }

    pub fn like(self, pattern: impl Into<Operand>) -> Condition {
        self.binary(Operator::Like, pattern)
    }

    pub fn not_like(self, pattern: impl Into<Operand>) -> Condition {
        self.binary(Operator::NotLike, pattern)
    }

    pub fn glob(self, pattern: impl Into<Operand>) -> Condition {
        self.binary(Operator::Glob, pattern)
    }

    /// SQL `IS`, which also matches `NULL` against `NULL`.
    pub fn is_exactly(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Is, value)
    }

    pub fn is_not_exactly(self, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::IsNot, value)
    }

    /// A custom operator such as `" MATCH "` or `"&"`.
    pub fn operation(self, op: impl Into<String>, value: impl Into<Operand>) -> Condition {
        self.binary(Operator::Custom(op.into()), value)
    }

    /// `column=?`.
    pub fn param(self) -> Condition {
        self.binary(Operator::Eq, Operand::Param)
    }

    pub fn is_null(self) -> Condition {
        Condition {
            column: self.0,
            predicate: Predicate::IsNull,
            collate: None,
        }
    }

    pub fn is_not_null(self) -> Condition {
        Condition {
            column: self.0,
            predicate: Predicate::IsNotNull,
            collate: None,
        }
    }

    pub fn between(self, low: impl Into<Operand>, high: impl Into<Operand>) -> Condition {
        Condition {
            column: self.0,
            predicate: Predicate::Between {
                low: low.into(),
                high: high.into(),
            },
            collate: None,
        }
    }

    pub fn in_list<I, V>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.membership(false, values)
    }

    pub fn not_in<I, V>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.membership(true, values)
    }

    fn membership<I, V>(self, negated: bool, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Condition {
            column: self.0,
            predicate: Predicate::In {
                negated,
                values: values.into_iter().map(Into::into).collect(),
            },
            collate: None,
        }
    }
}

impl Condition {
    /// Appends `COLLATE x` after the value.
    pub fn collate(mut self, collate: Collate) -> Self {
        self.collate = Some(collate);
        self
    }

    pub fn column(&self) -> &NameAlias {
        &self.column
    }

    /// The operator token, or the keyword for null / range / membership tests.
    pub fn operator(&self) -> &str {
        match &self.predicate {
            Predicate::Binary { op, .. } => op.token(),
            Predicate::IsNull => " IS NULL",
            Predicate::IsNotNull => " IS NOT NULL",
            Predicate::Between { .. } => " BETWEEN ",
            Predicate::In { negated: false, .. } => " IN ",
            Predicate::In { negated: true, .. } => " NOT IN ",
        }
    }

    pub(crate) fn operands(&self) -> Vec<&Operand> {
        match &self.predicate {
            Predicate::Binary { value, .. } => vec![value],
            Predicate::IsNull | Predicate::IsNotNull => Vec::new(),
            Predicate::Between { low, high } => vec![low, high],
            Predicate::In { values, .. } => values.iter().collect(),
        }
    }

    fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.predicate {
            Predicate::Binary { value, .. } => vec![value],
            Predicate::IsNull | Predicate::IsNotNull => Vec::new(),
            Predicate::Between { low, high } => vec![low, high],
            Predicate::In { values, .. } => values.iter_mut().collect(),
        }
    }

    /// Whether every operand is a placeholder (vacuously true for null tests).
    pub fn is_all_params(&self) -> bool {
        self.operands().iter().all(|o| o.is_param())
    }

    /// Replaces placeholders in order from `values`, returning how many were used.
    pub(crate) fn bind_params(&mut self, values: &mut impl Iterator<Item = Operand>) -> usize {
        let mut used = 0;
        for operand in self.operands_mut() {
            if operand.is_param() {
                if let Some(value) = values.next() {
                    *operand = value;
                    used += 1;
                }
            }
        }
        used
    }
}

impl Query for Condition {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        qb.append(self.column.full_name()).append(self.operator());
        match &self.predicate {
            Predicate::Binary { value, .. } => value.write(qb, cx)?,
            Predicate::IsNull | Predicate::IsNotNull => {}
            Predicate::Between { low, high } => {
                low.write(qb, cx)?;
                qb.append(" AND ");
                high.write(qb, cx)?;
            }
            Predicate::In { values, .. } => {
                qb.append("(");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.append(", ");
                    }
                    value.write(qb, cx)?;
                }
                qb.append(")");
            }
        }
        if let Some(collate) = self.collate {
            qb.append(" COLLATE ").append(collate.as_sql());
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        self.operands().iter().filter(|o| o.is_param()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConverterRegistry;
    use crate::SqlError;
    use chrono::TimeZone;

    #[test]
    fn test_is_string_escapes() {
        let cond = column("name").is("O'Neil");
        assert_eq!(cond.query().unwrap(), "`name`='O''Neil'");
        assert_eq!(cond.raw_query().unwrap(), "`name`='O'Neil'");
    }

    #[test]
    fn test_numbers_unquoted() {
        assert_eq!(column("a").is(5).query().unwrap(), "`a`=5");
        assert_eq!(column("a").less_than(2.5).query().unwrap(), "`a`<2.5");
        assert_eq!(column("a").is_not(1).query().unwrap(), "`a`!=1");
    }

    #[test]
    fn test_emitted_value_parses_back() {
        let samples: Vec<SqlValue> = vec![
            SqlValue::Integer(-77),
            SqlValue::Real(1234.5),
            SqlValue::Text("it's \"quoted\"".into()),
        ];
        for value in samples {
            let cond = column("c").is(value.clone());
            let sql = cond.query().unwrap();
            let literal = sql.strip_prefix("`c`=").unwrap();
            assert_eq!(SqlValue::parse_literal(literal).unwrap(), value);
        }
    }

    #[test]
    fn test_placeholder_never_escaped() {
        assert_eq!(column("a").is("?").query().unwrap(), "`a`=?");
        assert_eq!(column("a").param().query().unwrap(), "`a`=?");
        assert_eq!(column("a").param().param_count(), 1);
    }

    #[test]
    fn test_typed_value_uses_converter() {
        assert_eq!(column("active").is(true).query().unwrap(), "`active`=1");
        let when = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            column("at").greater_than(when).query().unwrap(),
            format!("`at`>{}", when.timestamp_millis())
        );
    }

    #[test]
    fn test_typed_value_without_converter_fails() {
        let cond = column("active").is(true);
        let err = cond.query_with(&ConverterRegistry::empty()).unwrap_err();
        assert!(matches!(err, SqlError::MissingConverter(_)));
    }

    #[test]
    fn test_like_and_custom() {
        assert_eq!(column("n").like("a%").query().unwrap(), "`n` LIKE 'a%'");
        assert_eq!(
            column("flags").operation("&", 4).query().unwrap(),
            "`flags`&4"
        );
        assert_eq!(
            column("n").is_exactly(SqlValue::Null).query().unwrap(),
            "`n` IS NULL"
        );
    }

    #[test]
    fn test_null_between_in() {
        assert_eq!(column("n").is_null().query().unwrap(), "`n` IS NULL");
        assert_eq!(
            column("n").between(1, 10).query().unwrap(),
            "`n` BETWEEN 1 AND 10"
        );
        assert_eq!(
            column("n").in_list(["a", "b"]).query().unwrap(),
            "`n` IN ('a', 'b')"
        );
        assert_eq!(
            column("n").not_in([1, 2]).query().unwrap(),
            "`n` NOT IN (1, 2)"
        );
    }

    #[test]
    fn test_qualified_column_and_collate() {
        let cond = column("name")
            .with_table("T")
            .is("x")
            .collate(Collate::NoCase);
        assert_eq!(cond.query().unwrap(), "`T`.`name`='x' COLLATE NOCASE");
    }

    #[test]
    fn test_raw_operand() {
        let cond = column("name").is(Operand::raw("NEW.`name`"));
        assert_eq!(cond.query().unwrap(), "`name`=NEW.`name`");
    }

    #[test]
    fn test_name_alias_definition() {
        let alias = NameAlias::new("salary").with_table("e").as_alias("pay");
        assert_eq!(alias.definition(), "`e`.`salary` AS `pay`");
        assert_eq!(NameAlias::from("*").full_name(), "*");
    }
}
