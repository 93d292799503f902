//! Ordered, separator-joined collections of conditions.
//!
//! A [`ConditionGroup`] renders its entries in insertion order, each joined
//! to the previous one by the separator it was added with (`AND` by
//! default). Nested groups are wrapped in parentheses. A group created with
//! `,` as its separator renders a SET list.
//!
//! # Empty-parameter mode
//!
//! A group in empty-parameter mode holds only `?` placeholders. Values are
//! supplied later with [`ConditionGroup::bind`], which replaces placeholders
//! in insertion order and requires exactly one value per placeholder.
//!
//! ```
//! use sqlweave_core::{ConditionGroup, Query, column};
//!
//! # fn main() -> sqlweave_core::Result<()> {
//! let template = ConditionGroup::placeholders()
//!     .and(column("name").param())?
//!     .and(column("salary").param())?;
//! assert_eq!(template.query()?, "`name`=? AND `salary`=?");
//!
//! let bound = template.bind(["bob".into(), 30000.into()])?;
//! assert_eq!(bound.query()?, "`name`='bob' AND `salary`=30000");
//! # Ok(())
//! # }
//! ```

use crate::builder::QueryBuilder;
use crate::condition::{Condition, Operand};
use crate::error::{Result, SqlError};
use crate::query::{Query, SqlContext};

const AND: &str = "AND";
const OR: &str = "OR";

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Condition(Condition),
    Group(ConditionGroup),
}

impl Clause {
    fn has_values(&self) -> bool {
        match self {
            Clause::Condition(c) => !c.is_all_params(),
            Clause::Group(g) => g.has_values(),
        }
    }

    fn param_count(&self) -> usize {
        match self {
            Clause::Condition(c) => c.param_count(),
            Clause::Group(g) => g.param_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    separator: String,
    clause: Clause,
}

/// An ordered list of conditions and nested groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    entries: Vec<Entry>,
    separator: String,
    empty_params: bool,
}

impl Default for ConditionGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionGroup {
    /// An empty group joined by `AND`.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            separator: AND.to_string(),
            empty_params: false,
        }
    }

    /// An empty group whose [`push`](Self::push) separator is `separator`.
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            ..Self::new()
        }
    }

    /// A comma-separated group, as used by `SET` clauses.
    pub fn comma() -> Self {
        Self::with_separator(",")
    }

    /// An empty group in empty-parameter mode.
    pub fn placeholders() -> Self {
        Self {
            empty_params: true,
            ..Self::new()
        }
    }

    /// Switches empty-parameter mode on or off.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::PlaceholderConflict`] when turning the mode on for
    /// a group that already holds real values.
    pub fn set_empty_params(mut self, enabled: bool) -> Result<Self> {
        if enabled && self.has_values() {
            return Err(SqlError::PlaceholderConflict);
        }
        self.empty_params = enabled;
        Ok(self)
    }

    pub fn is_empty_params(&self) -> bool {
        self.empty_params
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn and(self, condition: Condition) -> Result<Self> {
        self.add(AND, Clause::Condition(condition))
    }

    pub fn or(self, condition: Condition) -> Result<Self> {
        self.add(OR, Clause::Condition(condition))
    }

    /// Appends a condition joined by this group's own separator.
    pub fn push(self, condition: Condition) -> Result<Self> {
        let separator = self.separator.clone();
        self.add(&separator, Clause::Condition(condition))
    }

    /// Appends a parenthesized sub-group joined by `AND`.
    pub fn and_group(self, group: ConditionGroup) -> Result<Self> {
        self.add(AND, Clause::Group(group))
    }

    /// Appends a parenthesized sub-group joined by `OR`.
    pub fn or_group(self, group: ConditionGroup) -> Result<Self> {
        self.add(OR, Clause::Group(group))
    }

    /// Appends every condition with this group's separator.
    pub fn extend<I>(mut self, conditions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Condition>,
    {
        for condition in conditions {
            self = self.push(condition)?;
        }
        Ok(self)
    }

    fn add(mut self, separator: &str, clause: Clause) -> Result<Self> {
        if self.empty_params && clause.has_values() {
            return Err(SqlError::PlaceholderConflict);
        }
        self.entries.push(Entry {
            separator: separator.to_string(),
            clause,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The top-level conditions, skipping nested groups.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.entries.iter().filter_map(|e| match &e.clause {
            Clause::Condition(c) => Some(c),
            Clause::Group(_) => None,
        })
    }

    /// Whether any entry is a nested group rather than a condition.
    pub fn has_nested_groups(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.clause, Clause::Group(_)))
    }

    /// Whether any condition (at any depth) carries a real value.
    pub fn has_values(&self) -> bool {
        self.entries.iter().any(|e| e.clause.has_values())
    }

    /// Returns a copy with every placeholder replaced, in insertion order.
    ///
    /// The result is no longer in empty-parameter mode.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::PlaceholderCount`] unless exactly one value is
    /// supplied per placeholder.
    pub fn bind<I>(&self, values: I) -> Result<ConditionGroup>
    where
        I: IntoIterator<Item = Operand>,
    {
        let values: Vec<Operand> = values.into_iter().collect();
        let expected = self.param_count();
        if values.len() != expected {
            return Err(SqlError::PlaceholderCount {
                expected,
                actual: values.len(),
            });
        }
        let mut bound = self.clone();
        let mut values = values.into_iter();
        bound.bind_in_place(&mut values);
        Ok(bound)
    }

    fn bind_in_place(&mut self, values: &mut impl Iterator<Item = Operand>) {
        self.empty_params = false;
        for entry in &mut self.entries {
            match &mut entry.clause {
                Clause::Condition(c) => {
                    c.bind_params(&mut *values);
                }
                Clause::Group(g) => g.bind_in_place(&mut *values),
            }
        }
    }
}

fn write_separator(qb: &mut QueryBuilder, separator: &str) {
    if separator == "," {
        qb.append(", ");
    } else {
        qb.append_space_separated(separator);
    }
}

impl Query for ConditionGroup {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write_separator(qb, &entry.separator);
            }
            match &entry.clause {
                Clause::Condition(c) => c.write(qb, cx)?,
                Clause::Group(g) => {
                    qb.append("(");
                    g.write(qb, cx)?;
                    qb.append(")");
                }
            }
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        self.entries.iter().map(|e| e.clause.param_count()).sum()
    }

    fn bind_placeholders(&mut self, mut values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        self.bind_in_place(&mut values);
        Ok(())
    }
}

impl From<Condition> for ConditionGroup {
    fn from(condition: Condition) -> Self {
        let mut group = ConditionGroup::new();
        group.entries.push(Entry {
            separator: AND.to_string(),
            clause: Clause::Condition(condition),
        });
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column;

    #[test]
    fn test_and_or_in_order() {
        let group = ConditionGroup::new()
            .and(column("a").is(1))
            .unwrap()
            .or(column("b").is(2))
            .unwrap()
            .and(column("c").is(3))
            .unwrap();
        assert_eq!(group.query().unwrap(), "`a`=1 OR `b`=2 AND `c`=3");
    }

    #[test]
    fn test_separator_count() {
        let names = ["a", "b", "c", "d", "e"];
        let group = ConditionGroup::new()
            .extend(names.iter().map(|n| column(*n).is(0)))
            .unwrap();
        let sql = group.query().unwrap();
        assert_eq!(sql.matches(" AND ").count(), names.len() - 1);

        let positions: Vec<usize> = names
            .iter()
            .map(|n| sql.find(&format!("`{n}`")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_comma_separator() {
        let set = ConditionGroup::comma()
            .extend([column("a").is(1), column("b").is("x")])
            .unwrap();
        assert_eq!(set.query().unwrap(), "`a`=1, `b`='x'");
    }

    #[test]
    fn test_nested_group_parenthesized() {
        let inner = ConditionGroup::new()
            .and(column("a").is(1))
            .unwrap()
            .or(column("a").is(2))
            .unwrap();
        let group = ConditionGroup::from(column("b").is_not_null())
            .and_group(inner)
            .unwrap();
        assert_eq!(
            group.query().unwrap(),
            "`b` IS NOT NULL AND (`a`=1 OR `a`=2)"
        );
    }

    #[test]
    fn test_empty_params_rejects_values() {
        let err = ConditionGroup::placeholders()
            .and(column("a").is(1))
            .unwrap_err();
        assert_eq!(err, SqlError::PlaceholderConflict);

        let err = ConditionGroup::from(column("a").is(1))
            .set_empty_params(true)
            .unwrap_err();
        assert_eq!(err, SqlError::PlaceholderConflict);
    }

    #[test]
    fn test_empty_params_accepts_null_tests() {
        let group = ConditionGroup::placeholders()
            .and(column("a").param())
            .unwrap()
            .and(column("b").is_null())
            .unwrap();
        assert_eq!(group.param_count(), 1);
    }

    #[test]
    fn test_bind_matches_direct_construction() {
        let template = ConditionGroup::placeholders()
            .and(column("name").param())
            .unwrap()
            .and(column("salary").param())
            .unwrap()
            .and(column("rate").param())
            .unwrap();
        let bound = template
            .bind(["x".into(), 5.into(), 1.5.into()])
            .unwrap();
        let direct = ConditionGroup::new()
            .and(column("name").is("x"))
            .unwrap()
            .and(column("salary").is(5))
            .unwrap()
            .and(column("rate").is(1.5))
            .unwrap();
        assert_eq!(bound.query().unwrap(), direct.query().unwrap());
        assert!(!bound.is_empty_params());
    }

    #[test]
    fn test_bind_wrong_count_fails() {
        let template = ConditionGroup::placeholders()
            .and(column("a").param())
            .unwrap()
            .and(column("b").param())
            .unwrap();
        assert_eq!(
            template.bind([1.into()]).unwrap_err(),
            SqlError::PlaceholderCount {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            template.bind([1.into(), 2.into(), 3.into()]).unwrap_err(),
            SqlError::PlaceholderCount {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_bind_recurses_into_nested_groups() {
        let inner = ConditionGroup::placeholders()
            .and(column("b").param())
            .unwrap()
            .or(column("c").param())
            .unwrap();
        let group = ConditionGroup::placeholders()
            .and(column("a").param())
            .unwrap()
            .and_group(inner)
            .unwrap();
        let bound = group.bind([1.into(), 2.into(), 3.into()]).unwrap();
        assert_eq!(bound.query().unwrap(), "`a`=1 AND (`b`=2 OR `c`=3)");
    }
}
