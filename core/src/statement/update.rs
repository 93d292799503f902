use crate::builder::QueryBuilder;
use crate::condition::{Condition, Operand};
use crate::error::{Result, SqlError};
use crate::group::ConditionGroup;
use crate::query::{Query, SqlContext};
use crate::value::ConflictAction;

use super::where_clause::Where;

/// The `UPDATE [OR action] table` head; continue with [`set`](Update::set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    table: String,
    conflict: Option<ConflictAction>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conflict: None,
        }
    }

    pub fn or(mut self, action: ConflictAction) -> Self {
        self.conflict = Some(action);
        self
    }

    /// Starts the `SET` list with the given assignments.
    pub fn set<I>(self, assignments: I) -> Result<Set>
    where
        I: IntoIterator<Item = Condition>,
    {
        Ok(Set {
            update: self,
            group: ConditionGroup::comma().extend(assignments)?,
        })
    }

    /// Uses an existing group as the `SET` list. It is always emitted
    /// comma-separated.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::NestedAssignment`] if the group contains nested
    /// groups, which have no meaning as assignments.
    pub fn set_group(self, group: ConditionGroup) -> Result<Set> {
        if group.has_nested_groups() {
            return Err(SqlError::NestedAssignment(self.table));
        }
        Ok(Set {
            update: self,
            group,
        })
    }
}

impl Query for Update {
    fn write(&self, qb: &mut QueryBuilder, _cx: &SqlContext<'_>) -> Result<()> {
        qb.append("UPDATE ");
        if let Some(action) = self.conflict {
            qb.append("OR ").append(action.as_sql()).append_space();
        }
        qb.append_quoted(&self.table);
        Ok(())
    }
}

/// `UPDATE table SET a=1, b=2`.
///
/// ```
/// use sqlweave_core::statement::Update;
/// use sqlweave_core::{Query, column};
///
/// # fn main() -> sqlweave_core::Result<()> {
/// let update = Update::table("Employee")
///     .set([column("salary").is(100), column("name").is("x")])?
///     .where_(column("id").is(1));
/// assert_eq!(
///     update.query()?,
///     "UPDATE `Employee` SET `salary`=100, `name`='x' WHERE `id`=1"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    update: Update,
    group: ConditionGroup,
}

impl Set {
    pub fn and(mut self, assignment: Condition) -> Result<Self> {
        self.group = self.group.push(assignment)?;
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.update.table
    }

    pub fn where_(self, group: impl Into<ConditionGroup>) -> Where<Set> {
        Where::new(self, group.into())
    }

    /// Applies to every row.
    pub fn all_rows(self) -> Where<Set> {
        Where::new(self, ConditionGroup::new())
    }
}

impl Query for Set {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        self.update.write(qb, cx)?;
        qb.append_space_separated("SET");
        // Assignments are comma-joined whatever separator the group carries.
        for (i, assignment) in self.group.conditions().enumerate() {
            if i > 0 {
                qb.append(", ");
            }
            assignment.write(qb, cx)?;
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        self.group.param_count()
    }

    fn bind_placeholders(&mut self, values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        self.group.bind_placeholders(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column;

    #[test]
    fn test_update_or_replace_all_rows() {
        let update = Update::table("t")
            .or(ConflictAction::Replace)
            .set([column("a").is(1)])
            .unwrap()
            .all_rows();
        assert_eq!(update.query().unwrap(), "UPDATE OR REPLACE `t` SET `a`=1");
    }

    #[test]
    fn test_set_group_from_and_group() {
        let group = ConditionGroup::new()
            .and(column("a").param())
            .unwrap()
            .and(column("b").param())
            .unwrap();
        let update = Update::table("t")
            .set_group(group)
            .unwrap()
            .where_(column("id").param());
        assert_eq!(
            update.query().unwrap(),
            "UPDATE `t` SET `a`=?, `b`=? WHERE `id`=?"
        );
        assert_eq!(update.param_count(), 3);
    }

    #[test]
    fn test_set_group_rejects_nested_groups() {
        let inner = ConditionGroup::new().and(column("a").param()).unwrap();
        let group = ConditionGroup::new().and_group(inner).unwrap();
        assert_eq!(
            Update::table("t").set_group(group),
            Err(SqlError::NestedAssignment("t".into()))
        );
    }
}
