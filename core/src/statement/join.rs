use crate::builder::QueryBuilder;
use crate::condition::Operand;
use crate::error::{Result, SqlError};
use crate::group::ConditionGroup;
use crate::query::{Query, SqlContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Left,
    Inner,
    /// `LEFT OUTER`
    Outer,
    Cross,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT",
            JoinType::Inner => "INNER",
            JoinType::Outer => "LEFT OUTER",
            JoinType::Cross => "CROSS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Constraint {
    None,
    On(ConditionGroup),
    Using(Vec<String>),
}

/// A single `JOIN` with at most one of `ON` and `USING`.
///
/// # Examples
///
/// ```
/// use sqlweave_core::statement::{Join, Select};
/// use sqlweave_core::{Operand, Query, column};
///
/// # fn main() -> sqlweave_core::Result<()> {
/// let join = Join::left("Department")
///     .as_alias("d")
///     .on(column("dept_id").with_table("e").is(Operand::raw("`d`.`id`")))?;
/// let select = Select::all().from("Employee").as_alias("e").join(join);
/// assert_eq!(
///     select.query()?,
///     "SELECT * FROM `Employee` AS `e` LEFT JOIN `Department` AS `d` ON `e`.`dept_id`=`d`.`id`"
/// );
///
/// // A second constraint is rejected when it is set.
/// assert!(Join::inner("t").using(["id"])?.on(column("a").is(1)).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    kind: JoinType,
    natural: bool,
    table: String,
    alias: Option<String>,
    constraint: Constraint,
}

impl Join {
    pub fn new(kind: JoinType, table: impl Into<String>) -> Self {
        Self {
            kind,
            natural: false,
            table: table.into(),
            alias: None,
            constraint: Constraint::None,
        }
    }

    pub fn left(table: impl Into<String>) -> Self {
        Self::new(JoinType::Left, table)
    }

    pub fn inner(table: impl Into<String>) -> Self {
        Self::new(JoinType::Inner, table)
    }

    pub fn outer(table: impl Into<String>) -> Self {
        Self::new(JoinType::Outer, table)
    }

    pub fn cross(table: impl Into<String>) -> Self {
        Self::new(JoinType::Cross, table)
    }

    pub fn natural(mut self) -> Self {
        self.natural = true;
        self
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the `ON` constraint.
    ///
    /// # Errors
    ///
    /// [`SqlError::ConflictingJoinClause`] if `USING` is already set.
    pub fn on(mut self, group: impl Into<ConditionGroup>) -> Result<Self> {
        if matches!(self.constraint, Constraint::Using(_)) {
            return Err(SqlError::ConflictingJoinClause(self.table));
        }
        self.constraint = Constraint::On(group.into());
        Ok(self)
    }

    /// Sets the `USING` column list.
    ///
    /// # Errors
    ///
    /// [`SqlError::ConflictingJoinClause`] if `ON` is already set.
    pub fn using<I, S>(mut self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if matches!(self.constraint, Constraint::On(_)) {
            return Err(SqlError::ConflictingJoinClause(self.table));
        }
        self.constraint = Constraint::Using(columns.into_iter().map(Into::into).collect());
        Ok(self)
    }

    pub fn kind(&self) -> JoinType {
        self.kind
    }
}

impl Query for Join {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        if self.natural {
            qb.append("NATURAL ");
        }
        qb.append(self.kind.as_sql())
            .append_space_separated("JOIN")
            .append_quoted(&self.table);
        if let Some(alias) = &self.alias {
            qb.append(" AS ").append_quoted(alias);
        }
        match &self.constraint {
            Constraint::None => {}
            Constraint::On(group) => {
                qb.append_space_separated("ON");
                group.write(qb, cx)?;
            }
            Constraint::Using(columns) => {
                qb.append_space_separated("USING")
                    .append("(")
                    .append_quoted_list(columns)
                    .append(")");
            }
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        match &self.constraint {
            Constraint::On(group) => group.param_count(),
            _ => 0,
        }
    }

    fn bind_placeholders(&mut self, values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        match &mut self.constraint {
            Constraint::On(group) => group.bind_placeholders(values),
            _ => Ok(()),
        }
    }
}
