use crate::builder::QueryBuilder;
use crate::condition::Operand;
use crate::error::Result;
use crate::group::ConditionGroup;
use crate::query::{Query, SqlContext};

use super::join::Join;
use super::where_clause::Where;

/// `<head> FROM table [AS alias] [joins...]`, where the head is a
/// [`Select`](super::Select) or a [`Delete`](super::Delete).
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause<H> {
    head: H,
    table: String,
    alias: Option<String>,
    joins: Vec<Join>,
}

impl<H: Query> FromClause<H> {
    pub fn new(head: H, table: impl Into<String>) -> Self {
        Self {
            head,
            table: table.into(),
            alias: None,
            joins: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds a join; joins are emitted in the order they are added.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn where_(self, group: impl Into<ConditionGroup>) -> Where<Self> {
        Where::new(self, group.into())
    }

    /// A `WHERE`-less continuation, for `ORDER BY` / `LIMIT` on every row.
    pub fn all_rows(self) -> Where<Self> {
        Where::new(self, ConditionGroup::new())
    }
}

impl<H: Query> Query for FromClause<H> {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        self.head.write(qb, cx)?;
        qb.append_space_separated("FROM").append_quoted(&self.table);
        if let Some(alias) = &self.alias {
            qb.append(" AS ").append_quoted(alias);
        }
        for join in &self.joins {
            qb.append_space();
            join.write(qb, cx)?;
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        self.head.param_count() + self.joins.iter().map(Query::param_count).sum::<usize>()
    }

    fn bind_placeholders(&mut self, values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        self.head.bind_placeholders(values)?;
        for join in &mut self.joins {
            join.bind_placeholders(values)?;
        }
        Ok(())
    }
}
