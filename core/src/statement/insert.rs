use crate::builder::QueryBuilder;
use crate::condition::Operand;
use crate::error::{Result, SqlError};
use crate::query::{Query, SqlContext};
use crate::value::ConflictAction;

use super::Where;
use super::from::FromClause;
use super::select::Select;

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Values(Vec<Vec<Operand>>),
    Select(Box<Where<FromClause<Select>>>),
}

/// `INSERT [OR action] INTO table(columns) VALUES (...)` or `... SELECT ...`.
///
/// ```
/// use sqlweave_core::statement::Insert;
/// use sqlweave_core::{ConflictAction, Query};
///
/// let insert = Insert::into("IndexModel")
///     .or(ConflictAction::Replace)
///     .columns(["name", "salary"])
///     .values(["bob".into(), 30000.into()]);
/// assert_eq!(
///     insert.query().unwrap(),
///     "INSERT OR REPLACE INTO `IndexModel`(`name`, `salary`) VALUES ('bob', 30000)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    conflict: Option<ConflictAction>,
    columns: Vec<String>,
    source: Source,
}

impl Insert {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conflict: None,
            columns: Vec::new(),
            source: Source::Values(Vec::new()),
        }
    }

    pub fn or(mut self, action: ConflictAction) -> Self {
        self.conflict = Some(action);
        self
    }

    pub fn or_replace(self) -> Self {
        self.or(ConflictAction::Replace)
    }

    pub fn or_ignore(self) -> Self {
        self.or(ConflictAction::Ignore)
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one row of values. Call repeatedly for a multi-row insert.
    pub fn values<I>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = Operand>,
    {
        let row = row.into_iter().collect();
        match &mut self.source {
            Source::Values(rows) => rows.push(row),
            Source::Select(_) => self.source = Source::Values(vec![row]),
        }
        self
    }

    /// Inserts the rows produced by a query instead of literal values.
    pub fn select(mut self, query: Where<FromClause<Select>>) -> Self {
        self.source = Source::Select(Box::new(query));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Query for Insert {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        qb.append("INSERT ");
        if let Some(action) = self.conflict {
            qb.append("OR ").append(action.as_sql()).append_space();
        }
        qb.append("INTO ").append_quoted(&self.table);
        if !self.columns.is_empty() {
            qb.append("(").append_quoted_list(&self.columns).append(")");
        }
        match &self.source {
            Source::Values(rows) => {
                qb.append(" VALUES ");
                for (i, row) in rows.iter().enumerate() {
                    if !self.columns.is_empty() && row.len() != self.columns.len() {
                        return Err(SqlError::ColumnValueMismatch {
                            table: self.table.clone(),
                            columns: self.columns.len(),
                            values: row.len(),
                        });
                    }
                    if i > 0 {
                        qb.append(", ");
                    }
                    qb.append("(");
                    for (j, value) in row.iter().enumerate() {
                        if j > 0 {
                            qb.append(", ");
                        }
                        value.write(qb, cx)?;
                    }
                    qb.append(")");
                }
            }
            Source::Select(query) => {
                qb.append_space();
                query.write(qb, cx)?;
            }
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        match &self.source {
            Source::Values(rows) => rows.iter().flatten().filter(|v| v.is_param()).count(),
            Source::Select(query) => query.param_count(),
        }
    }
}
