use crate::builder::QueryBuilder;
use crate::error::Result;
use crate::query::{Query, SqlContext};

use super::from::FromClause;

/// The `DELETE` head; continue with [`from`](Delete::from).
///
/// ```
/// use sqlweave_core::statement::Delete;
/// use sqlweave_core::{Query, column};
///
/// let delete = Delete::from("IndexModel").where_(column("salary").less_than(100));
/// assert_eq!(delete.query().unwrap(), "DELETE FROM `IndexModel` WHERE `salary`<100");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delete;

impl Delete {
    pub fn from(table: impl Into<String>) -> FromClause<Delete> {
        FromClause::new(Delete, table)
    }
}

impl Query for Delete {
    fn write(&self, qb: &mut QueryBuilder, _cx: &SqlContext<'_>) -> Result<()> {
        qb.append("DELETE");
        Ok(())
    }
}
