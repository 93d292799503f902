use crate::builder::QueryBuilder;
use crate::condition::{Condition, NameAlias, Operand};
use crate::error::{Result, SqlError};
use crate::group::ConditionGroup;
use crate::query::{Query, SqlContext};

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: NameAlias,
    ascending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<NameAlias>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<NameAlias>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    fn sql(&self) -> String {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!("{} {direction}", self.column.full_name())
    }
}

/// A statement followed by `WHERE`, `GROUP BY`, `HAVING`, `ORDER BY`,
/// `LIMIT` and `OFFSET`. Empty parts are omitted, including `WHERE` itself
/// when the condition group is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Where<B> {
    base: B,
    group: ConditionGroup,
    group_by: Vec<NameAlias>,
    having: ConditionGroup,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<B: Query> Where<B> {
    pub fn new(base: B, group: ConditionGroup) -> Self {
        Self {
            base,
            group,
            group_by: Vec::new(),
            having: ConditionGroup::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn group(&self) -> &ConditionGroup {
        &self.group
    }

    pub fn and(mut self, condition: Condition) -> Result<Self> {
        self.group = self.group.and(condition)?;
        Ok(self)
    }

    pub fn or(mut self, condition: Condition) -> Result<Self> {
        self.group = self.group.or(condition)?;
        Ok(self)
    }

    pub fn and_group(mut self, group: ConditionGroup) -> Result<Self> {
        self.group = self.group.and_group(group)?;
        Ok(self)
    }

    pub fn or_group(mut self, group: ConditionGroup) -> Result<Self> {
        self.group = self.group.or_group(group)?;
        Ok(self)
    }

    pub fn group_by<I, N>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NameAlias>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, group: impl Into<ConditionGroup>) -> Self {
        self.having = group.into();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Replaces every placeholder, in emission order: the statement before
    /// `WHERE` (join `ON` clauses, `SET` lists), then `WHERE`, then
    /// `HAVING`.
    ///
    /// # Errors
    ///
    /// [`SqlError::PlaceholderCount`](crate::SqlError::PlaceholderCount) when
    /// the number of values differs from the number of placeholders.
    pub fn bind<I>(mut self, values: I) -> Result<Self>
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
        self.bind_placeholders(&mut values.into_iter())?;
        Ok(self)
    }
}

impl<B: Query> Query for Where<B> {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        self.base.write(qb, cx)?;
        if !self.group.is_empty() {
            qb.append_space_separated("WHERE");
            self.group.write(qb, cx)?;
        }
        if !self.group_by.is_empty() {
            qb.append_space_separated("GROUP BY")
                .append_list(self.group_by.iter().map(NameAlias::full_name));
        }
        if !self.having.is_empty() {
            qb.append_space_separated("HAVING");
            self.having.write(qb, cx)?;
        }
        if !self.order_by.is_empty() {
            qb.append_space_separated("ORDER BY")
                .append_list(self.order_by.iter().map(OrderBy::sql));
        }
        if let Some(limit) = self.limit {
            qb.append_space_separated("LIMIT").append(limit);
        }
        if let Some(offset) = self.offset {
            qb.append_space_separated("OFFSET").append(offset);
        }
        Ok(())
    }

    fn param_count(&self) -> usize {
        self.base.param_count() + self.group.param_count() + self.having.param_count()
    }

    fn bind_placeholders(&mut self, values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        self.base.bind_placeholders(values)?;
        self.group.bind_placeholders(values)?;
        self.having.bind_placeholders(values)
    }
}

#[cfg(test)]
mod tests {
    use crate::statement::{Join, Method, OrderBy, Select, Update};
    use crate::{Query, SqlError, column};

    #[test]
    fn test_where_omitted_when_empty() {
        let query = Select::all().from("t").all_rows().limit(5);
        assert_eq!(query.query().unwrap(), "SELECT * FROM `t` LIMIT 5");
    }

    #[test]
    fn test_full_clause_order() {
        let query = Select::new(["dept"])
            .column(Method::count(["id"]))
            .from("Employee")
            .where_(column("salary").greater_than(1000))
            .group_by(["dept"])
            .having(column("dept").is_not_null())
            .order_by(OrderBy::desc("dept"))
            .limit(10)
            .offset(20);
        assert_eq!(
            query.query().unwrap(),
            "SELECT `dept`, COUNT(`id`) FROM `Employee` WHERE `salary`>1000 \
             GROUP BY `dept` HAVING `dept` IS NOT NULL ORDER BY `dept` DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_and_or_chain() {
        let query = Select::all()
            .from("t")
            .where_(column("a").is(1))
            .or(column("b").is(2))
            .unwrap();
        assert_eq!(query.query().unwrap(), "SELECT * FROM `t` WHERE `a`=1 OR `b`=2");
    }

    #[test]
    fn test_bind_fills_join_before_where() {
        let join = Join::inner("Department")
            .on(column("title").with_table("Department").param())
            .unwrap();
        let query = Select::all()
            .from("Employee")
            .join(join)
            .where_(column("salary").param());
        assert_eq!(query.param_count(), 2);

        let bound = query.bind(["R&D".into(), 100.into()]).unwrap();
        assert_eq!(bound.param_count(), 0);
        assert_eq!(
            bound.query().unwrap(),
            "SELECT * FROM `Employee` INNER JOIN `Department` ON `Department`.`title`='R&D' \
             WHERE `salary`=100"
        );
    }

    #[test]
    fn test_bind_update_set_then_where() {
        let update = Update::table("t")
            .set([column("a").param()])
            .unwrap()
            .where_(column("id").param());
        let bound = update.bind(["x".into(), 7.into()]).unwrap();
        assert_eq!(bound.query().unwrap(), "UPDATE `t` SET `a`='x' WHERE `id`=7");
    }

    #[test]
    fn test_bind_placeholders() {
        let query = Select::all()
            .from("t")
            .where_(column("a").param())
            .and(column("b").param())
            .unwrap();
        assert_eq!(query.param_count(), 2);
        let bound = query.clone().bind(["x".into(), 2.into()]).unwrap();
        assert_eq!(
            bound.query().unwrap(),
            "SELECT * FROM `t` WHERE `a`='x' AND `b`=2"
        );
        assert!(matches!(
            query.bind([1.into()]),
            Err(SqlError::PlaceholderCount { expected: 2, actual: 1 })
        ));
    }
}
