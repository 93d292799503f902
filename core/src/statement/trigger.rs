use std::fmt;

use crate::builder::{QueryBuilder, quote};
use crate::converter::ConverterRegistry;
use crate::error::Result;
use crate::group::ConditionGroup;
use crate::query::{Query, SchemaObject, SqlContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Delete,
    Insert,
    /// `UPDATE [OF columns]`
    Update(Vec<String>),
}

/// A named trigger before its event is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    name: String,
    temporary: bool,
    timing: Option<TriggerTiming>,
}

impl Trigger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temporary: false,
            timing: None,
        }
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn before(mut self) -> Self {
        self.timing = Some(TriggerTiming::Before);
        self
    }

    pub fn after(mut self) -> Self {
        self.timing = Some(TriggerTiming::After);
        self
    }

    pub fn instead_of(mut self) -> Self {
        self.timing = Some(TriggerTiming::InsteadOf);
        self
    }

    pub fn delete_on(self, table: impl Into<String>) -> TriggerMethod {
        TriggerMethod::new(self, TriggerEvent::Delete, table.into())
    }

    pub fn insert_on(self, table: impl Into<String>) -> TriggerMethod {
        TriggerMethod::new(self, TriggerEvent::Insert, table.into())
    }

    /// Fires on updates; with columns, only on updates of those columns.
    pub fn update_on<I, S>(self, table: impl Into<String>, columns: I) -> TriggerMethod
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        TriggerMethod::new(self, TriggerEvent::Update(columns), table.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The trigger's event and table, waiting for its body.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMethod {
    trigger: Trigger,
    event: TriggerEvent,
    table: String,
    for_each_row: bool,
    when: Option<ConditionGroup>,
}

impl TriggerMethod {
    fn new(trigger: Trigger, event: TriggerEvent, table: String) -> Self {
        Self {
            trigger,
            event,
            table,
            for_each_row: false,
            when: None,
        }
    }

    pub fn for_each_row(mut self) -> Self {
        self.for_each_row = true;
        self
    }

    pub fn when(mut self, group: impl Into<ConditionGroup>) -> Self {
        self.when = Some(group.into());
        self
    }

    /// Supplies the first statement of the trigger body.
    pub fn begin<Q>(self, statement: Q) -> CompletedTrigger
    where
        Q: Query + Send + Sync + 'static,
    {
        CompletedTrigger {
            method: self,
            statements: vec![Box::new(statement)],
        }
    }

    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        qb.append("CREATE ");
        if self.trigger.temporary {
            qb.append("TEMP ");
        }
        qb.append("TRIGGER IF NOT EXISTS ")
            .append_quoted(&self.trigger.name)
            .append_space();
        if let Some(timing) = self.trigger.timing {
            qb.append(timing.as_sql()).append_space();
        }
        match &self.event {
            TriggerEvent::Delete => {
                qb.append("DELETE");
            }
            TriggerEvent::Insert => {
                qb.append("INSERT");
            }
            TriggerEvent::Update(columns) if columns.is_empty() => {
                qb.append("UPDATE");
            }
            TriggerEvent::Update(columns) => {
                qb.append("UPDATE OF ").append_quoted_list(columns);
            }
        }
        qb.append_space_separated("ON").append_quoted(&self.table);
        if self.for_each_row {
            qb.append(" FOR EACH ROW");
        }
        if let Some(when) = &self.when {
            qb.append_space_separated("WHEN");
            when.write(qb, cx)?;
        }
        Ok(())
    }
}

/// A trigger with a body, ready to be created or dropped.
///
/// ```
/// use sqlweave_core::statement::{Insert, Trigger};
/// use sqlweave_core::{Operand, Query, SchemaObject};
///
/// let trigger = Trigger::new("log_insert")
///     .after()
///     .insert_on("Employee")
///     .begin(Insert::into("Log").columns(["name"]).values([Operand::raw("NEW.`name`")]));
/// assert_eq!(
///     trigger.query().unwrap(),
///     "CREATE TRIGGER IF NOT EXISTS `log_insert` AFTER INSERT ON `Employee` \
///      BEGIN INSERT INTO `Log`(`name`) VALUES (NEW.`name`); END"
/// );
/// assert_eq!(trigger.drop_query(), "DROP TRIGGER IF EXISTS `log_insert`");
/// ```
pub struct CompletedTrigger {
    method: TriggerMethod,
    statements: Vec<Box<dyn Query + Send + Sync>>,
}

impl CompletedTrigger {
    /// Appends another statement to the body.
    pub fn and<Q>(mut self, statement: Q) -> Self
    where
        Q: Query + Send + Sync + 'static,
    {
        self.statements.push(Box::new(statement));
        self
    }

    pub fn table(&self) -> &str {
        &self.method.table
    }
}

impl fmt::Debug for CompletedTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedTrigger")
            .field("method", &self.method)
            .field("statements", &self.statements.len())
            .finish()
    }
}

impl Query for CompletedTrigger {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        self.method.write(qb, cx)?;
        qb.append(" BEGIN");
        for statement in &self.statements {
            qb.append_space();
            statement.write(qb, cx)?;
            qb.append(";");
        }
        qb.append(" END");
        Ok(())
    }
}

impl SchemaObject for CompletedTrigger {
    fn name(&self) -> &str {
        &self.method.trigger.name
    }

    fn create_query_with(&self, converters: &ConverterRegistry) -> Result<String> {
        self.query_with(converters)
    }

    fn drop_query(&self) -> String {
        format!("DROP TRIGGER IF EXISTS {}", quote(&self.method.trigger.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Delete, Update};
    use crate::{Operand, SqlError, column};

    #[test]
    fn test_temp_update_of_columns_with_when() {
        let trigger = Trigger::new("salary_audit")
            .temporary()
            .before()
            .update_on("Employee", ["salary"])
            .for_each_row()
            .when(column("salary").with_table("NEW").greater_than(Operand::raw("OLD.`salary`")))
            .begin(
                Update::table("Stats")
                    .set([column("raises").is(Operand::raw("`raises` + 1"))])
                    .unwrap()
                    .all_rows(),
            )
            .and(Delete::from("Cache"));
        assert_eq!(
            trigger.query().unwrap(),
            "CREATE TEMP TRIGGER IF NOT EXISTS `salary_audit` BEFORE UPDATE OF `salary` ON `Employee` \
             FOR EACH ROW WHEN `NEW`.`salary`>OLD.`salary` \
             BEGIN UPDATE `Stats` SET `raises`=`raises` + 1; DELETE FROM `Cache`; END"
        );
        assert_eq!(trigger.name(), "salary_audit");
    }

    #[test]
    fn test_no_timing() {
        let trigger = Trigger::new("t1")
            .delete_on("A")
            .begin("SELECT 1");
        assert_eq!(
            trigger.create_query().unwrap(),
            "CREATE TRIGGER IF NOT EXISTS `t1` DELETE ON `A` BEGIN SELECT 1; END"
        );
    }

    #[test]
    fn test_create_query_uses_given_converters() {
        let trigger = Trigger::new("flagged")
            .insert_on("A")
            .when(column("flag").with_table("NEW").is(Operand::typed(true)))
            .begin("SELECT 1");
        assert!(trigger.create_query().unwrap().contains("`flag`=1"));

        let empty = ConverterRegistry::empty();
        assert!(matches!(
            trigger.create_query_with(&empty),
            Err(SqlError::MissingConverter(_))
        ));
        assert!(matches!(
            trigger.raw_query_with(&empty),
            Err(SqlError::MissingConverter(_))
        ));
    }
}
