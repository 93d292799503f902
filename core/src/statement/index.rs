use crate::builder::{QueryBuilder, quote};
use crate::converter::ConverterRegistry;
use crate::error::Result;
use crate::query::{Query, SchemaObject, SqlContext};

/// A named index over one table.
///
/// Column names are kept distinct; adding a column twice has no effect.
///
/// ```
/// use sqlweave_core::statement::Index;
/// use sqlweave_core::{Query, SchemaObject};
///
/// let index = Index::new("salary_index").on("IndexModel", ["salary", "salary"]);
/// assert_eq!(
///     index.query().unwrap(),
///     "CREATE INDEX IF NOT EXISTS `salary_index` ON `IndexModel`(`salary`)"
/// );
/// assert_eq!(index.drop_query(), "DROP INDEX IF EXISTS `salary_index`");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    name: String,
    table: String,
    columns: Vec<String>,
    unique: bool,
}

impl Index {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            columns: Vec::new(),
            unique: false,
        }
    }

    pub fn on<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table = table.into();
        for column in columns {
            self.add_column(column);
        }
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Adds a column unless it is already part of the index.
    pub fn add_column(&mut self, column: impl Into<String>) -> &mut Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

impl Query for Index {
    fn write(&self, qb: &mut QueryBuilder, _cx: &SqlContext<'_>) -> Result<()> {
        qb.append("CREATE ");
        if self.unique {
            qb.append("UNIQUE ");
        }
        qb.append("INDEX IF NOT EXISTS ")
            .append_quoted(&self.name)
            .append_space_separated("ON")
            .append_quoted(&self.table)
            .append("(")
            .append_quoted_list(&self.columns)
            .append(")");
        Ok(())
    }
}

impl SchemaObject for Index {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_query_with(&self, converters: &ConverterRegistry) -> Result<String> {
        self.query_with(converters)
    }

    fn drop_query(&self) -> String {
        format!("DROP INDEX IF EXISTS {}", quote(&self.name))
    }
}
