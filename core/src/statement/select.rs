use crate::builder::QueryBuilder;
use crate::condition::NameAlias;
use crate::error::Result;
use crate::query::{Query, SqlContext};

use super::from::FromClause;

/// `DISTINCT` or `ALL` after `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Distinct,
    All,
}

impl Qualifier {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Qualifier::Distinct => "DISTINCT",
            Qualifier::All => "ALL",
        }
    }
}

/// An aggregate or scalar function call, e.g. `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    name: String,
    args: Vec<NameAlias>,
    alias: Option<String>,
}

impl Method {
    pub fn new<I, N>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NameAlias>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            alias: None,
        }
    }

    /// `COUNT(*)` when called without columns.
    pub fn count<I, N>(columns: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NameAlias>,
    {
        let method = Self::new("COUNT", columns);
        if method.args.is_empty() {
            Self::new("COUNT", ["*"])
        } else {
            method
        }
    }

    pub fn max(column: impl Into<NameAlias>) -> Self {
        Self::new("MAX", [column])
    }

    pub fn min(column: impl Into<NameAlias>) -> Self {
        Self::new("MIN", [column])
    }

    pub fn sum(column: impl Into<NameAlias>) -> Self {
        Self::new("SUM", [column])
    }

    pub fn avg(column: impl Into<NameAlias>) -> Self {
        Self::new("AVG", [column])
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn write(&self, qb: &mut QueryBuilder) {
        qb.append(&self.name)
            .append("(")
            .append_list(self.args.iter().map(NameAlias::full_name))
            .append(")");
        if let Some(alias) = &self.alias {
            qb.append(" AS ").append_quoted(alias);
        }
    }
}

/// One entry of the result column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultColumn {
    Column(NameAlias),
    Method(Method),
}

impl From<&str> for ResultColumn {
    fn from(name: &str) -> Self {
        ResultColumn::Column(NameAlias::from(name))
    }
}

impl From<String> for ResultColumn {
    fn from(name: String) -> Self {
        ResultColumn::Column(NameAlias::from(name))
    }
}

impl From<NameAlias> for ResultColumn {
    fn from(name: NameAlias) -> Self {
        ResultColumn::Column(name)
    }
}

impl From<Method> for ResultColumn {
    fn from(method: Method) -> Self {
        ResultColumn::Method(method)
    }
}

/// The `SELECT ...` head of a query. An empty column list selects `*`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Select {
    qualifier: Option<Qualifier>,
    columns: Vec<ResultColumn>,
}

impl Select {
    pub fn new<I, C>(columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ResultColumn>,
    {
        Self {
            qualifier: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// `SELECT *`.
    pub fn all() -> Self {
        Self::default()
    }

    /// `SELECT COUNT(*)`.
    pub fn count() -> Self {
        Self::new([Method::count(Vec::<&str>::new())])
    }

    pub fn distinct(mut self) -> Self {
        self.qualifier = Some(Qualifier::Distinct);
        self
    }

    pub fn all_rows(mut self) -> Self {
        self.qualifier = Some(Qualifier::All);
        self
    }

    pub fn column(mut self, column: impl Into<ResultColumn>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn from(self, table: impl Into<String>) -> FromClause<Select> {
        FromClause::new(self, table)
    }
}

impl Query for Select {
    fn write(&self, qb: &mut QueryBuilder, _cx: &SqlContext<'_>) -> Result<()> {
        qb.append("SELECT ");
        if let Some(qualifier) = self.qualifier {
            qb.append(qualifier.as_sql()).append_space();
        }
        if self.columns.is_empty() {
            qb.append("*");
            return Ok(());
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                qb.append(", ");
            }
            match column {
                ResultColumn::Column(name) => {
                    qb.append(name.definition());
                }
                ResultColumn::Method(method) => method.write(qb),
            }
        }
        Ok(())
    }
}
