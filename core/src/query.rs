//! The [`Query`] trait implemented by every statement and clause.

use crate::builder::QueryBuilder;
use crate::condition::Operand;
use crate::converter::ConverterRegistry;
use crate::error::{Result, SqlError};

/// Emission settings handed down while a statement writes itself.
#[derive(Debug, Clone, Copy)]
pub struct SqlContext<'a> {
    converters: &'a ConverterRegistry,
    raw: bool,
}

impl<'a> SqlContext<'a> {
    pub fn new(converters: &'a ConverterRegistry) -> Self {
        Self {
            converters,
            raw: false,
        }
    }

    /// A context that writes text values without escaping.
    pub fn raw(converters: &'a ConverterRegistry) -> Self {
        Self {
            converters,
            raw: true,
        }
    }

    pub fn converters(&self) -> &'a ConverterRegistry {
        self.converters
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }
}

/// Something that renders to SQL text.
///
/// Only [`write`](Self::write) is required. Values are converted lazily, so
/// emission needs a [`ConverterRegistry`]; [`query`](Self::query) uses the
/// default registry with the built-in converters.
pub trait Query {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()>;

    /// Number of `?` placeholders the emitted SQL will contain.
    fn param_count(&self) -> usize {
        0
    }

    /// Replaces this statement's placeholders from `values` in emission
    /// order. Callers check the value count against
    /// [`param_count`](Self::param_count) first.
    ///
    /// The default accepts only statements without placeholders and fails
    /// with [`SqlError::UnresolvedPlaceholder`] otherwise.
    fn bind_placeholders(&mut self, _values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        match self.param_count() {
            0 => Ok(()),
            count => Err(SqlError::UnresolvedPlaceholder(count)),
        }
    }

    fn query_with(&self, converters: &ConverterRegistry) -> Result<String> {
        let mut qb = QueryBuilder::new();
        self.write(&mut qb, &SqlContext::new(converters))?;
        Ok(qb.into_query())
    }

    fn query(&self) -> Result<String> {
        self.query_with(&ConverterRegistry::default())
    }

    /// Emits the statement with unescaped values, for logs and tests.
    fn raw_query_with(&self, converters: &ConverterRegistry) -> Result<String> {
        let mut qb = QueryBuilder::new();
        self.write(&mut qb, &SqlContext::raw(converters))?;
        Ok(qb.into_query())
    }

    fn raw_query(&self) -> Result<String> {
        self.raw_query_with(&ConverterRegistry::default())
    }
}

/// Raw SQL passes through untouched.
impl Query for str {
    fn write(&self, qb: &mut QueryBuilder, _cx: &SqlContext<'_>) -> Result<()> {
        qb.append(self);
        Ok(())
    }
}

impl Query for String {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        self.as_str().write(qb, cx)
    }
}

impl<Q: Query + ?Sized> Query for &Q {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        (**self).write(qb, cx)
    }

    fn param_count(&self) -> usize {
        (**self).param_count()
    }
}

impl<Q: Query + ?Sized> Query for Box<Q> {
    fn write(&self, qb: &mut QueryBuilder, cx: &SqlContext<'_>) -> Result<()> {
        (**self).write(qb, cx)
    }

    fn param_count(&self) -> usize {
        (**self).param_count()
    }

    fn bind_placeholders(&mut self, values: &mut dyn Iterator<Item = Operand>) -> Result<()> {
        (**self).bind_placeholders(values)
    }
}

/// A named schema object that can be created and dropped, such as an index
/// or a trigger.
pub trait SchemaObject {
    fn name(&self) -> &str;

    /// The `CREATE` statement, converting typed values with `converters`.
    fn create_query_with(&self, converters: &ConverterRegistry) -> Result<String>;

    fn create_query(&self) -> Result<String> {
        self.create_query_with(&ConverterRegistry::default())
    }

    fn drop_query(&self) -> String;
}
