//! The explicitly constructed lookup context.
//!
//! A [`Registry`] owns the [`ConverterRegistry`] and every validated
//! [`Table`]. There is no process-wide instance: build one at startup, share
//! it by reference or `Arc`, and hand it to whatever needs table or
//! converter lookup.

use std::collections::HashMap;

use crate::converter::ConverterRegistry;
use crate::error::{Result, SqlError};
use crate::table::{PrimaryKey, Table};
use crate::validate::{ValidationError, validate_table};

/// Converters plus registered tables, in registration order.
///
/// # Examples
///
/// ```
/// use sqlweave_core::*;
///
/// let mut registry = Registry::default();
/// registry
///     .register_table(
///         Table::new("Department").column(Column::new("id", SqlType::Integer).auto_increment()),
///     )
///     .unwrap();
/// assert!(registry.table("Department").is_some());
///
/// // Invalid tables are refused.
/// let err = registry.register_table(Table::new("Broken")).unwrap_err();
/// assert!(matches!(err, SqlError::InvalidTable { .. }));
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    converters: ConverterRegistry,
    tables: Vec<Table>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new(converters: ConverterRegistry) -> Self {
        Self {
            converters,
            tables: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    /// Validates and registers a table.
    ///
    /// # Errors
    ///
    /// [`SqlError::InvalidTable`] when validation fails or a column names a
    /// converter that is missing or stores another SQL type;
    /// [`SqlError::DuplicateTable`] when the name is taken.
    pub fn register_table(&mut self, table: Table) -> Result<()> {
        let mut errors = validate_table(&table);
        errors.extend(self.check_converters(&table));
        if !errors.is_empty() {
            return Err(SqlError::InvalidTable {
                table: table.name,
                errors,
            });
        }
        if self.by_name.contains_key(&table.name) {
            return Err(SqlError::DuplicateTable(table.name));
        }
        self.by_name.insert(table.name.clone(), self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Builder-style [`register_table`](Self::register_table).
    pub fn with_table(mut self, table: Table) -> Result<Self> {
        self.register_table(table)?;
        Ok(self)
    }

    fn check_converters(&self, table: &Table) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for column in &table.columns {
            let Some(name) = &column.converter else {
                continue;
            };
            match self.converters.by_name(name) {
                None => errors.push(ValidationError::UnknownConverter {
                    column: column.name.clone(),
                    converter: name.clone(),
                }),
                Some(converter) if converter.db_type() != column.sql_type => {
                    errors.push(ValidationError::ConverterTypeMismatch {
                        column: column.name.clone(),
                        converter: name.clone(),
                        column_type: column.sql_type,
                        converter_type: converter.db_type(),
                    });
                }
                Some(_) => {}
            }
        }
        errors
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Like [`table`](Self::table) but fails with [`SqlError::UnknownTable`].
    pub fn require_table(&self, name: &str) -> Result<&Table> {
        self.table(name)
            .ok_or_else(|| SqlError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn primary_key(&self, table: &str) -> Result<PrimaryKey> {
        self.require_table(table)?
            .primary_key()
            .ok_or_else(|| SqlError::UnknownTable(table.to_string()))
    }

    /// Tables ordered so that every referenced table precedes the tables
    /// referencing it. Ties keep registration order.
    ///
    /// Self references are allowed.
    ///
    /// # Errors
    ///
    /// [`SqlError::UnknownTable`] when a foreign key references a table that
    /// is not registered; [`SqlError::ForeignKeyCycle`] when tables reference
    /// each other in a cycle.
    pub fn creation_order(&self) -> Result<Vec<&Table>> {
        let mut pending: Vec<usize> = Vec::with_capacity(self.tables.len());
        for (i, table) in self.tables.iter().enumerate() {
            for referenced in table.referenced_tables() {
                if self.table(referenced).is_none() {
                    return Err(SqlError::UnknownTable(referenced.to_string()));
                }
            }
            pending.push(i);
        }

        let mut placed = vec![false; self.tables.len()];
        let mut order = Vec::with_capacity(self.tables.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|&i| {
                let table = &self.tables[i];
                table
                    .referenced_tables()
                    .into_iter()
                    .filter(|r| *r != table.name)
                    .all(|r| placed[self.by_name[r]])
            });
            let Some(pos) = ready else {
                let names: Vec<&str> = pending
                    .iter()
                    .map(|&i| self.tables[i].name.as_str())
                    .collect();
                return Err(SqlError::ForeignKeyCycle(names.join(", ")));
            };
            let i = pending.remove(pos);
            placed[i] = true;
            order.push(&self.tables[i]);
        }
        Ok(order)
    }
}
