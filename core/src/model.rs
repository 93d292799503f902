//! Field access for model types.
//!
//! A model type implements [`Model`] by naming its table and returning a
//! [`FieldMap`]: one getter/setter pair per column, built once per type from
//! plain function pointers. Persistence layers read and write models only
//! through this map.
//!
//! ```
//! use sqlweave_core::{ConverterRegistry, FieldMap, Model, SqlValue};
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Employee {
//!     id: i64,
//!     name: String,
//!     active: bool,
//! }
//!
//! impl Model for Employee {
//!     const TABLE: &'static str = "Employee";
//!
//!     fn fields() -> FieldMap<Self> {
//!         FieldMap::new()
//!             .column("id", |m: &Self| m.id, |m, v| m.id = v)
//!             .column("name", |m: &Self| m.name.clone(), |m, v| m.name = v)
//!             .converted("active", |m: &Self| m.active, |m, v| m.active = v)
//!     }
//! }
//!
//! let converters = ConverterRegistry::default();
//! let fields = Employee::fields();
//! let mut employee = Employee { id: 1, name: "Ada".into(), active: true };
//! assert_eq!(fields.get(&employee, "active", &converters).unwrap(), SqlValue::Integer(1));
//!
//! fields.set(&mut employee, "name", &SqlValue::Text("Grace".into()), &converters).unwrap();
//! assert_eq!(employee.name, "Grace");
//! ```

use std::any::{Any, type_name};
use std::fmt;

use crate::converter::{ConverterRegistry, ErasedConverter};
use crate::error::{Result, SqlError};
use crate::value::SqlValue;

/// A row type mapped to one table.
pub trait Model: Default + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn fields() -> FieldMap<Self>;
}

/// Values stored directly in a column without a converter.
pub trait ColumnValue: Sized {
    fn to_sql(&self) -> SqlValue;

    fn from_sql(value: &SqlValue) -> Result<Self>;
}

fn mismatch(expected: &str, value: &SqlValue) -> SqlError {
    SqlError::ConversionError(format!("expected {expected}, found {value:?}"))
}

impl ColumnValue for i64 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(*self)
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        value.as_integer().ok_or_else(|| mismatch("integer", value))
    }
}

impl ColumnValue for i32 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Integer(i64::from(*self))
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        let wide = i64::from_sql(value)?;
        i32::try_from(wide).map_err(|_| mismatch("32-bit integer", value))
    }
}

impl ColumnValue for f64 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Real(*self)
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        value.as_real().ok_or_else(|| mismatch("real", value))
    }
}

impl ColumnValue for String {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch("text", value))
    }
}

impl ColumnValue for Vec<u8> {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Blob(self.clone())
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(bytes) => Ok(bytes.clone()),
            other => Err(mismatch("blob", other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn to_sql(&self) -> SqlValue {
        self.as_ref().map_or(SqlValue::Null, ColumnValue::to_sql)
    }

    fn from_sql(value: &SqlValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql(value).map(Some)
        }
    }
}

/// The converters one field access goes through.
///
/// A column that names a converter in its metadata uses that converter;
/// otherwise `converted` fields use the registry entry for their type and
/// plain fields are stored as-is.
#[derive(Clone, Copy)]
pub struct Conversion<'a> {
    converters: &'a ConverterRegistry,
    named: Option<&'a dyn ErasedConverter>,
}

impl<'a> Conversion<'a> {
    pub fn new(converters: &'a ConverterRegistry) -> Self {
        Self {
            converters,
            named: None,
        }
    }

    /// Routes values through the converter registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::MissingConverter`] if no converter has that name.
    pub fn named(converters: &'a ConverterRegistry, name: &str) -> Result<Self> {
        let named = converters
            .by_name(name)
            .ok_or_else(|| SqlError::MissingConverter(name.to_string()))?;
        Ok(Self {
            converters,
            named: Some(named),
        })
    }

    fn named_to_db<V: Any>(converter: &dyn ErasedConverter, value: &V) -> Result<SqlValue> {
        converter.to_db_any(value).ok_or_else(|| {
            SqlError::ConversionError(format!(
                "converter {} handles {}, not {}",
                converter.name(),
                converter.model_type(),
                type_name::<V>()
            ))
        })
    }

    fn named_from_db<V: Any>(converter: &dyn ErasedConverter, value: &SqlValue) -> Result<V> {
        converter
            .from_db_any(value)?
            .downcast::<V>()
            .map(|b| *b)
            .map_err(|_| {
                SqlError::ConversionError(format!(
                    "converter {} handles {}, not {}",
                    converter.name(),
                    converter.model_type(),
                    type_name::<V>()
                ))
            })
    }
}

type Getter<M> = Box<dyn Fn(&M, Conversion<'_>) -> Result<SqlValue> + Send + Sync>;
type Setter<M> = Box<dyn Fn(&mut M, &SqlValue, Conversion<'_>) -> Result<()> + Send + Sync>;

struct Field<M> {
    name: &'static str,
    get: Getter<M>,
    set: Setter<M>,
}

/// Column name to getter/setter table for one model type.
pub struct FieldMap<M> {
    fields: Vec<Field<M>>,
}

impl<M: 'static> Default for FieldMap<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static> FieldMap<M> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Maps a column stored as-is.
    pub fn column<V>(mut self, name: &'static str, get: fn(&M) -> V, set: fn(&mut M, V)) -> Self
    where
        V: ColumnValue + 'static,
    {
        self.fields.push(Field {
            name,
            get: Box::new(move |model, conversion| match conversion.named {
                Some(converter) => Conversion::named_to_db(converter, &get(model)),
                None => Ok(get(model).to_sql()),
            }),
            set: Box::new(move |model, value, conversion| {
                let value = match conversion.named {
                    Some(converter) => Conversion::named_from_db::<V>(converter, value)?,
                    None => V::from_sql(value)?,
                };
                set(model, value);
                Ok(())
            }),
        });
        self
    }

    /// Maps a column whose values go through the converter registered for
    /// `V`, unless the column names a converter of its own.
    pub fn converted<V>(mut self, name: &'static str, get: fn(&M) -> V, set: fn(&mut M, V)) -> Self
    where
        V: Any + Send + Sync,
    {
        self.fields.push(Field {
            name,
            get: Box::new(move |model, conversion| match conversion.named {
                Some(converter) => Conversion::named_to_db(converter, &get(model)),
                None => conversion.converters.to_db(&get(model)),
            }),
            set: Box::new(move |model, value, conversion| {
                let value = match conversion.named {
                    Some(converter) => Conversion::named_from_db::<V>(converter, value)?,
                    None => conversion.converters.from_db::<V>(value)?,
                };
                set(model, value);
                Ok(())
            }),
        });
        self
    }

    fn field(&self, name: &str) -> Result<&Field<M>> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SqlError::UnknownColumn {
                table: std::any::type_name::<M>().to_string(),
                column: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads one column's stored value from `model`.
    pub fn get(&self, model: &M, name: &str, converters: &ConverterRegistry) -> Result<SqlValue> {
        self.get_with(model, name, Conversion::new(converters))
    }

    /// Like [`get`](Self::get) with an explicit conversion.
    pub fn get_with(&self, model: &M, name: &str, conversion: Conversion<'_>) -> Result<SqlValue> {
        (self.field(name)?.get)(model, conversion)
    }

    /// Writes a stored value into `model`.
    pub fn set(
        &self,
        model: &mut M,
        name: &str,
        value: &SqlValue,
        converters: &ConverterRegistry,
    ) -> Result<()> {
        self.set_with(model, name, value, Conversion::new(converters))
    }

    /// Like [`set`](Self::set) with an explicit conversion.
    pub fn set_with(
        &self,
        model: &mut M,
        name: &str,
        value: &SqlValue,
        conversion: Conversion<'_>,
    ) -> Result<()> {
        (self.field(name)?.set)(model, value, conversion)
    }

    /// Reads several columns in the given order.
    pub fn values<'a, I>(&self, model: &M, names: I, converters: &ConverterRegistry) -> Result<Vec<SqlValue>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|name| self.get(model, name, converters))
            .collect()
    }
}

impl<M> fmt::Debug for FieldMap<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|field| field.name))
            .finish()
    }
}
