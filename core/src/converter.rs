//! Type conversion registry.
//!
//! A [`TypeConverter`] maps a Rust value to its stored [`SqlValue`] and back.
//! Converters are looked up by the runtime [`TypeId`] of a value when a
//! condition is written into a query, and by name when a column declares a
//! converter in its metadata.
//!
//! The registry is an ordinary value: build one, register what you need, and
//! hand it (usually inside a [`Registry`](crate::Registry)) to whatever emits
//! SQL. [`ConverterRegistry::default`] already contains the built-in
//! converters for `bool`, `chrono::DateTime<Utc>` and `chrono::NaiveDate`.
//!
//! # Examples
//!
//! ```
//! use sqlweave_core::{ConverterRegistry, SqlType, SqlValue, TypeConverter};
//!
//! struct Cents(i64);
//!
//! struct CentsConverter;
//!
//! impl TypeConverter for CentsConverter {
//!     type Model = Cents;
//!
//!     fn name(&self) -> &'static str {
//!         "cents"
//!     }
//!
//!     fn db_type(&self) -> SqlType {
//!         SqlType::Integer
//!     }
//!
//!     fn to_db(&self, model: &Cents) -> SqlValue {
//!         SqlValue::Integer(model.0)
//!     }
//!
//!     fn from_db(&self, value: &SqlValue) -> sqlweave_core::Result<Cents> {
//!         value
//!             .as_integer()
//!             .map(Cents)
//!             .ok_or_else(|| sqlweave_core::SqlError::ConversionError("not an integer".into()))
//!     }
//! }
//!
//! let mut converters = ConverterRegistry::default();
//! converters.register(CentsConverter);
//! assert_eq!(converters.to_db(&Cents(250)).unwrap(), SqlValue::Integer(250));
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, SqlError};
use crate::value::{SqlType, SqlValue};

/// Converts one model type to and from its stored representation.
pub trait TypeConverter: Send + Sync + 'static {
    /// The in-memory type handled by this converter.
    type Model: Any + Send + Sync;

    /// Registry name, referenced from column metadata.
    fn name(&self) -> &'static str;

    /// The column type values are stored as.
    fn db_type(&self) -> SqlType;

    fn to_db(&self, model: &Self::Model) -> SqlValue;

    fn from_db(&self, value: &SqlValue) -> Result<Self::Model>;
}

/// Object-safe view of a [`TypeConverter`] used inside the registry.
pub trait ErasedConverter: Send + Sync {
    fn name(&self) -> &'static str;
    fn db_type(&self) -> SqlType;
    fn model_type(&self) -> &'static str;
    fn to_db_any(&self, value: &dyn Any) -> Option<SqlValue>;
    fn from_db_any(&self, value: &SqlValue) -> Result<Box<dyn Any + Send + Sync>>;
}

impl<C: TypeConverter> ErasedConverter for C {
    fn name(&self) -> &'static str {
        TypeConverter::name(self)
    }

    fn db_type(&self) -> SqlType {
        TypeConverter::db_type(self)
    }

    fn model_type(&self) -> &'static str {
        type_name::<C::Model>()
    }

    fn to_db_any(&self, value: &dyn Any) -> Option<SqlValue> {
        value.downcast_ref::<C::Model>().map(|m| self.to_db(m))
    }

    fn from_db_any(&self, value: &SqlValue) -> Result<Box<dyn Any + Send + Sync>> {
        Ok(Box::new(self.from_db(value)?))
    }
}

/// A value kept in its Rust form until it is written into a query.
#[derive(Clone)]
pub struct TypedValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl TypedValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Converters keyed by model type and by name.
#[derive(Clone)]
pub struct ConverterRegistry {
    by_type: HashMap<TypeId, Arc<dyn ErasedConverter>>,
    by_name: HashMap<&'static str, Arc<dyn ErasedConverter>>,
}

impl ConverterRegistry {
    /// A registry with no converters at all, not even the built-ins.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers a converter, replacing any previous one for the same type
    /// or name.
    pub fn register<C: TypeConverter>(&mut self, converter: C) -> &mut Self {
        let name = TypeConverter::name(&converter);
        let converter: Arc<dyn ErasedConverter> = Arc::new(converter);
        self.by_type
            .insert(TypeId::of::<C::Model>(), Arc::clone(&converter));
        self.by_name.insert(name, converter);
        self
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Looks up a converter by its registry name.
    pub fn by_name(&self, name: &str) -> Option<&dyn ErasedConverter> {
        self.by_name.get(name).map(|c| c.as_ref())
    }

    /// Converts a typed value through the converter registered for its type.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::MissingConverter`] if nothing is registered for
    /// the value's type.
    pub fn convert(&self, value: &TypedValue) -> Result<SqlValue> {
        let converter = self
            .by_type
            .get(&value.type_id())
            .ok_or_else(|| SqlError::MissingConverter(value.type_name().to_string()))?;
        converter
            .to_db_any(value.value.as_ref())
            .ok_or_else(|| SqlError::ConversionError(format!("type mismatch for {}", value.type_name())))
    }

    /// Converts a model value to its stored form.
    pub fn to_db<T: Any>(&self, value: &T) -> Result<SqlValue> {
        let converter = self
            .by_type
            .get(&TypeId::of::<T>())
            .ok_or_else(|| SqlError::MissingConverter(type_name::<T>().to_string()))?;
        converter
            .to_db_any(value)
            .ok_or_else(|| SqlError::ConversionError(format!("type mismatch for {}", type_name::<T>())))
    }

    /// Converts a stored value back to a model value.
    pub fn from_db<T: Any>(&self, value: &SqlValue) -> Result<T> {
        let converter = self
            .by_type
            .get(&TypeId::of::<T>())
            .ok_or_else(|| SqlError::MissingConverter(type_name::<T>().to_string()))?;
        converter
            .from_db_any(value)?
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| SqlError::ConversionError(format!("type mismatch for {}", type_name::<T>())))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(BooleanConverter)
            .register(DateTimeConverter)
            .register(DateConverter);
        registry
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .finish()
    }
}

/// Stores `bool` as `0` / `1`.
pub struct BooleanConverter;

impl TypeConverter for BooleanConverter {
    type Model = bool;

    fn name(&self) -> &'static str {
        "boolean"
    }

    fn db_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn to_db(&self, model: &bool) -> SqlValue {
        SqlValue::Integer(i64::from(*model))
    }

    fn from_db(&self, value: &SqlValue) -> Result<bool> {
        match value {
            SqlValue::Integer(i) => Ok(*i != 0),
            SqlValue::Null => Ok(false),
            other => Err(SqlError::ConversionError(format!(
                "cannot read boolean from {other:?}"
            ))),
        }
    }
}

/// Stores UTC timestamps as epoch milliseconds.
pub struct DateTimeConverter;

impl TypeConverter for DateTimeConverter {
    type Model = DateTime<Utc>;

    fn name(&self) -> &'static str {
        "datetime"
    }

    fn db_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn to_db(&self, model: &DateTime<Utc>) -> SqlValue {
        SqlValue::Integer(model.timestamp_millis())
    }

    fn from_db(&self, value: &SqlValue) -> Result<DateTime<Utc>> {
        value
            .as_integer()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| SqlError::ConversionError(format!("cannot read timestamp from {value:?}")))
    }
}

/// Stores calendar dates as ISO-8601 text.
pub struct DateConverter;

impl TypeConverter for DateConverter {
    type Model = NaiveDate;

    fn name(&self) -> &'static str {
        "date"
    }

    fn db_type(&self) -> SqlType {
        SqlType::Text
    }

    fn to_db(&self, model: &NaiveDate) -> SqlValue {
        SqlValue::Text(model.format("%Y-%m-%d").to_string())
    }

    fn from_db(&self, value: &SqlValue) -> Result<NaiveDate> {
        let text = value
            .as_text()
            .ok_or_else(|| SqlError::ConversionError(format!("cannot read date from {value:?}")))?;
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| SqlError::ConversionError(format!("invalid date '{text}': {e}")))
    }
}
